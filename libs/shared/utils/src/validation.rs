// Brazilian document and contact formats: CPF, CNPJ, CEP, phone, email.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static CPF_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}\.?\d{3}\.?\d{3}-?\d{2}$").expect("valid CPF pattern"));

#[cfg_attr(not(test), allow(dead_code))]
static CNPJ_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2}$").expect("valid CNPJ pattern"));

static CEP_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("valid CEP pattern"));

static PHONE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+?55)?[1-9]{2}9?\d{8}$").expect("valid phone pattern"));

static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email pattern")
});

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldError {
    #[error("{0} is required")]
    Required(String),
    #[error("Invalid CPF: {0}")]
    InvalidCpf(String),
    #[error("Invalid CNPJ: {0}")]
    InvalidCnpj(String),
    #[error("Invalid CEP: {0}")]
    InvalidCep(String),
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("Invalid email: {0}")]
    InvalidEmail(String),
}

fn digits(input: &str) -> Vec<u32> {
    input.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn digits_to_string(values: &[u32]) -> String {
    values.iter().map(|d| char::from(b'0' + *d as u8)).collect()
}

fn all_same(values: &[u32]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

pub fn require(value: &str, field: &str) -> Result<(), FieldError> {
    if value.trim().is_empty() {
        return Err(FieldError::Required(field.to_string()));
    }
    Ok(())
}

/// Validates a CPF (punctuation optional) and returns its 11 bare digits.
pub fn validate_cpf(cpf: &str) -> Result<String, FieldError> {
    let cpf = cpf.trim();
    if !CPF_SHAPE.is_match(cpf) {
        return Err(FieldError::InvalidCpf(cpf.to_string()));
    }

    let d = digits(cpf);
    if all_same(&d) {
        return Err(FieldError::InvalidCpf(cpf.to_string()));
    }

    let check = |len: usize| -> u32 {
        let weight_start = len as u32 + 1;
        let sum: u32 = d[..len]
            .iter()
            .enumerate()
            .map(|(i, digit)| digit * (weight_start - i as u32))
            .sum();
        let rest = (sum * 10) % 11;
        if rest == 10 { 0 } else { rest }
    };

    if check(9) != d[9] || check(10) != d[10] {
        return Err(FieldError::InvalidCpf(cpf.to_string()));
    }

    Ok(digits_to_string(&d))
}

/// Validates a CNPJ (punctuation optional) and returns its 14 bare digits.
/// No registry stores company documents yet, so this stays crate-private.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn validate_cnpj(cnpj: &str) -> Result<String, FieldError> {
    const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    let cnpj = cnpj.trim();
    if !CNPJ_SHAPE.is_match(cnpj) {
        return Err(FieldError::InvalidCnpj(cnpj.to_string()));
    }

    let d = digits(cnpj);
    if all_same(&d) {
        return Err(FieldError::InvalidCnpj(cnpj.to_string()));
    }

    let check = |weights: &[u32]| -> u32 {
        let sum: u32 = d.iter().zip(weights).map(|(digit, w)| digit * w).sum();
        let rest = sum % 11;
        if rest < 2 { 0 } else { 11 - rest }
    };

    if check(&FIRST_WEIGHTS) != d[12] || check(&SECOND_WEIGHTS) != d[13] {
        return Err(FieldError::InvalidCnpj(cnpj.to_string()));
    }

    Ok(digits_to_string(&d))
}

/// Validates a CEP and returns it as `NNNNN-NNN`.
pub fn validate_cep(cep: &str) -> Result<String, FieldError> {
    let cep = cep.trim();
    if !CEP_SHAPE.is_match(cep) {
        return Err(FieldError::InvalidCep(cep.to_string()));
    }
    let d = digits_to_string(&digits(cep));
    Ok(format!("{}-{}", &d[..5], &d[5..]))
}

/// Accepts landline (10 digits) and mobile (11 digits, leading 9) numbers with
/// an optional `+55` prefix. Spaces, dashes and parentheses are ignored.
pub fn validate_phone(phone: &str) -> Result<(), FieldError> {
    let compact: String = phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if !PHONE_SHAPE.is_match(&compact) {
        return Err(FieldError::InvalidPhone(phone.to_string()));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), FieldError> {
    let email = email.trim();
    if email.len() > 254 || !EMAIL_SHAPE.is_match(email) {
        return Err(FieldError::InvalidEmail(email.to_string()));
    }
    Ok(())
}
