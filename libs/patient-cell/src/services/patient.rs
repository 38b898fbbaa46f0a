use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::validation::{require, validate_cep, validate_cpf, validate_email, validate_phone};

use crate::models::{Patient, PatientRequest, PatientListQuery, PatientError};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct PatientService {
    supabase: SupabaseClient,
}

/// A request whose documents passed validation, in storage format.
struct ValidatedPatient {
    name: String,
    cpf: String,
    email: String,
    phone: String,
    address: Option<String>,
    cep: Option<String>,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_patient(
        &self,
        request: PatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let validated = validate_request(&request)?;
        debug!("Creating patient record for CPF {}", mask_cpf(&validated.cpf));

        self.ensure_cpf_unused(&validated.cpf, None, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "name": validated.name,
            "cpf": validated.cpf,
            "email": validated.email,
            "phone": validated.phone,
            "birth_date": request.birth_date.format("%Y-%m-%d").to_string(),
            "address": validated.address,
            "cep": validated.cep,
            "active": true,
            "created_at": now,
            "updated_at": now
        });

        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            patient_data,
        ).await.map_err(|e| storage_error(e, &validated.cpf))?;

        let patient = first_patient(result)?
            .ok_or_else(|| PatientError::DatabaseError("Failed to create patient record".to_string()))?;
        info!("Patient {} created", patient.id);

        Ok(patient)
    }

    /// Archived patients are still returned, with `active: false`.
    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result = self.fetch(&path, auth_token).await?;

        first_patient(result)?.ok_or(PatientError::NotFound)
    }

    /// Active patients ordered by name, one page at a time.
    pub async fn list_patients(
        &self,
        query: PatientListQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        debug!("Listing patients with query: {:?}", query);

        let page = query.page.unwrap_or(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(PatientError::ValidationError("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(PatientError::ValidationError(format!(
                "limit must be between 1 and {}", MAX_PAGE_SIZE
            )));
        }

        let mut query_parts = vec!["active=eq.true".to_string()];
        if let Some(term) = query.search.as_deref().map(search_term).filter(|t| !t.is_empty()) {
            let encoded = urlencoding::encode(&term);
            query_parts.push(format!(
                "or=(name.ilike.*{0}*,cpf.ilike.*{0}*,email.ilike.*{0}*)",
                encoded
            ));
        }
        query_parts.push("order=name.asc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", (page - 1) * limit));

        let path = format!("/rest/v1/patients?{}", query_parts.join("&"));
        let result = self.fetch(&path, auth_token).await?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Patient>, _>>()
            .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patients: {}", e)))
    }

    /// Replaces every editable field of the record.
    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: PatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let validated = validate_request(&request)?;
        debug!("Updating patient: {}", patient_id);

        self.get_patient(patient_id, auth_token).await?;
        self.ensure_cpf_unused(&validated.cpf, Some(patient_id), auth_token).await?;

        let update_data = json!({
            "name": validated.name,
            "cpf": validated.cpf,
            "email": validated.email,
            "phone": validated.phone,
            "birth_date": request.birth_date.format("%Y-%m-%d").to_string(),
            "address": validated.address,
            "cep": validated.cep,
            "updated_at": Utc::now().to_rfc3339()
        });

        let patient = self.patch(patient_id, update_data, &validated.cpf, auth_token).await?;
        info!("Patient {} updated", patient_id);
        Ok(patient)
    }

    /// Soft delete: the record stays, flagged inactive with an archive timestamp.
    pub async fn archive_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let current = self.get_patient(patient_id, auth_token).await?;
        if !current.active {
            debug!("Patient {} is already archived", patient_id);
            return Ok(current);
        }

        let now = Utc::now().to_rfc3339();
        let update_data = json!({
            "active": false,
            "archived_at": now,
            "updated_at": now
        });

        let patient = self.patch(patient_id, update_data, &current.cpf, auth_token).await?;
        info!("Patient {} archived", patient_id);
        Ok(patient)
    }

    async fn ensure_cpf_unused(
        &self,
        cpf: &str,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        let mut path = format!("/rest/v1/patients?cpf=eq.{}&select=id", cpf);
        if let Some(id) = exclude_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let existing = self.fetch(&path, auth_token).await?;
        if !existing.is_empty() {
            warn!("Rejected duplicate CPF {}", mask_cpf(cpf));
            return Err(PatientError::CpfAlreadyExists { cpf: cpf.to_string() });
        }
        Ok(())
    }

    async fn patch(
        &self,
        patient_id: Uuid,
        update_data: Value,
        cpf: &str,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            update_data,
        ).await.map_err(|e| storage_error(e, cpf))?;

        first_patient(result)?.ok_or(PatientError::NotFound)
    }

    async fn fetch(&self, path: &str, auth_token: &str) -> Result<Vec<Value>, PatientError> {
        let rows: Result<Vec<Value>> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .context("patient lookup failed");

        rows.map_err(|e| PatientError::DatabaseError(format!("{:#}", e)))
    }
}

fn validate_request(request: &PatientRequest) -> Result<ValidatedPatient, PatientError> {
    require(&request.name, "name")?;
    let cpf = validate_cpf(&request.cpf)?;
    validate_email(&request.email)?;
    validate_phone(&request.phone)?;

    let cep = match request.cep.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => Some(validate_cep(raw)?),
        None => None,
    };

    Ok(ValidatedPatient {
        name: request.name.trim().to_string(),
        cpf,
        email: request.email.trim().to_string(),
        phone: request.phone.trim().to_string(),
        address: request.address.clone(),
        cep,
    })
}

/// A unique-constraint violation on insert means another request won the CPF.
fn storage_error(e: anyhow::Error, cpf: &str) -> PatientError {
    if e.to_string().starts_with("Conflict") {
        return PatientError::CpfAlreadyExists { cpf: cpf.to_string() };
    }
    PatientError::DatabaseError(e.to_string())
}

fn first_patient(rows: Vec<Value>) -> Result<Option<Patient>, PatientError> {
    rows.into_iter()
        .next()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| PatientError::DatabaseError(format!("Failed to parse patient: {}", e)))
}

/// PostgREST `or=(...)` filters break on commas and parentheses.
fn search_term(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn mask_cpf(cpf: &str) -> String {
    let visible: String = cpf.chars().skip(cpf.len().saturating_sub(2)).collect();
    format!("***{}", visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> PatientRequest {
        PatientRequest {
            name: "  Maria Souza ".to_string(),
            cpf: "529.982.247-25".to_string(),
            email: "maria@example.com".to_string(),
            phone: "(11) 98765-4321".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1988, 4, 2).unwrap(),
            address: None,
            cep: Some("01310100".to_string()),
        }
    }

    #[test]
    fn validation_normalizes_documents() {
        let validated = validate_request(&request()).unwrap();
        assert_eq!(validated.name, "Maria Souza");
        assert_eq!(validated.cpf, "52998224725");
        assert_eq!(validated.cep.as_deref(), Some("01310-100"));
    }

    #[test]
    fn validation_rejects_bad_cpf_and_blank_name() {
        let mut bad_cpf = request();
        bad_cpf.cpf = "123.456.789-01".to_string();
        assert!(matches!(validate_request(&bad_cpf), Err(PatientError::ValidationError(_))));

        let mut blank = request();
        blank.name = "   ".to_string();
        assert!(matches!(validate_request(&blank), Err(PatientError::ValidationError(_))));
    }

    #[test]
    fn search_term_strips_filter_syntax() {
        assert_eq!(search_term(" maria (silva), "), "maria silva");
        assert_eq!(search_term("*"), "");
    }

    #[test]
    fn cpf_is_masked_in_logs() {
        assert_eq!(mask_cpf("52998224725"), "***25");
    }
}
