use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub cpf: String,
    pub email: Option<String>,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub address: Option<String>,
    pub cep: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Body of both create and full update; every field is replaced on update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRequest {
    pub name: String,
    pub cpf: String,
    pub email: String,
    pub phone: String,
    pub birth_date: NaiveDate,
    pub address: Option<String>,
    pub cep: Option<String>,
}

pub type CreatePatientRequest = PatientRequest;
pub type UpdatePatientRequest = PatientRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Patient with CPF {cpf} already exists")]
    CpfAlreadyExists { cpf: String },

    #[error("Unauthorized access to patient data")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_utils::validation::FieldError> for PatientError {
    fn from(e: shared_utils::validation::FieldError) -> Self {
        PatientError::ValidationError(e.to_string())
    }
}
