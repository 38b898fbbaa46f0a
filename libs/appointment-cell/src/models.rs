// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;

use shared_config::{AppConfig, MAX_SLOT_INTERVAL_MINUTES};

// ==============================================================================
// WALL-CLOCK TIME FORMAT
// ==============================================================================

/// `start_time` columns are Postgres `time` values ("14:00:00"); clients may
/// also send "14:00".
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(|e| de::Error::custom(format!("invalid time '{}': {}", raw, e)))
    }
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn interval(&self) -> TimeInterval {
        TimeInterval::starting_at(self.appointment_date, self.start_time, self.duration_minutes)
    }

    pub fn end_time(&self) -> NaiveTime {
        self.interval().end.time()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
    Cancelled,
    #[serde(alias = "no-show")]
    NoShow,
}

impl AppointmentStatus {
    /// Every status except `Cancelled` keeps its time slot occupied.
    pub fn blocks_schedule(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self,
            AppointmentStatus::Completed |
            AppointmentStatus::Cancelled |
            AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "avaliacao")]
    Evaluation,

    #[default]
    #[serde(alias = "sessao")]
    Session,

    #[serde(alias = "reavaliacao")]
    Reevaluation,

    #[serde(alias = "retorno", alias = "follow-up")]
    FollowUp,
}

impl AppointmentType {
    /// Duration used when a booking does not state one.
    pub fn default_duration_minutes(&self) -> i32 {
        match self {
            AppointmentType::Evaluation => 60,
            AppointmentType::Session => 60,
            AppointmentType::Reevaluation => 45,
            AppointmentType::FollowUp => 30,
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Evaluation => write!(f, "evaluation"),
            AppointmentType::Session => write!(f, "session"),
            AppointmentType::Reevaluation => write!(f, "reevaluation"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
        }
    }
}

// ==============================================================================
// SLOTS AND INTERVALS
// ==============================================================================

/// Half-open `[start, end)` interval on the clinic's wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeInterval {
    /// `None` when the end falls past the last representable instant.
    pub fn checked_starting_at(date: NaiveDate, start_time: NaiveTime, duration_minutes: i32) -> Option<Self> {
        let start = date.and_time(start_time);
        let end = start.checked_add_signed(Duration::minutes(duration_minutes as i64))?;
        Some(Self { start, end })
    }

    /// Like `checked_starting_at`, but an overflowing end is clamped to `NaiveDateTime::MAX`.
    pub fn starting_at(date: NaiveDate, start_time: NaiveTime, duration_minutes: i32) -> Self {
        Self::checked_starting_at(date, start_time, duration_minutes).unwrap_or_else(|| {
            let start = date.and_time(start_time);
            Self { start, end: NaiveDateTime::MAX }
        })
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// A proposed booking that has not been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
}

impl CandidateSlot {
    pub fn at(&self, start_time: NaiveTime) -> Self {
        Self {
            start_time,
            ..self.clone()
        }
    }

    pub fn interval(&self) -> Result<TimeInterval, AppointmentError> {
        if self.duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(format!(
                "duration_minutes must be positive, got {}",
                self.duration_minutes
            )));
        }
        TimeInterval::checked_starting_at(self.date, self.start_time, self.duration_minutes).ok_or_else(|| {
            AppointmentError::ValidationError(format!(
                "appointment on {} at {} for {} minutes ends outside the supported calendar",
                self.date,
                self.start_time.format("%H:%M"),
                self.duration_minutes
            ))
        })
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub appointment_date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub new_start_time: NaiveTime,
    pub new_duration_minutes: Option<i32>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
    pub suggested_alternatives: Vec<SuggestedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedSlot {
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub start_time: NaiveTime,
    #[serde(with = "wall_clock")]
    pub end_time: NaiveTime,
}

impl SuggestedSlot {
    pub fn for_candidate(candidate: &CandidateSlot) -> Self {
        let interval = TimeInterval::starting_at(candidate.date, candidate.start_time, candidate.duration_minutes);
        Self {
            date: candidate.date,
            start_time: candidate.start_time,
            end_time: interval.end.time(),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

fn suggestion_hint(suggestions: &[NaiveTime]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let times: Vec<String> = suggestions.iter().map(|t| t.format("%H:%M").to_string()).collect();
    format!("; available alternatives: {}", times.join(", "))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Appointment conflicts with {} existing booking(s){}", .conflicting.len(), suggestion_hint(.suggestions))]
    ConflictDetected {
        conflicting: Vec<Uuid>,
        suggestions: Vec<NaiveTime>,
    },

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

const DEFAULT_SLOT_INTERVAL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub slot_interval_minutes: i64,
    pub min_appointment_duration: i32,
    pub max_appointment_duration: i32,
    pub suggestion_limit: usize,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            opening_time: shared_config::default_opening_time(),
            closing_time: shared_config::default_closing_time(),
            slot_interval_minutes: DEFAULT_SLOT_INTERVAL_MINUTES,
            min_appointment_duration: 15,
            max_appointment_duration: 240,
            suggestion_limit: 3,
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        if !config.has_valid_business_hours() {
            tracing::warn!("Configured business hours are invalid, using defaults");
            return Self::default();
        }
        Self {
            opening_time: config.clinic_opening_time,
            closing_time: config.clinic_closing_time,
            slot_interval_minutes: config.slot_interval_minutes,
            ..Self::default()
        }
    }

    /// Start times from opening (inclusive) to closing (exclusive), one per interval.
    pub fn canonical_slots(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(self.slot_interval_minutes.clamp(1, MAX_SLOT_INTERVAL_MINUTES));
        let mut slots = Vec::new();
        let mut current = self.opening_time;
        while current < self.closing_time {
            slots.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            current = next;
        }
        slots
    }

    /// Canonical slots whose appointment of `duration_minutes` ends by closing time.
    pub fn canonical_slots_fitting(&self, duration_minutes: i32) -> Vec<NaiveTime> {
        let (latest_start, wrapped) = self
            .closing_time
            .overflowing_sub_signed(Duration::minutes(duration_minutes as i64));
        if wrapped != 0 {
            return Vec::new();
        }
        self.canonical_slots()
            .into_iter()
            .filter(|slot| *slot <= latest_start)
            .collect()
    }

    /// Duration assumed when an availability query does not state one.
    pub fn default_duration_minutes(&self) -> i32 {
        i32::try_from(self.slot_interval_minutes)
            .ok()
            .filter(|minutes| *minutes > 0)
            .unwrap_or(DEFAULT_SLOT_INTERVAL_MINUTES as i32)
    }

    pub fn validate_duration(&self, duration_minutes: i32) -> Result<(), AppointmentError> {
        if duration_minutes < self.min_appointment_duration || duration_minutes > self.max_appointment_duration {
            return Err(AppointmentError::ValidationError(format!(
                "duration_minutes must be between {} and {}, got {}",
                self.min_appointment_duration, self.max_appointment_duration, duration_minutes
            )));
        }
        Ok(())
    }
}
