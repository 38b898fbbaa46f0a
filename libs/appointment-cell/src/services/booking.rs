// libs/appointment-cell/src/services/booking.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, CandidateSlot,
    RescheduleAppointmentRequest, CancelAppointmentRequest, UpdateStatusRequest,
    AppointmentSearchQuery, AppointmentError, ConflictCheckResponse, SchedulingRules,
    SuggestedSlot,
};
use crate::services::conflict;
use crate::services::lifecycle::AppointmentLifecycleService;

const DEFAULT_PAGE_SIZE: i32 = 50;
const MAX_PAGE_SIZE: i32 = 100;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    lifecycle_service: AppointmentLifecycleService,
    rules: SchedulingRules,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            lifecycle_service: AppointmentLifecycleService::new(),
            rules: SchedulingRules::from_config(config),
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Book a new appointment in status `scheduled` if the slot is free.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with practitioner {} on {} at {}",
              request.patient_id, request.practitioner_id,
              request.appointment_date, request.start_time.format("%H:%M"));

        let duration_minutes = request
            .duration_minutes
            .unwrap_or_else(|| request.appointment_type.default_duration_minutes());
        self.rules.validate_duration(duration_minutes)?;

        self.verify_patient_exists(request.patient_id, auth_token).await?;

        let candidate = CandidateSlot {
            practitioner_id: request.practitioner_id,
            date: request.appointment_date,
            start_time: request.start_time,
            duration_minutes,
        };
        self.ensure_slot_free(&candidate, None, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "practitioner_id": request.practitioner_id,
            "appointment_date": request.appointment_date.to_string(),
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "duration_minutes": duration_minutes,
            "status": AppointmentStatus::Scheduled.to_string(),
            "appointment_type": request.appointment_type.to_string(),
            "notes": request.notes,
            "created_at": now,
            "updated_at": now
        });

        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            appointment_data,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = Self::first_appointment(result)?
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))?;
        info!("Appointment {} booked successfully", appointment.id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Self::first_appointment(result)?.ok_or(AppointmentError::NotFound)
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with query: {:?}", query);

        let mut query_parts = Vec::new();
        if let Some(practitioner_id) = query.practitioner_id {
            query_parts.push(format!("practitioner_id=eq.{}", practitioner_id));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(date) = query.date {
            query_parts.push(format!("appointment_date=eq.{}", date));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) || offset < 0 {
            return Err(AppointmentError::ValidationError(format!(
                "limit must be between 1 and {} and offset must not be negative", MAX_PAGE_SIZE
            )));
        }

        query_parts.push("order=appointment_date.asc,start_time.asc".to_string());
        query_parts.push(format!("limit={}", limit));
        query_parts.push(format!("offset={}", offset));

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Self::parse_appointments(result)
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_status_transition(&current.status, &request.status)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(request.status.to_string()));
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }

        let updated = self.patch_appointment(appointment_id, update_data, auth_token).await?;
        info!("Appointment {} moved from {} to {}", appointment_id, current.status, updated.status);
        Ok(updated)
    }

    /// Move an appointment to a new slot. The appointment's own booking never
    /// blocks the move, and the result goes back to `scheduled`.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_reschedule(&current.status)?;

        let duration_minutes = request.new_duration_minutes.unwrap_or(current.duration_minutes);
        self.rules.validate_duration(duration_minutes)?;

        let candidate = CandidateSlot {
            practitioner_id: current.practitioner_id,
            date: request.new_date,
            start_time: request.new_start_time,
            duration_minutes,
        };
        self.ensure_slot_free(&candidate, Some(appointment_id), auth_token).await?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("appointment_date".to_string(), json!(request.new_date.to_string()));
        update_data.insert("start_time".to_string(), json!(request.new_start_time.format("%H:%M:%S").to_string()));
        update_data.insert("duration_minutes".to_string(), json!(duration_minutes));
        update_data.insert("status".to_string(), json!(AppointmentStatus::Scheduled.to_string()));
        if let Some(reason) = request.reason {
            update_data.insert("notes".to_string(), json!(rescheduled_notes(current.notes.as_deref(), &reason)));
        }

        let updated = self.patch_appointment(appointment_id, update_data, auth_token).await?;
        info!("Appointment {} rescheduled to {} {}", appointment_id, updated.appointment_date,
              updated.start_time.format("%H:%M"));
        Ok(updated)
    }

    /// Cancellation is a status change; the record is kept.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service
            .validate_status_transition(&current.status, &AppointmentStatus::Cancelled)?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("status".to_string(), json!(AppointmentStatus::Cancelled.to_string()));
        update_data.insert("cancellation_reason".to_string(), json!(request.reason));

        let cancelled = self.patch_appointment(appointment_id, update_data, auth_token).await?;
        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    /// Conflict report plus suggestions for a candidate slot, without booking it.
    pub async fn check_conflicts(
        &self,
        candidate: CandidateSlot,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        self.rules.validate_duration(candidate.duration_minutes)?;
        candidate.interval()?;

        let existing = self.get_practitioner_day(candidate.practitioner_id, candidate.date, auth_token).await?;
        let report = conflict::find_conflicts(&candidate, &existing, exclude_appointment_id)?;

        let suggested_alternatives = if report.has_conflict {
            conflict::suggest_alternatives(
                &candidate,
                &existing,
                &self.rules.canonical_slots_fitting(candidate.duration_minutes),
                self.rules.suggestion_limit,
                exclude_appointment_id,
            )?
            .into_iter()
            .map(|slot| SuggestedSlot::for_candidate(&candidate.at(slot)))
            .collect()
        } else {
            Vec::new()
        };

        Ok(ConflictCheckResponse {
            has_conflict: report.has_conflict,
            conflicting_appointments: report.conflicting_appointments,
            suggested_alternatives,
        })
    }

    pub async fn get_available_slots(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
        auth_token: &str,
    ) -> Result<Vec<SuggestedSlot>, AppointmentError> {
        self.rules.validate_duration(duration_minutes)?;

        let candidate = CandidateSlot {
            practitioner_id,
            date,
            start_time: self.rules.opening_time,
            duration_minutes,
        };
        candidate.interval()?;

        let existing = self.get_practitioner_day(practitioner_id, date, auth_token).await?;

        let free = conflict::available_slots(
            &candidate,
            &existing,
            &self.rules.canonical_slots_fitting(duration_minutes),
        )?;

        Ok(free
            .into_iter()
            .map(|slot| SuggestedSlot::for_candidate(&candidate.at(slot)))
            .collect())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn ensure_slot_free(
        &self,
        candidate: &CandidateSlot,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        candidate.interval()?;

        let existing = self.get_practitioner_day(candidate.practitioner_id, candidate.date, auth_token).await?;
        let report = conflict::find_conflicts(candidate, &existing, exclude_id)?;

        if report.has_conflict {
            let suggestions = conflict::suggest_alternatives(
                candidate,
                &existing,
                &self.rules.canonical_slots_fitting(candidate.duration_minutes),
                self.rules.suggestion_limit,
                exclude_id,
            )?;

            warn!("Conflict detected for practitioner {} on {} at {} - {} conflicting appointments",
                  candidate.practitioner_id, candidate.date,
                  candidate.start_time.format("%H:%M"), report.conflicting_appointments.len());

            return Err(AppointmentError::ConflictDetected {
                conflicting: report.conflicting_appointments.iter().map(|apt| apt.id).collect(),
                suggestions,
            });
        }

        Ok(())
    }

    async fn get_practitioner_day(
        &self,
        practitioner_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&appointment_date=eq.{}&status=neq.cancelled&order=start_time.asc",
            practitioner_id, date
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Self::parse_appointments(result)
    }

    async fn verify_patient_exists(&self, patient_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&active=eq.true&select=id", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::PatientNotFound);
        }
        Ok(())
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        mut update_data: serde_json::Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            Value::Object(update_data),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Self::first_appointment(result)?.ok_or(AppointmentError::NotFound)
    }

    fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    fn first_appointment(rows: Vec<Value>) -> Result<Option<Appointment>, AppointmentError> {
        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }
}

/// Keeps any existing notes and appends the reschedule reason on its own line.
pub fn rescheduled_notes(existing: Option<&str>, reason: &str) -> String {
    let entry = format!("Rescheduled: {}", reason);
    match existing.map(str::trim_end).filter(|notes| !notes.is_empty()) {
        Some(notes) => format!("{}\n{}", notes, entry),
        None => entry,
    }
}
