// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use serde::Deserialize;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, BookAppointmentRequest, UpdateStatusRequest, RescheduleAppointmentRequest,
    CancelAppointmentRequest, AppointmentSearchQuery, AppointmentStatus, AppointmentError,
    CandidateSlot, wall_clock,
};
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub practitioner_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    #[serde(deserialize_with = "wall_clock::deserialize")]
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub practitioner_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// ERROR MAPPING AND ACCESS RULES
// ==============================================================================

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
            AppointmentError::ConflictDetected { .. } => AppError::Conflict(e.to_string()),
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Unauthorized => AppError::Auth(e.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn is_participant(user: &User, appointment: &Appointment) -> bool {
    appointment.patient_id.to_string() == user.id || appointment.practitioner_id.to_string() == user.id
}

fn ensure_can_access(user: &User, appointment: &Appointment) -> Result<(), AppError> {
    if user.is_staff() || is_participant(user, appointment) {
        return Ok(());
    }
    Err(AppointmentError::Unauthorized.into())
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<BookAppointmentRequest>, AppError>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    // Patients may only book for themselves; clinic staff can book for anyone
    let is_patient = request.patient_id.to_string() == user.id;
    if !is_patient && !user.is_staff() {
        return Err(AppError::Auth("Not authorized to book appointment for this patient".to_string()));
    }

    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service.book_appointment(request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let appointment = booking_service.get_appointment(appointment_id, auth.token()).await?;

    ensure_can_access(&user, &appointment)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    // Non-staff callers only ever see their own bookings
    let patient_id = if user.is_staff() {
        params.patient_id
    } else {
        Some(Uuid::parse_str(&user.id)
            .map_err(|_| AppError::BadRequest("Invalid patient ID".to_string()))?)
    };

    let search_query = AppointmentSearchQuery {
        practitioner_id: params.practitioner_id,
        patient_id,
        date: params.date,
        status: params.status,
        limit: params.limit,
        offset: params.offset,
    };

    let booking_service = AppointmentBookingService::new(&state);
    let appointments = booking_service.search_appointments(search_query, auth.token()).await?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateStatusRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let current = booking_service.get_appointment(appointment_id, auth.token()).await?;

    let is_practitioner = current.practitioner_id.to_string() == user.id;
    if !user.is_staff() && !is_practitioner {
        return Err(AppError::Auth("Only clinic staff can change appointment status".to_string()));
    }

    let appointment = booking_service.update_status(appointment_id, request, auth.token()).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<RescheduleAppointmentRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let current = booking_service.get_appointment(appointment_id, auth.token()).await?;
    ensure_can_access(&user, &current)?;

    let appointment = booking_service.reschedule_appointment(appointment_id, request, auth.token()).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<CancelAppointmentRequest>, AppError>,
) -> Result<Json<Value>, AppError> {
    cancel(&state, appointment_id, auth.token(), &user, request).await
}

/// DELETE never removes the record; it cancels the booking.
#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    cancel(&state, appointment_id, auth.token(), &user, CancelAppointmentRequest::default()).await
}

async fn cancel(
    config: &AppConfig,
    appointment_id: Uuid,
    token: &str,
    user: &User,
    request: CancelAppointmentRequest,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(config);
    let current = booking_service.get_appointment(appointment_id, token).await?;
    ensure_can_access(user, &current)?;

    let appointment = booking_service.cancel_appointment(appointment_id, request, token).await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// CONFLICT DETECTION AND AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<ConflictCheckQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let candidate = CandidateSlot {
        practitioner_id: params.practitioner_id,
        date: params.date,
        start_time: params.start_time,
        duration_minutes: params.duration_minutes,
    };

    let booking_service = AppointmentBookingService::new(&state);
    let conflict_response = booking_service
        .check_conflicts(candidate, params.exclude_appointment_id, auth.token())
        .await?;

    Ok(Json(json!(conflict_response)))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);
    let duration_minutes = params
        .duration_minutes
        .unwrap_or_else(|| booking_service.rules().default_duration_minutes());

    let slots = booking_service
        .get_available_slots(params.practitioner_id, params.date, duration_minutes, auth.token())
        .await?;

    Ok(Json(json!({
        "practitioner_id": params.practitioner_id,
        "date": params.date,
        "duration_minutes": duration_minutes,
        "available_slots": slots
    })))
}
