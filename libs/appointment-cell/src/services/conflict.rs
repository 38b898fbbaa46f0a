// libs/appointment-cell/src/services/conflict.rs
//
// Slot conflict detection over an already-fetched list of appointments.
// Nothing here performs I/O; callers load the practitioner's day first.

use chrono::NaiveTime;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, CandidateSlot, ConflictReport, TimeInterval};

/// Half-open overlap: touching intervals do not conflict.
pub fn intervals_overlap(a: &TimeInterval, b: &TimeInterval) -> bool {
    a.overlaps(b)
}

/// Every existing appointment that occupies part of the candidate's interval.
///
/// Appointments for other practitioners or other dates, cancelled
/// appointments, and the appointment named by `exclude_id` are ignored, so
/// `existing` may be passed unfiltered.
pub fn find_conflicts(
    candidate: &CandidateSlot,
    existing: &[Appointment],
    exclude_id: Option<Uuid>,
) -> Result<ConflictReport, AppointmentError> {
    let requested = candidate.interval()?;

    let conflicting_appointments: Vec<Appointment> = existing
        .iter()
        .filter(|apt| apt.practitioner_id == candidate.practitioner_id)
        .filter(|apt| apt.appointment_date == candidate.date)
        .filter(|apt| apt.status.blocks_schedule())
        .filter(|apt| Some(apt.id) != exclude_id)
        .filter(|apt| intervals_overlap(&requested, &apt.interval()))
        .cloned()
        .collect();

    if !conflicting_appointments.is_empty() {
        debug!(
            "Slot {} {} ({} min) overlaps {} appointment(s) for practitioner {}",
            candidate.date,
            candidate.start_time.format("%H:%M"),
            candidate.duration_minutes,
            conflicting_appointments.len(),
            candidate.practitioner_id
        );
    }

    Ok(ConflictReport {
        has_conflict: !conflicting_appointments.is_empty(),
        conflicting_appointments,
    })
}

pub fn has_conflict(
    candidate: &CandidateSlot,
    existing: &[Appointment],
    exclude_id: Option<Uuid>,
) -> Result<bool, AppointmentError> {
    Ok(find_conflicts(candidate, existing, exclude_id)?.has_conflict)
}

/// Up to `limit` conflict-free start times from `canonical_slots`, in slot
/// order, never including the candidate's own start time.
pub fn suggest_alternatives(
    candidate: &CandidateSlot,
    existing: &[Appointment],
    canonical_slots: &[NaiveTime],
    limit: usize,
    exclude_id: Option<Uuid>,
) -> Result<Vec<NaiveTime>, AppointmentError> {
    candidate.interval()?;

    let mut suggestions = Vec::with_capacity(limit);
    for slot in canonical_slots {
        if suggestions.len() >= limit {
            break;
        }
        if *slot == candidate.start_time {
            continue;
        }
        if !has_conflict(&candidate.at(*slot), existing, exclude_id)? {
            suggestions.push(*slot);
        }
    }

    Ok(suggestions)
}

/// All conflict-free start times for the candidate's practitioner, date and duration.
pub fn available_slots(
    candidate: &CandidateSlot,
    existing: &[Appointment],
    canonical_slots: &[NaiveTime],
) -> Result<Vec<NaiveTime>, AppointmentError> {
    candidate.interval()?;

    let mut free = Vec::new();
    for slot in canonical_slots {
        if !has_conflict(&candidate.at(*slot), existing, None)? {
            free.push(*slot);
        }
    }
    Ok(free)
}
