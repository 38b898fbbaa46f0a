use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentType, CandidateSlot,
    SchedulingRules, TimeInterval,
};
use appointment_cell::services::booking::rescheduled_notes;
use appointment_cell::services::conflict::{
    available_slots, find_conflicts, has_conflict, intervals_overlap, suggest_alternatives,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn t(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn appointment(practitioner_id: Uuid, start: NaiveTime, duration: i32, status: AppointmentStatus) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        practitioner_id,
        appointment_date: date(),
        start_time: start,
        duration_minutes: duration,
        status,
        appointment_type: AppointmentType::Session,
        notes: None,
        cancellation_reason: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn candidate(practitioner_id: Uuid, start: NaiveTime, duration: i32) -> CandidateSlot {
    CandidateSlot {
        practitioner_id,
        date: date(),
        start_time: start,
        duration_minutes: duration,
    }
}

#[test]
fn test_overlap_is_half_open() {
    let a = TimeInterval::starting_at(date(), t(14, 0), 60);
    let touching = TimeInterval::starting_at(date(), t(15, 0), 30);
    let inside = TimeInterval::starting_at(date(), t(14, 15), 15);
    let enclosing = TimeInterval::starting_at(date(), t(13, 0), 180);

    assert!(!intervals_overlap(&a, &touching));
    assert!(!intervals_overlap(&touching, &a));
    assert!(intervals_overlap(&a, &inside));
    assert!(intervals_overlap(&a, &enclosing));
    assert!(intervals_overlap(&a, &a));
}

#[test]
fn test_booking_inside_existing_slot_conflicts() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled)];

    let report = find_conflicts(&candidate(practitioner, t(14, 30), 60), &existing, None).unwrap();
    assert!(report.has_conflict);
    assert_eq!(report.conflicting_appointments.len(), 1);
    assert_eq!(report.conflicting_appointments[0].id, existing[0].id);
}

#[test]
fn test_back_to_back_bookings_do_not_conflict() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(14, 0), 60, AppointmentStatus::Confirmed)];

    assert!(!has_conflict(&candidate(practitioner, t(15, 0), 60), &existing, None).unwrap());
    assert!(!has_conflict(&candidate(practitioner, t(13, 45), 15), &existing, None).unwrap());
}

#[test]
fn test_booking_ending_inside_existing_slot_conflicts() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled)];

    assert!(has_conflict(&candidate(practitioner, t(13, 30), 60), &existing, None).unwrap());
}

#[test]
fn test_half_hour_candidates_around_afternoon_booking() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled)];

    let cases = [
        (t(14, 30), true),
        (t(15, 0), false),
        (t(13, 30), false),
        (t(13, 45), true),
    ];
    for (start, expected) in cases {
        assert_eq!(
            has_conflict(&candidate(practitioner, start, 30), &existing, None).unwrap(),
            expected,
            "candidate at {}",
            start
        );
    }
}

#[test]
fn test_cancelled_appointments_free_the_slot() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(14, 0), 60, AppointmentStatus::Cancelled)];

    assert!(!has_conflict(&candidate(practitioner, t(14, 0), 60), &existing, None).unwrap());
}

#[test]
fn test_completed_and_no_show_still_block() {
    let practitioner = Uuid::new_v4();
    for status in [AppointmentStatus::Completed, AppointmentStatus::NoShow, AppointmentStatus::InProgress] {
        let existing = vec![appointment(practitioner, t(9, 0), 60, status)];
        assert!(has_conflict(&candidate(practitioner, t(9, 30), 30), &existing, None).unwrap());
    }
}

#[test]
fn test_other_practitioners_and_dates_are_ignored() {
    let practitioner = Uuid::new_v4();
    let mut other_day = appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled);
    other_day.appointment_date = date().succ_opt().unwrap();
    let existing = vec![
        appointment(Uuid::new_v4(), t(14, 0), 60, AppointmentStatus::Scheduled),
        other_day,
    ];

    let report = find_conflicts(&candidate(practitioner, t(14, 0), 60), &existing, None).unwrap();
    assert!(!report.has_conflict);
    assert!(report.conflicting_appointments.is_empty());
}

#[test]
fn test_excluded_appointment_does_not_conflict_with_itself() {
    let practitioner = Uuid::new_v4();
    let own = appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled);
    let own_id = own.id;
    let existing = vec![own];

    assert!(has_conflict(&candidate(practitioner, t(14, 30), 60), &existing, None).unwrap());
    assert!(!has_conflict(&candidate(practitioner, t(14, 30), 60), &existing, Some(own_id)).unwrap());
}

#[test]
fn test_multiple_conflicts_are_all_reported() {
    let practitioner = Uuid::new_v4();
    let existing = vec![
        appointment(practitioner, t(9, 0), 30, AppointmentStatus::Scheduled),
        appointment(practitioner, t(9, 30), 30, AppointmentStatus::Confirmed),
        appointment(practitioner, t(10, 0), 30, AppointmentStatus::Scheduled),
    ];

    let report = find_conflicts(&candidate(practitioner, t(9, 15), 60), &existing, None).unwrap();
    assert_eq!(report.conflicting_appointments.len(), 3);
}

#[test]
fn test_non_positive_duration_is_rejected() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled)];

    assert_matches!(
        find_conflicts(&candidate(practitioner, t(14, 0), 0), &existing, None),
        Err(AppointmentError::ValidationError(_))
    );
    assert_matches!(
        suggest_alternatives(&candidate(practitioner, t(14, 0), -30), &existing, &[t(8, 0)], 3, None),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn test_suggestions_follow_slot_order_and_limit() {
    let practitioner = Uuid::new_v4();
    let rules = SchedulingRules::default();
    let existing = vec![
        appointment(practitioner, t(7, 0), 60, AppointmentStatus::Scheduled),
        appointment(practitioner, t(8, 30), 60, AppointmentStatus::Confirmed),
        appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled),
    ];
    let requested = candidate(practitioner, t(14, 0), 60);

    let suggestions = suggest_alternatives(
        &requested,
        &existing,
        &rules.canonical_slots_fitting(60),
        rules.suggestion_limit,
        None,
    )
    .unwrap();

    // Every slot from 07:00 through 09:00 overlaps a morning booking
    assert_eq!(suggestions, vec![t(9, 30), t(10, 0), t(10, 30)]);
}

#[test]
fn test_suggestions_never_repeat_the_requested_time() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(8, 0), 30, AppointmentStatus::Scheduled)];
    let slots = vec![t(7, 30), t(8, 0), t(8, 30)];

    // 07:30 is the requested time and 08:00 overlaps the existing booking
    let suggestions = suggest_alternatives(&candidate(practitioner, t(7, 30), 60), &existing, &slots, 5, None).unwrap();
    assert_eq!(suggestions, vec![t(8, 30)]);
}

#[test]
fn test_fully_booked_day_has_no_suggestions() {
    let practitioner = Uuid::new_v4();
    let rules = SchedulingRules::default();
    let existing = vec![appointment(practitioner, t(7, 0), 720, AppointmentStatus::Scheduled)];

    let requested = candidate(practitioner, t(10, 0), 30);
    let suggestions = suggest_alternatives(
        &requested,
        &existing,
        &rules.canonical_slots_fitting(30),
        rules.suggestion_limit,
        None,
    )
    .unwrap();
    assert!(suggestions.is_empty());
}

#[test]
fn test_available_slots_skip_booked_times() {
    let practitioner = Uuid::new_v4();
    let existing = vec![appointment(practitioner, t(8, 0), 60, AppointmentStatus::Scheduled)];
    let slots = vec![t(7, 0), t(7, 30), t(8, 0), t(8, 30), t(9, 0)];

    let free = available_slots(&candidate(practitioner, t(7, 0), 30), &existing, &slots).unwrap();
    assert_eq!(free, vec![t(7, 0), t(7, 30), t(9, 0)]);
}

#[test]
fn test_canonical_slots_cover_business_hours() {
    let rules = SchedulingRules::default();
    let slots = rules.canonical_slots();

    assert_eq!(slots.len(), 24);
    assert_eq!(slots.first(), Some(&t(7, 0)));
    assert_eq!(slots.last(), Some(&t(18, 30)));

    let fitting = rules.canonical_slots_fitting(60);
    assert_eq!(fitting.last(), Some(&t(18, 0)));
    assert_eq!(fitting.len(), 23);
}

#[test]
fn test_duration_bounds() {
    let rules = SchedulingRules::default();
    assert!(rules.validate_duration(15).is_ok());
    assert!(rules.validate_duration(240).is_ok());
    assert_matches!(rules.validate_duration(10), Err(AppointmentError::ValidationError(_)));
    assert_matches!(rules.validate_duration(241), Err(AppointmentError::ValidationError(_)));
}

#[test]
fn test_conflict_error_lists_alternatives() {
    let err = AppointmentError::ConflictDetected {
        conflicting: vec![Uuid::new_v4()],
        suggestions: vec![t(15, 0), t(15, 30)],
    };
    assert_eq!(
        err.to_string(),
        "Appointment conflicts with 1 existing booking(s); available alternatives: 15:00, 15:30"
    );
}

#[test]
fn test_suggestions_are_deterministic() {
    let practitioner = Uuid::new_v4();
    let rules = SchedulingRules::default();
    let existing = vec![
        appointment(practitioner, t(9, 0), 90, AppointmentStatus::Confirmed),
        appointment(practitioner, t(14, 0), 60, AppointmentStatus::Scheduled),
        appointment(practitioner, t(16, 0), 45, AppointmentStatus::Cancelled),
    ];
    let requested = candidate(practitioner, t(14, 0), 60);
    let slots = rules.canonical_slots_fitting(60);

    let first = suggest_alternatives(&requested, &existing, &slots, rules.suggestion_limit, None).unwrap();
    let second = suggest_alternatives(&requested, &existing, &slots, rules.suggestion_limit, None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec![t(7, 0), t(7, 30), t(8, 0)]);
}

#[test]
fn test_candidate_at_end_of_calendar_is_rejected() {
    // The last calendar day is a valid JSON date
    let wire = serde_json::to_string(&NaiveDate::MAX).unwrap();
    let last_day: NaiveDate = serde_json::from_str(&wire).unwrap();

    let practitioner = Uuid::new_v4();
    let late = CandidateSlot {
        practitioner_id: practitioner,
        date: last_day,
        start_time: t(23, 30),
        duration_minutes: 60,
    };

    assert_matches!(find_conflicts(&late, &[], None), Err(AppointmentError::ValidationError(_)));
    assert_matches!(
        suggest_alternatives(&late, &[], &[t(8, 0)], 3, None),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn test_stored_appointment_running_past_calendar_end_still_blocks() {
    let practitioner = Uuid::new_v4();
    let mut stored = appointment(practitioner, t(22, 30), 120, AppointmentStatus::Scheduled);
    stored.appointment_date = NaiveDate::MAX;

    let early = CandidateSlot {
        practitioner_id: practitioner,
        date: NaiveDate::MAX,
        start_time: t(22, 0),
        duration_minutes: 60,
    };
    assert!(has_conflict(&early, &[stored.clone()], None).unwrap());
    assert!(TimeInterval::checked_starting_at(NaiveDate::MAX, t(22, 30), 120).is_none());
    assert_eq!(stored.interval().start, NaiveDate::MAX.and_time(t(22, 30)));
}

#[test]
fn test_oversized_slot_interval_is_clamped() {
    let rules = SchedulingRules {
        slot_interval_minutes: i64::MAX,
        ..SchedulingRules::default()
    };
    assert_eq!(rules.canonical_slots(), vec![t(7, 0)]);
    assert_eq!(rules.default_duration_minutes(), 30);

    let hourly = SchedulingRules {
        slot_interval_minutes: 45,
        ..SchedulingRules::default()
    };
    assert_eq!(hourly.default_duration_minutes(), 45);
}

#[test]
fn test_reschedule_reason_is_appended_to_notes() {
    assert_eq!(rescheduled_notes(None, "Paciente pediu"), "Rescheduled: Paciente pediu");
    assert_eq!(rescheduled_notes(Some("  "), "Paciente pediu"), "Rescheduled: Paciente pediu");
    assert_eq!(
        rescheduled_notes(Some("Dor lombar"), "Paciente pediu"),
        "Dor lombar\nRescheduled: Paciente pediu"
    );
}
