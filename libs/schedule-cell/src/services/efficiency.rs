// libs/schedule-cell/src/services/efficiency.rs
//
// score = 100 - (conflict_penalty + gap_penalty + imbalance_penalty)
//
// The weights below are the documented, stable coefficients used for every
// comparison within one optimization run. The guaranteed property is
// monotonicity: more conflicts can never raise the score, and more idle
// minutes between same-therapist bookings can never raise it either.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ConflictSeverity, Schedule, TimeSlot};
use crate::services::conflict;

/// Penalty points per conflict, by severity.
pub const HIGH_SEVERITY_PENALTY: f64 = 15.0;
pub const MEDIUM_SEVERITY_PENALTY: f64 = 8.0;
pub const LOW_SEVERITY_PENALTY: f64 = 3.0;

/// Penalty points per idle minute between same-therapist bookings.
pub const GAP_PENALTY_PER_MINUTE: f64 = 0.25;

/// Penalty points per minute of standard deviation in resource load.
pub const IMBALANCE_PENALTY_WEIGHT: f64 = 0.2;

/// Deterministic, pure 0-100 efficiency score over the current slot list.
/// Conflicts are re-detected from the slots so stale stored conflicts never
/// skew the score.
pub fn calculate_efficiency_score(schedule: &Schedule) -> f64 {
    let conflicts = conflict::detect_conflicts(schedule);

    let conflict_penalty = conflicts
        .iter()
        .map(|c| match c.severity {
            ConflictSeverity::High => HIGH_SEVERITY_PENALTY,
            ConflictSeverity::Medium => MEDIUM_SEVERITY_PENALTY,
            ConflictSeverity::Low => LOW_SEVERITY_PENALTY,
        })
        .sum::<f64>()
        .clamp(0.0, 100.0);

    let gap_penalty =
        (total_idle_gap_minutes(schedule) as f64 * GAP_PENALTY_PER_MINUTE).clamp(0.0, 100.0);

    let therapist_minutes = booked_minutes_by(schedule, |s| s.therapist_id);
    let room_minutes = booked_minutes_by(schedule, |s| s.room_id);
    let imbalance = (std_deviation(&therapist_minutes) + std_deviation(&room_minutes)) / 2.0;
    let imbalance_penalty = (imbalance * IMBALANCE_PENALTY_WEIGHT).clamp(0.0, 100.0);

    (100.0 - (conflict_penalty + gap_penalty + imbalance_penalty)).clamp(0.0, 100.0)
}

/// Total idle minutes between consecutive bookings of the same therapist.
/// Overlapping bookings contribute zero gap (they are penalized as
/// conflicts instead).
pub fn total_idle_gap_minutes(schedule: &Schedule) -> i64 {
    let mut by_therapist: HashMap<Uuid, Vec<&TimeSlot>> = HashMap::new();
    for slot in schedule.booked_slots() {
        by_therapist.entry(slot.therapist_id).or_default().push(slot);
    }

    let mut total = 0;
    for slots in by_therapist.values_mut() {
        slots.sort_by_key(|s| (s.start_time, s.id));
        for pair in slots.windows(2) {
            total += (pair[1].start_time - pair[0].end_time).num_minutes().max(0);
        }
    }
    total
}

fn booked_minutes_by(schedule: &Schedule, key: impl Fn(&TimeSlot) -> Uuid) -> Vec<i64> {
    let mut minutes: HashMap<Uuid, i64> = HashMap::new();
    for slot in schedule.booked_slots() {
        *minutes.entry(key(slot)).or_default() += slot.duration_minutes();
    }
    minutes.into_values().collect()
}

fn std_deviation(values: &[i64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<i64>() as f64 / values.len() as f64;
    let variance = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn slot(start: (u32, u32), end: (u32, u32), therapist: Uuid, room: Uuid) -> TimeSlot {
        TimeSlot {
            id: Uuid::new_v4(),
            start_time: Utc.with_ymd_and_hms(2025, 6, 20, start.0, start.1, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 20, end.0, end.1, 0).unwrap(),
            therapist_id: therapist,
            room_id: room,
            patient_id: Some(Uuid::new_v4()),
            is_available: false,
        }
    }

    fn schedule_with(slots: Vec<TimeSlot>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
            time_slots: slots,
            conflicts: vec![],
            optimization_suggestions: vec![],
        }
    }

    #[test]
    fn score_is_bounded() {
        let empty = schedule_with(vec![]);
        assert_eq!(empty.calculate_efficiency_score(), 100.0);

        let therapist = Uuid::new_v4();
        // Pile up double bookings; score must clamp at zero, not underflow.
        let slots: Vec<_> = (0..10)
            .map(|_| slot((9, 0), (10, 0), therapist, Uuid::new_v4()))
            .collect();
        let score = schedule_with(slots).calculate_efficiency_score();
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn an_additional_double_booking_never_raises_the_score() {
        let therapist = Uuid::new_v4();
        let room = Uuid::new_v4();
        let a = schedule_with(vec![slot((9, 0), (9, 30), therapist, room)]);

        let mut b = a.clone();
        b.time_slots.push(slot((9, 0), (9, 30), therapist, Uuid::new_v4()));

        assert!(b.calculate_efficiency_score() <= a.calculate_efficiency_score());
    }

    #[test]
    fn a_wider_idle_gap_never_raises_the_score() {
        let therapist = Uuid::new_v4();
        let room = Uuid::new_v4();

        let compact = schedule_with(vec![
            slot((9, 0), (9, 30), therapist, room),
            slot((9, 30), (10, 0), therapist, room),
        ]);
        let gappy = schedule_with(vec![
            slot((9, 0), (9, 30), therapist, room),
            slot((10, 15), (10, 45), therapist, room),
        ]);

        assert_eq!(total_idle_gap_minutes(&compact), 0);
        assert_eq!(total_idle_gap_minutes(&gappy), 45);
        assert!(gappy.calculate_efficiency_score() <= compact.calculate_efficiency_score());
    }

    #[test]
    fn score_is_deterministic() {
        let therapist = Uuid::new_v4();
        let room = Uuid::new_v4();
        let schedule = schedule_with(vec![
            slot((9, 0), (9, 30), therapist, room),
            slot((10, 15), (10, 45), therapist, room),
        ]);

        assert_eq!(
            schedule.calculate_efficiency_score(),
            schedule.calculate_efficiency_score()
        );
    }
}
