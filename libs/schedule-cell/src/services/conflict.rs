// libs/schedule-cell/src/services/conflict.rs
use tracing::{debug, warn};
use uuid::Uuid;

use crate::gateways::TherapistGateway;
use crate::models::{ConflictSeverity, ConflictType, Schedule, ScheduleConflict};

/// Pure pairwise scan over the current slot list, no side effects.
///
/// For every unordered pair of booked slots whose time ranges overlap:
/// same therapist -> double_booking (high); otherwise same room ->
/// room_conflict (medium). A slot may appear in multiple conflicts.
/// O(n^2) over a single day's slots, which stays in the tens.
pub fn detect_conflicts(schedule: &Schedule) -> Vec<ScheduleConflict> {
    let mut booked: Vec<_> = schedule.booked_slots().collect();
    // Deterministic scan order regardless of input order.
    booked.sort_by_key(|s| (s.start_time, s.id));

    let mut conflicts = Vec::new();

    for i in 0..booked.len() {
        for j in (i + 1)..booked.len() {
            let (a, b) = (booked[i], booked[j]);
            if !a.overlaps(b) {
                continue;
            }

            if a.therapist_id == b.therapist_id {
                conflicts.push(ScheduleConflict {
                    id: Uuid::new_v4(),
                    conflict_type: ConflictType::DoubleBooking,
                    severity: ConflictSeverity::High,
                    description: format!(
                        "Therapist {} is double-booked between {} and {}",
                        a.therapist_id,
                        b.start_time.max(a.start_time),
                        a.end_time.min(b.end_time),
                    ),
                    affected_appointments: vec![a.id, b.id],
                });
            } else if a.room_id == b.room_id {
                conflicts.push(ScheduleConflict {
                    id: Uuid::new_v4(),
                    conflict_type: ConflictType::RoomConflict,
                    severity: ConflictSeverity::Medium,
                    description: format!(
                        "Room {} is booked by two overlapping appointments between {} and {}",
                        a.room_id,
                        b.start_time.max(a.start_time),
                        a.end_time.min(b.end_time),
                    ),
                    affected_appointments: vec![a.id, b.id],
                });
            }
        }
    }

    debug!(
        "Detected {} conflicts across {} booked slots",
        conflicts.len(),
        booked.len()
    );

    conflicts
}

/// Flag booked slots whose therapist is not reported available for the
/// slot's window. Requires an external lookup, hence separate from the pure
/// pairwise scan. A failed lookup degrades to skipping that slot.
pub async fn detect_unavailable_therapists(
    schedule: &Schedule,
    gateway: &dyn TherapistGateway,
) -> Vec<ScheduleConflict> {
    let mut conflicts = Vec::new();

    for slot in schedule.booked_slots() {
        let available = match gateway
            .find_available_therapists(schedule.date, slot.start_time, slot.end_time)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    "Therapist availability lookup failed for slot {}: {}",
                    slot.id, e
                );
                continue;
            }
        };

        if !available.contains(&slot.therapist_id) {
            conflicts.push(ScheduleConflict {
                id: Uuid::new_v4(),
                conflict_type: ConflictType::TherapistUnavailable,
                severity: ConflictSeverity::High,
                description: format!(
                    "Therapist {} is unavailable for appointment {} ({} to {})",
                    slot.therapist_id, slot.id, slot.start_time, slot.end_time,
                ),
                affected_appointments: vec![slot.id],
            });
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeSlot;
    use chrono::{TimeZone, Utc};

    fn slot(
        hour: u32,
        min: u32,
        end_hour: u32,
        end_min: u32,
        therapist: Uuid,
        room: Uuid,
    ) -> TimeSlot {
        TimeSlot {
            id: Uuid::new_v4(),
            start_time: Utc.with_ymd_and_hms(2025, 6, 20, hour, min, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 20, end_hour, end_min, 0).unwrap(),
            therapist_id: therapist,
            room_id: room,
            patient_id: Some(Uuid::new_v4()),
            is_available: false,
        }
    }

    fn schedule_with(slots: Vec<TimeSlot>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            date: chrono::NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
            time_slots: slots,
            conflicts: vec![],
            optimization_suggestions: vec![],
        }
    }

    #[test]
    fn detects_double_booking_regardless_of_input_order() {
        let therapist = Uuid::new_v4();
        let a = slot(9, 0, 9, 30, therapist, Uuid::new_v4());
        let b = slot(9, 0, 9, 30, therapist, Uuid::new_v4());

        let forward = detect_conflicts(&schedule_with(vec![a.clone(), b.clone()]));
        let reversed = detect_conflicts(&schedule_with(vec![b.clone(), a.clone()]));

        assert_eq!(forward.len(), 1);
        assert_eq!(reversed.len(), 1);
        assert_eq!(forward[0].conflict_type, ConflictType::DoubleBooking);
        assert_eq!(forward[0].severity, ConflictSeverity::High);
        assert_eq!(
            forward[0].affected_appointments,
            reversed[0].affected_appointments
        );
        assert!(forward[0].affected_appointments.contains(&a.id));
        assert!(forward[0].affected_appointments.contains(&b.id));
    }

    #[test]
    fn detects_room_conflict_for_different_therapists() {
        let room = Uuid::new_v4();
        let a = slot(10, 0, 10, 45, Uuid::new_v4(), room);
        let b = slot(10, 30, 11, 0, Uuid::new_v4(), room);

        let conflicts = detect_conflicts(&schedule_with(vec![a, b]));

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::RoomConflict);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Medium);
    }

    #[test]
    fn non_overlapping_and_available_slots_produce_no_conflicts() {
        let therapist = Uuid::new_v4();
        let room = Uuid::new_v4();
        let a = slot(9, 0, 9, 30, therapist, room);
        let b = slot(9, 30, 10, 0, therapist, room);
        let mut free = slot(9, 0, 9, 30, therapist, room);
        free.is_available = true;
        free.patient_id = None;

        let conflicts = detect_conflicts(&schedule_with(vec![a, b, free]));

        assert!(conflicts.is_empty());
    }

    #[test]
    fn slot_may_appear_in_multiple_conflicts() {
        let therapist = Uuid::new_v4();
        let room = Uuid::new_v4();
        let a = slot(9, 0, 10, 0, therapist, room);
        let b = slot(9, 0, 9, 30, therapist, Uuid::new_v4());
        let c = slot(9, 30, 10, 0, Uuid::new_v4(), room);

        let conflicts = detect_conflicts(&schedule_with(vec![a.clone(), b, c]));

        assert_eq!(conflicts.len(), 2);
        assert!(conflicts
            .iter()
            .all(|conflict| conflict.affected_appointments.contains(&a.id)));
    }
}
