// libs/schedule-cell/src/services/optimizer.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::gateways::{RoomGateway, ScheduleStore, TherapistGateway};
use crate::models::{
    ConflictType, OptimizationResult, OptimizationSuggestion, OptimizeScheduleRequest, Schedule,
    ScheduleConflict, ScheduleError, SuggestionType,
};
use crate::services::{conflict, efficiency, recommendation, suggestion::SessionMergePolicy,
    suggestion::SuggestionGenerator};

/// Fallback offset when a double booking cannot be reassigned.
const RESCHEDULE_PUSH_MINUTES: i64 = 30;

/// The optimize-schedule use case. Clones the stored schedule, resolves
/// conflicts by type-specific strategy, applies ranked suggestions,
/// recomputes efficiency on both copies and persists the result.
///
/// Runs for different schedule ids proceed concurrently; runs for the same
/// id are serialized through a per-id async mutex so overlapping writes
/// cannot clobber each other's fixes.
pub struct ScheduleOptimizationService {
    store: Arc<dyn ScheduleStore>,
    therapists: Arc<dyn TherapistGateway>,
    rooms: Arc<dyn RoomGateway>,
    suggestions: SuggestionGenerator,
    schedule_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ScheduleOptimizationService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        therapists: Arc<dyn TherapistGateway>,
        rooms: Arc<dyn RoomGateway>,
    ) -> Self {
        Self {
            store,
            therapists,
            rooms,
            suggestions: SuggestionGenerator::new(),
            schedule_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_merge_policy(
        store: Arc<dyn ScheduleStore>,
        therapists: Arc<dyn TherapistGateway>,
        rooms: Arc<dyn RoomGateway>,
        merge_policy: Arc<dyn SessionMergePolicy>,
    ) -> Self {
        Self {
            store,
            therapists,
            rooms,
            suggestions: SuggestionGenerator::with_merge_policy(merge_policy),
            schedule_locks: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self, request), fields(schedule_id = %request.schedule_id))]
    pub async fn execute(
        &self,
        request: OptimizeScheduleRequest,
    ) -> Result<OptimizationResult, ScheduleError> {
        let lock = self.lock_for(request.schedule_id).await;
        let guard = lock.lock().await;

        let result = self.run(&request).await;

        drop(guard);
        drop(lock);
        self.evict_lock(request.schedule_id).await;

        result
    }

    async fn run(
        &self,
        request: &OptimizeScheduleRequest,
    ) -> Result<OptimizationResult, ScheduleError> {
        let started = Instant::now();

        let original = self
            .store
            .find_by_id(request.schedule_id)
            .await?
            .ok_or(ScheduleError::NotFound)?;

        original.validate()?;

        // The caller-visible original is never mutated; all work happens on
        // a structural copy.
        let mut working = original.clone();

        let mut conflicts = conflict::detect_conflicts(&working);
        conflicts.extend(
            conflict::detect_unavailable_therapists(&working, self.therapists.as_ref()).await,
        );
        conflicts.sort_by_key(|c| c.conflict_type.resolution_order());

        info!("Found {} conflicts on schedule {}", conflicts.len(), working.id);

        let mut resolved = Vec::new();
        let mut unresolved_count = 0usize;

        for schedule_conflict in conflicts {
            let fixed = match schedule_conflict.conflict_type {
                ConflictType::DoubleBooking => {
                    self.resolve_double_booking(&mut working, &schedule_conflict, request)
                        .await
                }
                ConflictType::RoomConflict => {
                    self.resolve_room_conflict(&mut working, &schedule_conflict, request)
                        .await
                }
                // No automated remediation policy exists for unavailability;
                // the conflict is reported back for manual attention.
                ConflictType::TherapistUnavailable => false,
            };

            if fixed {
                resolved.push(schedule_conflict);
            } else {
                warn!(
                    "Conflict {} ({}) left unresolved",
                    schedule_conflict.id, schedule_conflict.conflict_type
                );
                unresolved_count += 1;
            }
        }

        // Suggestions are generated against the already-mutated copy and
        // re-validated one by one as earlier applications change the state.
        let generated = self.suggestions.generate(&working);
        let mut applied = Vec::new();

        for candidate in generated {
            if Self::apply_suggestion(&mut working, &candidate, request) {
                applied.push(candidate);
            } else {
                debug!("Skipped suggestion {} after re-validation", candidate.id);
            }
        }

        // Stored conflicts are stale after mutation; re-detect before
        // persisting.
        working.conflicts = conflict::detect_conflicts(&working);
        working.optimization_suggestions.clear();

        let original_score = efficiency::calculate_efficiency_score(&original);
        let optimized_score = efficiency::calculate_efficiency_score(&working);
        let efficiency_improvement = optimized_score - original_score;
        let estimated_time_saved_minutes = applied
            .iter()
            .map(|s| s.estimated_savings_minutes)
            .sum::<i64>();

        self.store.save(&working).await?;

        let recommendations = recommendation::build_recommendations(
            &applied,
            &resolved,
            unresolved_count,
            efficiency_improvement,
            estimated_time_saved_minutes,
        );

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            resolved = resolved.len(),
            applied = applied.len(),
            unresolved = unresolved_count,
            "Schedule optimization completed"
        );

        Ok(OptimizationResult {
            original_schedule: original,
            optimized_schedule: working,
            applied_suggestions: applied,
            resolved_conflicts: resolved,
            efficiency_improvement,
            estimated_time_saved_minutes,
            recommendations,
        })
    }

    async fn lock_for(&self, schedule_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.schedule_locks.lock().await;
        locks
            .entry(schedule_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the registry entry once no run holds it, so the map does not
    /// grow by one entry per schedule id for the process lifetime.
    async fn evict_lock(&self, schedule_id: Uuid) {
        let mut locks = self.schedule_locks.lock().await;
        if let Some(entry) = locks.get(&schedule_id) {
            // Strong count 1 means only the registry still holds it.
            if Arc::strong_count(entry) == 1 {
                locks.remove(&schedule_id);
            }
        }
    }

    /// Best-effort: reassign the second affected slot to an alternate
    /// therapist free in the window, else push it 30 minutes later. Never
    /// forced; returns false when neither move fits.
    async fn resolve_double_booking(
        &self,
        working: &mut Schedule,
        schedule_conflict: &ScheduleConflict,
        request: &OptimizeScheduleRequest,
    ) -> bool {
        let [first_id, second_id, ..] = schedule_conflict.affected_appointments[..] else {
            return false;
        };

        let Some(window) = working.slot(first_id).map(|s| (s.start_time, s.end_time)) else {
            return false;
        };
        let Some(target) = working.slot(second_id).cloned() else {
            return false;
        };

        if request.appointment_is_locked(target.id) || request.therapist_is_locked(target.therapist_id) {
            return false;
        }

        let candidates = match self
            .therapists
            .find_available_therapists(working.date, window.0, window.1)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Therapist lookup failed during resolution: {}", e);
                Vec::new()
            }
        };

        for candidate in candidates {
            if candidate == target.therapist_id || request.therapist_is_locked(candidate) {
                continue;
            }
            if !working.therapist_is_free(candidate, target.start_time, target.end_time, Some(target.id)) {
                continue;
            }
            match self.therapists.get_preferences(candidate).await {
                Ok(prefs) if !prefs.accepts_reassignment => continue,
                Err(e) => {
                    warn!("Preference lookup failed for therapist {}: {}", candidate, e);
                    continue;
                }
                Ok(_) => {}
            }

            if let Some(slot) = working.slot_mut(target.id) {
                slot.therapist_id = candidate;
                debug!("Reassigned appointment {} to therapist {}", target.id, candidate);
                return true;
            }
        }

        // Fallback: push the slot later by a fixed offset if the new window
        // is free for the same therapist and room.
        let push = Duration::minutes(RESCHEDULE_PUSH_MINUTES);
        let (new_start, new_end) = (target.start_time + push, target.end_time + push);

        if working.therapist_is_free(target.therapist_id, new_start, new_end, Some(target.id))
            && working.room_is_free(target.room_id, new_start, new_end, Some(target.id))
        {
            if let Some(slot) = working.slot_mut(target.id) {
                slot.start_time = new_start;
                slot.end_time = new_end;
                debug!("Pushed appointment {} later by {} minutes", target.id, RESCHEDULE_PUSH_MINUTES);
                return true;
            }
        }

        false
    }

    /// Best-effort: move the second affected slot into any alternative free
    /// room with capacity.
    async fn resolve_room_conflict(
        &self,
        working: &mut Schedule,
        schedule_conflict: &ScheduleConflict,
        request: &OptimizeScheduleRequest,
    ) -> bool {
        let [_, second_id, ..] = schedule_conflict.affected_appointments[..] else {
            return false;
        };

        let Some(target) = working.slot(second_id).cloned() else {
            return false;
        };

        if request.appointment_is_locked(target.id) {
            return false;
        }

        let candidates = match self
            .rooms
            .find_available_rooms(working.date, target.start_time, target.end_time)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Room lookup failed during resolution: {}", e);
                Vec::new()
            }
        };

        for candidate in candidates {
            if candidate == target.room_id || request.room_is_excluded(candidate) {
                continue;
            }
            if !working.room_is_free(candidate, target.start_time, target.end_time, Some(target.id)) {
                continue;
            }
            match self.rooms.get_capacity(candidate).await {
                Ok(capacity) if capacity < 1 => continue,
                Err(e) => {
                    warn!("Capacity lookup failed for room {}: {}", candidate, e);
                    continue;
                }
                Ok(_) => {}
            }

            if let Some(slot) = working.slot_mut(target.id) {
                slot.room_id = candidate;
                debug!("Moved appointment {} to room {}", target.id, candidate);
                return true;
            }
        }

        false
    }

    /// Apply one suggestion against the current working copy, re-validating
    /// its preconditions first. Returns false (skip) when the target slot is
    /// gone, locked, or the proposed resource is no longer free.
    fn apply_suggestion(
        working: &mut Schedule,
        candidate: &OptimizationSuggestion,
        request: &OptimizeScheduleRequest,
    ) -> bool {
        if request.appointment_is_locked(candidate.original_appointment_id) {
            return false;
        }

        let Some(target) = working.slot(candidate.original_appointment_id).cloned() else {
            return false;
        };
        if target.is_available {
            return false;
        }

        let changes = &candidate.suggested_changes;

        match candidate.suggestion_type {
            SuggestionType::Reschedule => {
                let (Some(new_start), Some(new_end)) = (changes.new_start_time, changes.new_end_time)
                else {
                    return false;
                };
                if new_start >= new_end {
                    return false;
                }
                if !working.therapist_is_free(target.therapist_id, new_start, new_end, Some(target.id))
                    || !working.room_is_free(target.room_id, new_start, new_end, Some(target.id))
                {
                    return false;
                }
                if let Some(slot) = working.slot_mut(target.id) {
                    slot.start_time = new_start;
                    slot.end_time = new_end;
                    true
                } else {
                    false
                }
            }
            SuggestionType::ReassignTherapist => {
                let Some(new_therapist) = changes.new_therapist_id else {
                    return false;
                };
                if request.therapist_is_locked(target.therapist_id)
                    || request.therapist_is_locked(new_therapist)
                {
                    return false;
                }
                if !working.therapist_is_free(new_therapist, target.start_time, target.end_time, Some(target.id)) {
                    return false;
                }
                if let Some(slot) = working.slot_mut(target.id) {
                    slot.therapist_id = new_therapist;
                    true
                } else {
                    false
                }
            }
            SuggestionType::ChangeRoom => {
                let Some(new_room) = changes.new_room_id else {
                    return false;
                };
                if request.room_is_excluded(new_room) {
                    return false;
                }
                if !working.room_is_free(new_room, target.start_time, target.end_time, Some(target.id)) {
                    return false;
                }
                if let Some(slot) = working.slot_mut(target.id) {
                    slot.room_id = new_room;
                    true
                } else {
                    false
                }
            }
            SuggestionType::CombineSessions => {
                Self::apply_merge(working, &target.id, changes.merge_with_appointment_id, request)
            }
        }
    }

    /// Merge routine: extend the first slot to cover the second and release
    /// the second as free capacity. Slots are never deleted, so patient
    /// continuity data survives the merge.
    fn apply_merge(
        working: &mut Schedule,
        first_id: &Uuid,
        second_id: Option<Uuid>,
        request: &OptimizeScheduleRequest,
    ) -> bool {
        let Some(second_id) = second_id else {
            return false;
        };
        if request.appointment_is_locked(second_id) {
            return false;
        }

        let (Some(first), Some(second)) =
            (working.slot(*first_id).cloned(), working.slot(second_id).cloned())
        else {
            return false;
        };

        let still_adjacent = first.end_time == second.start_time;
        let same_resources =
            first.therapist_id == second.therapist_id && first.room_id == second.room_id;
        if !(first.is_booked() && second.is_booked() && still_adjacent && same_resources) {
            return false;
        }

        if let Some(slot) = working.slot_mut(*first_id) {
            slot.end_time = second.end_time;
        } else {
            return false;
        }
        if let Some(released) = working.slot_mut(second_id) {
            released.is_available = true;
            released.patient_id = None;
        } else {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::{RoomGateway, ScheduleStore, TherapistGateway};
    use crate::models::{Schedule, TherapistPreference, TimeSlot};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    struct SingleScheduleStore {
        schedule: Schedule,
    }

    #[async_trait]
    impl ScheduleStore for SingleScheduleStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
            Ok((id == self.schedule.id).then(|| self.schedule.clone()))
        }

        async fn save(&self, _schedule: &Schedule) -> Result<(), ScheduleError> {
            Ok(())
        }

        async fn find_by_date_range(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Schedule>, ScheduleError> {
            Ok(vec![self.schedule.clone()])
        }
    }

    struct UnreachableTherapists;

    #[async_trait]
    impl TherapistGateway for UnreachableTherapists {
        async fn find_available_therapists(
            &self,
            _date: NaiveDate,
            _start_time: DateTime<Utc>,
            _end_time: DateTime<Utc>,
        ) -> Result<Vec<Uuid>, ScheduleError> {
            Err(ScheduleError::GatewayUnavailable("offline".to_string()))
        }

        async fn get_preferences(
            &self,
            therapist_id: Uuid,
        ) -> Result<TherapistPreference, ScheduleError> {
            Ok(TherapistPreference::permissive(therapist_id))
        }
    }

    struct UnreachableRooms;

    #[async_trait]
    impl RoomGateway for UnreachableRooms {
        async fn find_available_rooms(
            &self,
            _date: NaiveDate,
            _start_time: DateTime<Utc>,
            _end_time: DateTime<Utc>,
        ) -> Result<Vec<Uuid>, ScheduleError> {
            Err(ScheduleError::GatewayUnavailable("offline".to_string()))
        }

        async fn get_capacity(&self, _room_id: Uuid) -> Result<i32, ScheduleError> {
            Ok(0)
        }
    }

    fn one_slot_schedule() -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
            time_slots: vec![TimeSlot {
                id: Uuid::new_v4(),
                start_time: Utc.with_ymd_and_hms(2025, 6, 20, 9, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2025, 6, 20, 10, 0, 0).unwrap(),
                therapist_id: Uuid::new_v4(),
                room_id: Uuid::new_v4(),
                patient_id: Some(Uuid::new_v4()),
                is_available: false,
            }],
            conflicts: vec![],
            optimization_suggestions: vec![],
        }
    }

    fn request_for(schedule: &Schedule) -> OptimizeScheduleRequest {
        OptimizeScheduleRequest {
            schedule_id: schedule.id,
            date: schedule.date,
            therapist_preferences: None,
            room_constraints: None,
            patient_preferences: None,
        }
    }

    fn service_with(schedule: Schedule) -> ScheduleOptimizationService {
        ScheduleOptimizationService::new(
            Arc::new(SingleScheduleStore { schedule }),
            Arc::new(UnreachableTherapists),
            Arc::new(UnreachableRooms),
        )
    }

    #[tokio::test]
    async fn lock_registry_entry_is_dropped_after_a_run() {
        let schedule = one_slot_schedule();
        let request = request_for(&schedule);
        let svc = service_with(schedule);

        svc.execute(request).await.unwrap();

        assert!(svc.schedule_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn lock_registry_entry_is_dropped_after_a_failed_run() {
        let schedule = one_slot_schedule();
        let svc = service_with(schedule.clone());

        let mut request = request_for(&schedule);
        request.schedule_id = Uuid::new_v4();

        let result = svc.execute(request).await;

        assert!(matches!(result, Err(ScheduleError::NotFound)));
        assert!(svc.schedule_locks.lock().await.is_empty());
    }
}
