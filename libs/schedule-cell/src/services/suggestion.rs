// libs/schedule-cell/src/services/suggestion.rs
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::models::{
    OptimizationSuggestion, Schedule, SuggestedChanges, SuggestionType, TimeSlot,
};

/// Idle gaps shorter than this are not worth disturbing a patient for.
pub const MIN_GAP_MINUTES: i64 = 30;

/// A therapist whose booked minutes exceed the median by this much is
/// considered overloaded.
pub const LOAD_IMBALANCE_THRESHOLD_MINUTES: i64 = 60;

/// Room occupancy threshold, looser than the therapist one since rooms
/// tolerate back-to-back turnover better.
pub const ROOM_IMBALANCE_THRESHOLD_MINUTES: i64 = 90;

/// Only short sessions are candidates for merging.
pub const MAX_COMBINABLE_MINUTES: i64 = 30;

/// Transition overhead recovered by merging two adjacent sessions.
pub const MERGE_SAVINGS_MINUTES: i64 = 10;

/// Tunable cutoffs for the heuristics. Clinics with different session
/// lengths can loosen or tighten these per deployment.
#[derive(Debug, Clone)]
pub struct SuggestionThresholds {
    pub min_gap_minutes: i64,
    pub load_imbalance_minutes: i64,
    pub room_imbalance_minutes: i64,
    pub max_combinable_minutes: i64,
}

impl Default for SuggestionThresholds {
    fn default() -> Self {
        Self {
            min_gap_minutes: MIN_GAP_MINUTES,
            load_imbalance_minutes: LOAD_IMBALANCE_THRESHOLD_MINUTES,
            room_imbalance_minutes: ROOM_IMBALANCE_THRESHOLD_MINUTES,
            max_combinable_minutes: MAX_COMBINABLE_MINUTES,
        }
    }
}

/// Decides whether two booked slots may be merged into one longer session.
///
/// Contract: both slots are booked, adjacent (first ends exactly where the
/// second starts) and share therapist and room; the policy answers whether
/// the treatments are clinically compatible. Clinical merge rules are not
/// modelled here, so the default policy declines every merge.
pub trait SessionMergePolicy: Send + Sync {
    fn can_merge(&self, first: &TimeSlot, second: &TimeSlot) -> bool;
}

/// Default policy: never merge.
pub struct DeclineAllMerges;

impl SessionMergePolicy for DeclineAllMerges {
    fn can_merge(&self, _first: &TimeSlot, _second: &TimeSlot) -> bool {
        false
    }
}

/// Heuristic, side-effect-free suggestion generation. Returns the union of
/// all applicable heuristics, pre-sorted by priority descending, then
/// estimated savings descending, then id for determinism.
pub struct SuggestionGenerator {
    merge_policy: Arc<dyn SessionMergePolicy>,
    thresholds: SuggestionThresholds,
}

impl Default for SuggestionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SuggestionGenerator {
    pub fn new() -> Self {
        Self {
            merge_policy: Arc::new(DeclineAllMerges),
            thresholds: SuggestionThresholds::default(),
        }
    }

    pub fn with_merge_policy(merge_policy: Arc<dyn SessionMergePolicy>) -> Self {
        Self {
            merge_policy,
            thresholds: SuggestionThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: SuggestionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn generate(&self, schedule: &Schedule) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        suggestions.extend(self.gap_filling(schedule));
        suggestions.extend(self.load_balancing(schedule));
        suggestions.extend(self.room_balancing(schedule));
        suggestions.extend(self.session_combination(schedule));

        suggestions.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.estimated_savings_minutes.cmp(&a.estimated_savings_minutes))
                .then(a.id.cmp(&b.id))
        });

        debug!("Generated {} optimization suggestions", suggestions.len());
        suggestions
    }

    /// Suggest pulling a booking earlier when a therapist sits idle for at
    /// least `min_gap_minutes` between two of their appointments.
    fn gap_filling(&self, schedule: &Schedule) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        for slots in slots_by(schedule, |s| s.therapist_id).values() {
            for pair in slots.windows(2) {
                let (earlier, later) = (pair[0], pair[1]);
                let gap = (later.start_time - earlier.end_time).num_minutes();
                if gap < self.thresholds.min_gap_minutes {
                    continue;
                }

                let shift = chrono::Duration::minutes(gap);
                suggestions.push(OptimizationSuggestion {
                    id: Uuid::new_v4(),
                    suggestion_type: SuggestionType::Reschedule,
                    priority: gap as i32,
                    estimated_savings_minutes: gap,
                    description: format!(
                        "Move appointment {} earlier by {} minutes to close an idle gap for therapist {}",
                        later.id, gap, later.therapist_id,
                    ),
                    original_appointment_id: later.id,
                    suggested_changes: SuggestedChanges {
                        new_start_time: Some(later.start_time - shift),
                        new_end_time: Some(later.end_time - shift),
                        ..Default::default()
                    },
                });
            }
        }

        suggestions
    }

    /// Suggest shifting a booking off an overloaded therapist onto the
    /// least-loaded therapist who is free in the same window.
    fn load_balancing(&self, schedule: &Schedule) -> Vec<OptimizationSuggestion> {
        self.rebalance(
            schedule,
            |s| s.therapist_id,
            self.thresholds.load_imbalance_minutes,
            |slot, candidate, excess| OptimizationSuggestion {
                id: Uuid::new_v4(),
                suggestion_type: SuggestionType::ReassignTherapist,
                priority: (excess / 2) as i32,
                estimated_savings_minutes: slot.duration_minutes(),
                description: format!(
                    "Reassign appointment {} from overloaded therapist {} to therapist {}",
                    slot.id, slot.therapist_id, candidate,
                ),
                original_appointment_id: slot.id,
                suggested_changes: SuggestedChanges {
                    new_therapist_id: Some(candidate),
                    ..Default::default()
                },
            },
            |schedule, candidate, slot| {
                schedule.therapist_is_free(candidate, slot.start_time, slot.end_time, Some(slot.id))
            },
        )
    }

    /// Same idea as load balancing, applied to room occupancy.
    fn room_balancing(&self, schedule: &Schedule) -> Vec<OptimizationSuggestion> {
        self.rebalance(
            schedule,
            |s| s.room_id,
            self.thresholds.room_imbalance_minutes,
            |slot, candidate, excess| OptimizationSuggestion {
                id: Uuid::new_v4(),
                suggestion_type: SuggestionType::ChangeRoom,
                priority: (excess / 3) as i32,
                estimated_savings_minutes: slot.duration_minutes() / 2,
                description: format!(
                    "Move appointment {} from busy room {} to room {}",
                    slot.id, slot.room_id, candidate,
                ),
                original_appointment_id: slot.id,
                suggested_changes: SuggestedChanges {
                    new_room_id: Some(candidate),
                    ..Default::default()
                },
            },
            |schedule, candidate, slot| {
                schedule.room_is_free(candidate, slot.start_time, slot.end_time, Some(slot.id))
            },
        )
    }

    fn rebalance(
        &self,
        schedule: &Schedule,
        key: impl Fn(&TimeSlot) -> Uuid + Copy,
        threshold: i64,
        build: impl Fn(&TimeSlot, Uuid, i64) -> OptimizationSuggestion,
        candidate_is_free: impl Fn(&Schedule, Uuid, &TimeSlot) -> bool,
    ) -> Vec<OptimizationSuggestion> {
        let grouped = slots_by(schedule, key);
        if grouped.len() < 2 {
            return Vec::new();
        }

        let mut loads: Vec<(Uuid, i64)> = grouped
            .iter()
            .map(|(id, slots)| (*id, slots.iter().map(|s| s.duration_minutes()).sum()))
            .collect();
        loads.sort_by_key(|(id, minutes)| (*minutes, *id));

        // Lower median, so a two-resource imbalance still registers.
        let median = loads[(loads.len() - 1) / 2].1;
        let mut suggestions = Vec::new();

        for (resource, minutes) in loads.iter().rev() {
            let excess = minutes - median;
            if excess < threshold {
                break;
            }

            // Try to move the overloaded resource's last booking of the day.
            let Some(slot) = grouped[resource].last() else {
                continue;
            };

            let candidate = loads.iter().find(|(other, other_minutes)| {
                *other != *resource
                    && *other_minutes <= median
                    && candidate_is_free(schedule, *other, slot)
            });

            if let Some((candidate, _)) = candidate {
                suggestions.push(build(slot, *candidate, excess));
            }
        }

        suggestions
    }

    /// Propose merging two short adjacent sessions that share therapist and
    /// room, when the configured policy approves the pairing.
    fn session_combination(&self, schedule: &Schedule) -> Vec<OptimizationSuggestion> {
        let mut booked: Vec<_> = schedule.booked_slots().collect();
        booked.sort_by_key(|s| (s.start_time, s.id));

        let mut suggestions = Vec::new();

        for pair in booked.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            let adjacent = first.end_time == second.start_time;
            let short = first.duration_minutes() <= self.thresholds.max_combinable_minutes
                && second.duration_minutes() <= self.thresholds.max_combinable_minutes;
            let same_resources = first.therapist_id == second.therapist_id
                && first.room_id == second.room_id;

            if !(adjacent && short && same_resources) {
                continue;
            }
            if !self.merge_policy.can_merge(first, second) {
                continue;
            }

            suggestions.push(OptimizationSuggestion {
                id: Uuid::new_v4(),
                suggestion_type: SuggestionType::CombineSessions,
                priority: 25,
                estimated_savings_minutes: MERGE_SAVINGS_MINUTES,
                description: format!(
                    "Combine adjacent sessions {} and {} into one longer session",
                    first.id, second.id,
                ),
                original_appointment_id: first.id,
                suggested_changes: SuggestedChanges {
                    new_end_time: Some(second.end_time),
                    merge_with_appointment_id: Some(second.id),
                    ..Default::default()
                },
            });
        }

        suggestions
    }
}

/// Booked slots grouped by the given key, each group sorted by start time.
fn slots_by(
    schedule: &Schedule,
    key: impl Fn(&TimeSlot) -> Uuid,
) -> HashMap<Uuid, Vec<&TimeSlot>> {
    let mut grouped: HashMap<Uuid, Vec<&TimeSlot>> = HashMap::new();
    for slot in schedule.booked_slots() {
        grouped.entry(key(slot)).or_default().push(slot);
    }
    for slots in grouped.values_mut() {
        slots.sort_by_key(|s| (s.start_time, s.id));
    }
    grouped
}
