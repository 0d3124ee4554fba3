// libs/schedule-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate};
use std::fmt;

use crate::services::{conflict, efficiency, suggestion};

// ==============================================================================
// CORE SCHEDULE MODELS
// ==============================================================================

/// One scheduled (or free) appointment unit within a day's schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub therapist_id: Uuid,
    pub room_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub is_available: bool,
}

impl TimeSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// Two slots overlap if: start1 < end2 AND start2 < end1
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }

    pub fn is_booked(&self) -> bool {
        !self.is_available
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DoubleBooking,
    RoomConflict,
    TherapistUnavailable,
}

impl ConflictType {
    /// Fixed resolution priority: double bookings first, then room
    /// contention, then unavailability.
    pub fn resolution_order(&self) -> u8 {
        match self {
            ConflictType::DoubleBooking => 0,
            ConflictType::RoomConflict => 1,
            ConflictType::TherapistUnavailable => 2,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::DoubleBooking => write!(f, "double_booking"),
            ConflictType::RoomConflict => write!(f, "room_conflict"),
            ConflictType::TherapistUnavailable => write!(f, "therapist_unavailable"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

/// A detected resource contention between bookings.
///
/// Conflicts are snapshots of the slot list they were detected on; once the
/// schedule mutates they are stale and must be re-detected, never patched.
///
/// `affected_appointments` holds the two contending slot ids for pairwise
/// conflicts (double_booking, room_conflict). A therapist_unavailable
/// conflict involves no second slot, so it carries the single affected id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConflict {
    pub id: Uuid,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    pub affected_appointments: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Reschedule,
    ReassignTherapist,
    ChangeRoom,
    CombineSessions,
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionType::Reschedule => write!(f, "reschedule"),
            SuggestionType::ReassignTherapist => write!(f, "reassign_therapist"),
            SuggestionType::ChangeRoom => write!(f, "change_room"),
            SuggestionType::CombineSessions => write!(f, "combine_sessions"),
        }
    }
}

/// Sparse patch describing the change a suggestion would make.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuggestedChanges {
    pub new_start_time: Option<DateTime<Utc>>,
    pub new_end_time: Option<DateTime<Utc>>,
    pub new_therapist_id: Option<Uuid>,
    pub new_room_id: Option<Uuid>,
    pub merge_with_appointment_id: Option<Uuid>,
}

/// An advisory, not-yet-applied improving move. Applying a suggestion must
/// re-validate its preconditions against the current slot list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationSuggestion {
    pub id: Uuid,
    pub suggestion_type: SuggestionType,
    pub priority: i32,
    pub estimated_savings_minutes: i64,
    pub description: String,
    pub original_appointment_id: Uuid,
    pub suggested_changes: SuggestedChanges,
}

/// Aggregate root for one day of therapy bookings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub date: NaiveDate,
    pub time_slots: Vec<TimeSlot>,
    pub conflicts: Vec<ScheduleConflict>,
    pub optimization_suggestions: Vec<OptimizationSuggestion>,
}

impl Schedule {
    /// Fail fast on malformed slot data before any mutation happens.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for slot in &self.time_slots {
            if slot.start_time >= slot.end_time {
                return Err(ScheduleError::InvalidSchedule(format!(
                    "Time slot {} has start_time >= end_time",
                    slot.id
                )));
            }
        }
        Ok(())
    }

    pub fn slot(&self, id: Uuid) -> Option<&TimeSlot> {
        self.time_slots.iter().find(|s| s.id == id)
    }

    pub fn slot_mut(&mut self, id: Uuid) -> Option<&mut TimeSlot> {
        self.time_slots.iter_mut().find(|s| s.id == id)
    }

    pub fn booked_slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.time_slots.iter().filter(|s| s.is_booked())
    }

    /// True if the therapist has no booked slot overlapping the window,
    /// ignoring the slot identified by `exclude`.
    pub fn therapist_is_free(
        &self,
        therapist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> bool {
        !self.booked_slots().any(|s| {
            s.therapist_id == therapist_id
                && Some(s.id) != exclude
                && s.start_time < end
                && start < s.end_time
        })
    }

    /// True if the room has no booked slot overlapping the window,
    /// ignoring the slot identified by `exclude`.
    pub fn room_is_free(
        &self,
        room_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> bool {
        !self.booked_slots().any(|s| {
            s.room_id == room_id
                && Some(s.id) != exclude
                && s.start_time < end
                && start < s.end_time
        })
    }

    /// Pure pairwise scan of the current slot list.
    pub fn detect_conflicts(&self) -> Vec<ScheduleConflict> {
        conflict::detect_conflicts(self)
    }

    /// Heuristic suggestions with the default (decline-all) merge policy.
    pub fn generate_optimization_suggestions(&self) -> Vec<OptimizationSuggestion> {
        suggestion::SuggestionGenerator::new().generate(self)
    }

    /// Deterministic 0-100 score; see `services::efficiency` for the weights.
    pub fn calculate_efficiency_score(&self) -> f64 {
        efficiency::calculate_efficiency_score(self)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Caller-supplied constraints honoured during conflict resolution and
/// suggestion application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TherapistPreferences {
    /// Therapists whose assignments must not be changed by the optimizer.
    pub locked_therapists: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomConstraints {
    /// Rooms the optimizer must not move appointments into.
    pub excluded_rooms: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPreferences {
    /// Appointments that must keep their time and assignments.
    pub locked_appointments: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeScheduleRequest {
    pub schedule_id: Uuid,
    pub date: NaiveDate,
    pub therapist_preferences: Option<TherapistPreferences>,
    pub room_constraints: Option<RoomConstraints>,
    pub patient_preferences: Option<PatientPreferences>,
}

impl OptimizeScheduleRequest {
    pub fn therapist_is_locked(&self, therapist_id: Uuid) -> bool {
        self.therapist_preferences
            .as_ref()
            .map(|p| p.locked_therapists.contains(&therapist_id))
            .unwrap_or(false)
    }

    pub fn room_is_excluded(&self, room_id: Uuid) -> bool {
        self.room_constraints
            .as_ref()
            .map(|c| c.excluded_rooms.contains(&room_id))
            .unwrap_or(false)
    }

    pub fn appointment_is_locked(&self, appointment_id: Uuid) -> bool {
        self.patient_preferences
            .as_ref()
            .map(|p| p.locked_appointments.contains(&appointment_id))
            .unwrap_or(false)
    }
}

/// Full optimization report. `original_schedule` is the unmodified snapshot
/// as loaded; `optimized_schedule` is the persisted working copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub original_schedule: Schedule,
    pub optimized_schedule: Schedule,
    pub applied_suggestions: Vec<OptimizationSuggestion>,
    pub resolved_conflicts: Vec<ScheduleConflict>,
    pub efficiency_improvement: f64,
    pub estimated_time_saved_minutes: i64,
    pub recommendations: Vec<String>,
}

// ==============================================================================
// GATEWAY MODELS
// ==============================================================================

/// Per-therapist scheduling preferences served by the therapist gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistPreference {
    pub therapist_id: Uuid,
    pub accepts_reassignment: bool,
    pub max_daily_minutes: Option<i64>,
}

impl TherapistPreference {
    pub fn permissive(therapist_id: Uuid) -> Self {
        Self {
            therapist_id,
            accepts_reassignment: true,
            max_daily_minutes: None,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
