// libs/schedule-cell/src/gateways/mod.rs
//
// Narrow collaborator interfaces the engine depends on. The optimizer only
// ever sees these traits; production wiring backs them onto Supabase.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{Schedule, ScheduleError, TherapistPreference};

pub mod supabase;

pub use supabase::{SupabaseRoomGateway, SupabaseScheduleStore, SupabaseTherapistGateway};

/// Schedule persistence boundary.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError>;

    async fn save(&self, schedule: &Schedule) -> Result<(), ScheduleError>;

    async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Schedule>, ScheduleError>;
}

/// Therapist availability lookups.
#[async_trait]
pub trait TherapistGateway: Send + Sync {
    /// Therapists free for the whole window on the given date.
    async fn find_available_therapists(
        &self,
        date: NaiveDate,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ScheduleError>;

    async fn get_preferences(
        &self,
        therapist_id: Uuid,
    ) -> Result<TherapistPreference, ScheduleError>;
}

/// Room availability lookups.
#[async_trait]
pub trait RoomGateway: Send + Sync {
    /// Rooms free for the whole window on the given date.
    async fn find_available_rooms(
        &self,
        date: NaiveDate,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ScheduleError>;

    async fn get_capacity(&self, room_id: Uuid) -> Result<i32, ScheduleError>;
}
