// libs/schedule-cell/src/gateways/supabase.rs
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use std::sync::Arc;
use shared_database::supabase::SupabaseClient;

use crate::gateways::{RoomGateway, ScheduleStore, TherapistGateway};
use crate::models::{Schedule, ScheduleError, TherapistPreference};

pub struct SupabaseScheduleStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScheduleStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn parse_schedules(rows: Vec<Value>) -> Result<Vec<Schedule>, ScheduleError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Schedule>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedules: {}", e)))
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
        debug!("Loading schedule {}", id);

        let path = format!("/rest/v1/schedules?id=eq.{}", id);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| ScheduleError::GatewayUnavailable(e.to_string()))?;

        Ok(Self::parse_schedules(rows)?.into_iter().next())
    }

    async fn save(&self, schedule: &Schedule) -> Result<(), ScheduleError> {
        debug!("Saving schedule {}", schedule.id);

        let body = serde_json::to_value(schedule)
            .map_err(|e| ScheduleError::PersistenceFailure(e.to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static(
                "resolution=merge-duplicates,return=representation",
            ),
        );

        let _saved: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/schedules?on_conflict=id",
            None,
            Some(body),
            Some(headers),
        ).await.map_err(|e| ScheduleError::PersistenceFailure(e.to_string()))?;

        Ok(())
    }

    async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Schedule>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedules?date=gte.{}&date=lte.{}&order=date.asc",
            start, end
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| ScheduleError::GatewayUnavailable(e.to_string()))?;

        Self::parse_schedules(rows)
    }
}

pub struct SupabaseTherapistGateway {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseTherapistGateway {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl TherapistGateway for SupabaseTherapistGateway {
    async fn find_available_therapists(
        &self,
        date: NaiveDate,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ScheduleError> {
        debug!("Finding therapists available {} to {}", start_time, end_time);

        // A therapist covers the window when their availability row spans it.
        let path = format!(
            "/rest/v1/therapist_availability?date=eq.{}&start_time=lte.{}&end_time=gte.{}&is_available=eq.true&select=therapist_id",
            date,
            start_time.to_rfc3339(),
            end_time.to_rfc3339(),
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| ScheduleError::GatewayUnavailable(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<Uuid>(row["therapist_id"].clone()).map_err(|e| {
                    ScheduleError::DatabaseError(format!("Failed to parse therapist id: {}", e))
                })
            })
            .collect()
    }

    async fn get_preferences(
        &self,
        therapist_id: Uuid,
    ) -> Result<TherapistPreference, ScheduleError> {
        let path = format!(
            "/rest/v1/therapist_preferences?therapist_id=eq.{}",
            therapist_id
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| ScheduleError::GatewayUnavailable(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row).map_err(|e| {
                ScheduleError::DatabaseError(format!("Failed to parse preferences: {}", e))
            }),
            // No stored row means no restrictions.
            None => Ok(TherapistPreference::permissive(therapist_id)),
        }
    }
}

pub struct SupabaseRoomGateway {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseRoomGateway {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl RoomGateway for SupabaseRoomGateway {
    async fn find_available_rooms(
        &self,
        date: NaiveDate,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ScheduleError> {
        debug!("Finding rooms available {} to {}", start_time, end_time);

        let path = format!(
            "/rest/v1/room_availability?date=eq.{}&start_time=lte.{}&end_time=gte.{}&is_available=eq.true&select=room_id",
            date,
            start_time.to_rfc3339(),
            end_time.to_rfc3339(),
        );

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| ScheduleError::GatewayUnavailable(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<Uuid>(row["room_id"].clone()).map_err(|e| {
                    ScheduleError::DatabaseError(format!("Failed to parse room id: {}", e))
                })
            })
            .collect()
    }

    async fn get_capacity(&self, room_id: Uuid) -> Result<i32, ScheduleError> {
        let path = format!("/rest/v1/rooms?id=eq.{}&select=capacity", room_id);

        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| ScheduleError::GatewayUnavailable(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row["capacity"].clone()).map_err(|e| {
                ScheduleError::DatabaseError(format!("Failed to parse room capacity: {}", e))
            }),
            // Unknown room: treat as unusable rather than erroring the run.
            None => Ok(0),
        }
    }
}
