// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::gateways::{
    RoomGateway, ScheduleStore, SupabaseRoomGateway, SupabaseScheduleStore,
    SupabaseTherapistGateway, TherapistGateway,
};
use crate::models::{OptimizeScheduleRequest, ScheduleError};
use crate::services::ScheduleOptimizationService;

/// Shared handler state, built once per router so the optimizer's
/// per-schedule locks survive across requests.
pub struct ScheduleHandlers {
    optimizer: ScheduleOptimizationService,
    store: Arc<dyn ScheduleStore>,
}

impl ScheduleHandlers {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(&config));
        let store: Arc<dyn ScheduleStore> =
            Arc::new(SupabaseScheduleStore::new(Arc::clone(&supabase)));
        let therapists: Arc<dyn TherapistGateway> =
            Arc::new(SupabaseTherapistGateway::new(Arc::clone(&supabase)));
        let rooms: Arc<dyn RoomGateway> = Arc::new(SupabaseRoomGateway::new(supabase));

        Self {
            optimizer: ScheduleOptimizationService::new(Arc::clone(&store), therapists, rooms),
            store,
        }
    }
}

#[instrument(skip(handlers, request), fields(schedule_id = %request.schedule_id))]
pub async fn optimize_schedule(
    State(handlers): State<Arc<ScheduleHandlers>>,
    Json(request): Json<OptimizeScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let result = handlers
        .optimizer
        .execute(request)
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "optimization": result,
    })))
}

#[instrument(skip(handlers))]
pub async fn get_schedule_conflicts(
    State(handlers): State<Arc<ScheduleHandlers>>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = load_schedule(&handlers, schedule_id).await?;
    let conflicts = schedule.detect_conflicts();

    Ok(Json(json!({
        "schedule_id": schedule_id,
        "conflicts": conflicts,
    })))
}

#[instrument(skip(handlers))]
pub async fn get_schedule_efficiency(
    State(handlers): State<Arc<ScheduleHandlers>>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = load_schedule(&handlers, schedule_id).await?;

    Ok(Json(json!({
        "schedule_id": schedule_id,
        "efficiency_score": schedule.calculate_efficiency_score(),
    })))
}

async fn load_schedule(
    handlers: &ScheduleHandlers,
    schedule_id: Uuid,
) -> Result<crate::models::Schedule, AppError> {
    handlers
        .store
        .find_by_id(schedule_id)
        .await
        .map_err(map_schedule_error)?
        .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))
}

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::NotFound => AppError::NotFound("Schedule not found".to_string()),
        ScheduleError::InvalidSchedule(msg) => AppError::BadRequest(msg),
        ScheduleError::GatewayUnavailable(msg) => AppError::ExternalService(msg),
        ScheduleError::PersistenceFailure(msg) => AppError::Database(msg),
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}
