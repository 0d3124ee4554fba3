use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::gateways::{
    RoomGateway, ScheduleStore, SupabaseRoomGateway, SupabaseScheduleStore,
    SupabaseTherapistGateway, TherapistGateway,
};
use schedule_cell::{Schedule, ScheduleError, TimeSlot};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

fn supabase_for(server: &MockServer) -> Arc<SupabaseClient> {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
    };
    Arc::new(SupabaseClient::new(&config))
}

fn sample_schedule() -> Schedule {
    let therapist = Uuid::new_v4();
    let room = Uuid::new_v4();
    Schedule {
        id: Uuid::new_v4(),
        date: NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        time_slots: vec![TimeSlot {
            id: Uuid::new_v4(),
            start_time: Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 8, 24, 10, 0, 0).unwrap(),
            therapist_id: therapist,
            room_id: room,
            patient_id: Some(Uuid::new_v4()),
            is_available: false,
        }],
        conflicts: Vec::new(),
        optimization_suggestions: Vec::new(),
    }
}

#[tokio::test]
async fn test_find_by_id_returns_schedule() {
    let mock_server = MockServer::start().await;
    let schedule = sample_schedule();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedules"))
        .and(query_param("id", format!("eq.{}", schedule.id)))
        .and(header("apikey", "test-anon-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([serde_json::to_value(&schedule).unwrap()])),
        )
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleStore::new(supabase_for(&mock_server));
    let found = store.find_by_id(schedule.id).await.unwrap();

    assert_eq!(found, Some(schedule));
}

#[tokio::test]
async fn test_find_by_id_missing_returns_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleStore::new(supabase_for(&mock_server));
    let found = store.find_by_id(Uuid::new_v4()).await.unwrap();

    assert_eq!(found, None);
}

#[tokio::test]
async fn test_find_by_id_upstream_error_maps_to_gateway_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedules"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleStore::new(supabase_for(&mock_server));
    let result = store.find_by_id(Uuid::new_v4()).await;

    assert_matches!(result, Err(ScheduleError::GatewayUnavailable(_)));
}

#[tokio::test]
async fn test_save_upserts_schedule() {
    let mock_server = MockServer::start().await;
    let schedule = sample_schedule();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedules"))
        .and(query_param("on_conflict", "id"))
        .and(headers(
            "Prefer",
            vec!["resolution=merge-duplicates", "return=representation"],
        ))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([serde_json::to_value(&schedule).unwrap()])),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleStore::new(supabase_for(&mock_server));
    store.save(&schedule).await.unwrap();
}

#[tokio::test]
async fn test_save_failure_maps_to_persistence_failure() {
    let mock_server = MockServer::start().await;
    let schedule = sample_schedule();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedules"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleStore::new(supabase_for(&mock_server));
    let result = store.save(&schedule).await;

    assert_matches!(result, Err(ScheduleError::PersistenceFailure(_)));
}

#[tokio::test]
async fn test_find_available_therapists_parses_ids() {
    let mock_server = MockServer::start().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_availability"))
        .and(query_param("is_available", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "therapist_id": first },
            { "therapist_id": second },
        ])))
        .mount(&mock_server)
        .await;

    let gateway = SupabaseTherapistGateway::new(supabase_for(&mock_server));
    let available = gateway
        .find_available_therapists(
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 24, 10, 0, 0).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(available, vec![first, second]);
}

#[tokio::test]
async fn test_missing_preferences_default_to_permissive() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_preferences"))
        .and(query_param("therapist_id", format!("eq.{}", therapist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let gateway = SupabaseTherapistGateway::new(supabase_for(&mock_server));
    let prefs = gateway.get_preferences(therapist_id).await.unwrap();

    assert_eq!(prefs.therapist_id, therapist_id);
    assert!(prefs.accepts_reassignment);
    assert_eq!(prefs.max_daily_minutes, None);
}

#[tokio::test]
async fn test_unknown_room_capacity_defaults_to_zero() {
    let mock_server = MockServer::start().await;
    let room_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/rooms"))
        .and(query_param("id", format!("eq.{}", room_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let gateway = SupabaseRoomGateway::new(supabase_for(&mock_server));
    let capacity = gateway.get_capacity(room_id).await.unwrap();

    assert_eq!(capacity, 0);
}

#[tokio::test]
async fn test_find_available_rooms_parses_ids() {
    let mock_server = MockServer::start().await;
    let room = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/room_availability"))
        .and(query_param("is_available", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "room_id": room },
        ])))
        .mount(&mock_server)
        .await;

    let gateway = SupabaseRoomGateway::new(supabase_for(&mock_server));
    let available = gateway
        .find_available_rooms(
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 24, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 24, 10, 0, 0).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(available, vec![room]);
}
