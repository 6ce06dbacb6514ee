use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Duration, FixedOffset, Utc};
use tower::ServiceExt;

use barberflow::config::AppConfig;
use barberflow::db;
use barberflow::db::queries;
use barberflow::handlers;
use barberflow::state::AppState;

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        utc_offset: "-03:00".to_string(),
        twilio_auth_token: "".to_string(), // empty = skip signature validation
    }
}

fn test_state() -> Arc<AppState> {
    let config = test_config();
    let conn = db::init_db(":memory:").unwrap();
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
    })
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat", post(handlers::chat::chat))
        .route("/webhook/whatsapp", post(handlers::webhook::whatsapp_webhook))
        .route("/api/admin/appointments", get(handlers::admin::get_appointments))
        .route(
            "/api/admin/appointments/:id/cancel",
            post(handlers::admin::cancel_appointment),
        )
        .route("/api/admin/settings", get(handlers::admin::get_settings))
        .route("/api/admin/settings", post(handlers::admin::update_settings))
        .with_state(state)
}

/// Tomorrow in the business's -03:00 offset, as the date resolver will
/// compute it for "mañana".
fn tomorrow() -> String {
    let offset = FixedOffset::east_opt(-3 * 3600).unwrap();
    (Utc::now().with_timezone(&offset).date_naive() + Duration::days(1))
        .format("%Y-%m-%d")
        .to_string()
}

async fn chat_turn(
    state: &Arc<AppState>,
    message: &str,
    history: &[String],
    prior: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut body = serde_json::json!({ "message": message, "history": history });
    if let Some(prior) = prior {
        body["state"] = prior.clone();
    }

    let res = test_app(Arc::clone(state))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn form_encode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('&', "%26")
        .replace('+', "%2B")
        .replace('=', "%3D")
        .replace(' ', "+")
}

async fn whatsapp_turn(state: &Arc<AppState>, from: &str, body: &str) -> String {
    let form = format!("From={}&Body={}", form_encode(from), form_encode(body));

    let res = test_app(Arc::clone(state))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn admin_get(state: &Arc<AppState>, uri: &str, token: &str) -> (StatusCode, Vec<u8>) {
    let res = test_app(Arc::clone(state))
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let res = test_app(test_state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ── Web chat transport ──

#[tokio::test]
async fn test_chat_greeting_lists_fallback_catalog() {
    let state = test_state();
    let json = chat_turn(&state, "Hola", &[], None).await;

    let response = json["response"].as_str().unwrap();
    assert!(response.contains("1. Corte de Cabello - $15 (30 min)"));
    assert!(response.contains("09:00 a 20:00"));
    assert_eq!(json["state"]["step"], "greeting");
    assert!(json.get("action").is_none());
    // machine block is stripped from the display text but kept in the transcript
    assert!(!response.contains("```json"));
    assert!(json["transcript"].as_str().unwrap().contains("```json"));
}

#[tokio::test]
async fn test_chat_empty_message_is_rejected() {
    let state = test_state();
    let res = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"message":"   "}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_full_booking_flow_inserts_appointment() {
    let state = test_state();
    let mut history: Vec<String> = vec![];

    for (message, expected) in [
        ("Hola", "nuestros servicios"),
        ("1", "¿Para qué día y hora"),
        ("mañana a las 14:30", "disponible"),
    ] {
        history.push(format!("User: {message}"));
        let json = chat_turn(&state, message, &history, None).await;
        assert!(
            json["response"].as_str().unwrap().contains(expected),
            "expected {expected:?} in {:?}",
            json["response"]
        );
        history.push(format!("assistant: {}", json["transcript"].as_str().unwrap()));
    }

    history.push("User: si".to_string());
    let json = chat_turn(&state, "si", &history, None).await;
    assert!(json["response"].as_str().unwrap().contains("Cita agendada"));
    assert_eq!(json["action"]["action"], "book_appointment");
    assert_eq!(json["action"]["data"]["service_name"], "Corte de Cabello");
    assert_eq!(json["action"]["data"]["date"], tomorrow());
    assert_eq!(json["action"]["data"]["time"], "14:30");

    // the transport inserted the appointment the action described
    let db = state.db.lock().unwrap();
    let appointments = queries::list_appointments(&db, 10).unwrap();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].service_name, "Corte de Cabello");
    assert_eq!(
        appointments[0].appointment_date,
        format!("{}T14:30:00-03:00", tomorrow())
    );
}

#[tokio::test]
async fn test_chat_round_tripped_state_skips_history() {
    let state = test_state();
    let prior = serde_json::json!({
        "step": "date_time",
        "collected_data": { "service_name": "Barba" }
    });

    let json = chat_turn(&state, "mañana a las 16:00", &[], Some(&prior)).await;
    assert_eq!(json["state"]["step"], "confirmation");
    assert_eq!(json["state"]["collected_data"]["service_name"], "Barba");
    assert_eq!(json["state"]["collected_data"]["time"], "16:00");
}

// ── WhatsApp transport ──

const PHONE_A: &str = "whatsapp:+5491111111111";
const PHONE_B: &str = "whatsapp:+5492222222222";

async fn whatsapp_book(state: &Arc<AppState>, phone: &str, slot_message: &str) -> String {
    whatsapp_turn(state, phone, "Hola").await;
    whatsapp_turn(state, phone, "2").await;
    whatsapp_turn(state, phone, slot_message).await;
    whatsapp_turn(state, phone, "si").await
}

#[tokio::test]
async fn test_whatsapp_flow_persists_session_between_turns() {
    let state = test_state();

    let xml = whatsapp_turn(&state, PHONE_A, "Hola").await;
    assert!(xml.contains("nuestros servicios"));

    let xml = whatsapp_turn(&state, PHONE_A, "barba").await;
    assert!(xml.contains("Elegiste: **Barba**"));

    let xml = whatsapp_turn(&state, PHONE_A, "mañana a las 15:00").await;
    assert!(xml.contains("disponible"));

    // the per-phone session row carries the state across turns
    {
        let db = state.db.lock().unwrap();
        let session = queries::get_session(&db, PHONE_A).unwrap().unwrap();
        assert_eq!(session.state.step.as_str(), "confirmation");
        assert_eq!(
            session.state.collected_data.time.as_deref(),
            Some("15:00")
        );
    }

    let xml = whatsapp_turn(&state, PHONE_A, "si").await;
    assert!(xml.contains("Cita agendada"));

    let db = state.db.lock().unwrap();
    let appointments = queries::list_appointments(&db, 10).unwrap();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].service_name, "Barba");
    assert!(appointments[0].client_name.contains(PHONE_A));
}

#[tokio::test]
async fn test_whatsapp_two_sessions_race_for_one_slot() {
    let state = test_state();

    let xml = whatsapp_book(&state, PHONE_A, "mañana a las 15:00").await;
    assert!(xml.contains("Cita agendada"));

    // second customer proposes the exact same slot
    whatsapp_turn(&state, PHONE_B, "Hola").await;
    whatsapp_turn(&state, PHONE_B, "2").await;
    let xml = whatsapp_turn(&state, PHONE_B, "mañana a las 15:00").await;
    assert!(xml.contains("ocupado"));

    // a different minute is free under equality semantics
    let xml = whatsapp_turn(&state, PHONE_B, "mañana a las 15:30").await;
    assert!(xml.contains("disponible"));
}

#[tokio::test]
async fn test_whatsapp_greeting_resets_mid_flow() {
    let state = test_state();

    whatsapp_turn(&state, PHONE_A, "Hola").await;
    whatsapp_turn(&state, PHONE_A, "1").await;
    whatsapp_turn(&state, PHONE_A, "mañana a las 10:00").await;

    let xml = whatsapp_turn(&state, PHONE_A, "hola de nuevo").await;
    assert!(xml.contains("nuestros servicios"));

    let db = state.db.lock().unwrap();
    let session = queries::get_session(&db, PHONE_A).unwrap().unwrap();
    assert_eq!(session.state.step.as_str(), "greeting");
    assert!(session.state.collected_data.date.is_none());
    assert!(session.state.collected_data.service_name.is_none());
}

// ── Admin API ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let state = test_state();

    let res = test_app(state)
        .oneshot(
            Request::builder()
                .uri("/api/admin/appointments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_wrong_token() {
    let state = test_state();
    let (status, _) = admin_get(&state, "/api/admin/appointments", "wrong-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_cancel_frees_the_slot() {
    let state = test_state();

    let xml = whatsapp_book(&state, PHONE_A, "mañana a las 17:00").await;
    assert!(xml.contains("Cita agendada"));

    let (status, body) = admin_get(&state, "/api/admin/appointments", "test-token").await;
    assert_eq!(status, StatusCode::OK);
    let appointments: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0]["status"], "pending");
    let id = appointments[0]["id"].as_str().unwrap().to_string();

    let res = test_app(Arc::clone(&state))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/admin/appointments/{id}/cancel"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // the cancelled appointment no longer occupies the slot
    let xml = whatsapp_book(&state, PHONE_B, "mañana a las 17:00").await;
    assert!(xml.contains("Cita agendada"));
}

#[tokio::test]
async fn test_admin_working_hours_are_enforced() {
    let state = test_state();

    let res = test_app(Arc::clone(&state))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/settings")
                .header("Authorization", "Bearer test-token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"working_hours":{"start":"10:00","end":"18:00"}}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = admin_get(&state, "/api/admin/settings", "test-token").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["working_hours"]["start"], "10:00");

    let prior = serde_json::json!({
        "step": "date_time",
        "collected_data": { "service_name": "Barba" }
    });
    let json = chat_turn(&state, "mañana a las 9am", &[], Some(&prior)).await;
    let response = json["response"].as_str().unwrap();
    assert!(response.contains("fuera de nuestro horario"));
    assert!(response.contains("10:00 - 18:00"));
    assert_eq!(json["state"]["step"], "date_time");
}
