use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Form;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;

use crate::db::queries;
use crate::engine::{self, EngineContext};
use crate::models::ChatSession;
use crate::state::AppState;

const FALLBACK_REPLY: &str =
    "Lo siento, estoy teniendo problemas en este momento. Por favor intenta de nuevo en unos minutos.";

#[derive(Deserialize)]
#[allow(dead_code)]
pub struct TwilioWebhookForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
}

fn validate_twilio_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(&str, &str)],
) -> bool {
    // Build the data to sign: URL + sorted params concatenated
    let mut data = url.to_string();
    let mut sorted_params = params.to_vec();
    sorted_params.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in &sorted_params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = match Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(data.as_bytes());
    let result = mac.finalize().into_bytes();
    let expected = base64::engine::general_purpose::STANDARD.encode(result);

    expected == signature
}

// POST /webhook/whatsapp — Twilio WhatsApp transport. The session row
// carries both the state object and the transcript, so the engine works
// even when one of the two gets lost.
pub async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TwilioWebhookForm>,
) -> Response {
    let from = form.from.trim().to_string();
    let body = form.body.trim().to_string();

    tracing::info!(from = %from, body = %body, "incoming WhatsApp message");

    if from.is_empty() || body.is_empty() {
        return (axum::http::StatusCode::BAD_REQUEST, "Invalid request").into_response();
    }

    // Validate Twilio signature (skip if auth token is empty — dev mode)
    if !state.config.twilio_auth_token.is_empty() {
        let signature = headers
            .get("x-twilio-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing X-Twilio-Signature header");
            return (axum::http::StatusCode::FORBIDDEN, "Missing signature").into_response();
        }

        // Reconstruct webhook URL — use X-Forwarded-Proto/Host if behind proxy
        let proto = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("https");
        let host = headers
            .get("x-forwarded-host")
            .or_else(|| headers.get("host"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let url = format!("{proto}://{host}/webhook/whatsapp");

        let params = [
            ("From", from.as_str()),
            ("To", form.to.as_deref().unwrap_or("")),
            ("Body", body.as_str()),
            ("MessageSid", form.message_sid.as_deref().unwrap_or("")),
        ];

        if !validate_twilio_signature(&state.config.twilio_auth_token, signature, &url, &params) {
            tracing::warn!("invalid Twilio signature");
            return (axum::http::StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let db = state.db.lock().unwrap();

    let mut session = match queries::get_session(&db, &from) {
        Ok(Some(session)) => session,
        Ok(None) => ChatSession {
            phone: from.clone(),
            state: Default::default(),
            history: vec![],
            updated_at: Utc::now().naive_utc(),
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to load session");
            return twiml_response(FALLBACK_REPLY);
        }
    };

    session.history.push(format!("User: {body}"));

    let ctx = EngineContext::load(&db, &state.config.utc_offset);
    let now = engine::business_now(&state.config.utc_offset);
    let prior = Some(session.state.clone());

    let mut turn = match engine::process_turn(&ctx, &db, now, &body, &session.history, prior) {
        Ok(turn) => turn,
        Err(e) => {
            tracing::error!(error = %e, from = %from, "turn processing failed");
            return twiml_response(FALLBACK_REPLY);
        }
    };

    if let Some(action) = &turn.action {
        let appointment = super::appointment_from_action(
            action,
            &state.config.utc_offset,
            format!("Usuario WhatsApp ({from})"),
            format!("Agendado vía WhatsApp {from}"),
        );
        if let Err(e) = queries::insert_appointment(&db, &appointment) {
            tracing::error!(error = %e, "failed to insert appointment");
            turn.text
                .push_str("\n\n(Error sistema: No se pudo guardar la cita.)");
        } else {
            tracing::info!(id = %appointment.id, from = %from, "appointment booked via WhatsApp");
        }
    }

    session.history.push(format!("assistant: {}", turn.transcript));
    session.state = turn.state;
    session.updated_at = Utc::now().naive_utc();

    if let Err(e) = queries::save_session(&db, &session) {
        tracing::error!(error = %e, "failed to save session");
    }

    twiml_response(&turn.text)
}

fn twiml_response(message: &str) -> Response {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response>\n    <Message>{escaped}</Message>\n</Response>"
    );
    ([(header::CONTENT_TYPE, "text/xml")], xml).into_response()
}
