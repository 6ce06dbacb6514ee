use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::engine::{self, BookingAction, EngineContext};
use crate::errors::AppError;
use crate::models::ConversationState;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<String>,
    /// Optional round-tripped state; clients that only keep the visible
    /// transcript leave it out and the engine reconstructs.
    #[serde(default)]
    pub state: Option<ConversationState>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub transcript: String,
    pub state: ConversationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<BookingAction>,
}

// POST /api/chat — stateless web chat transport. The caller owns the
// history; this handler persists nothing but the booked appointment.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("el mensaje es obligatorio".to_string()));
    }

    let db = state.db.lock().unwrap();
    let ctx = EngineContext::load(&db, &state.config.utc_offset);
    let now = engine::business_now(&state.config.utc_offset);

    let mut turn = engine::process_turn(&ctx, &db, now, message, &req.history, req.state)?;

    if let Some(action) = &turn.action {
        let appointment = super::appointment_from_action(
            action,
            &state.config.utc_offset,
            action.data.client_name.clone(),
            "Agendado vía chat web".to_string(),
        );
        if let Err(e) = queries::insert_appointment(&db, &appointment) {
            tracing::error!(error = %e, "failed to insert appointment");
            turn.text
                .push_str("\n\n(Error interno: No se pudo guardar. Por favor avisa al barbero.)");
        } else {
            tracing::info!(id = %appointment.id, "appointment booked via web chat");
        }
    }

    Ok(Json(ChatResponse {
        response: turn.text,
        transcript: turn.transcript,
        state: turn.state,
        action: turn.action,
    }))
}
