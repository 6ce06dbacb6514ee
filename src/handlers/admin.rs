use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AppointmentStatus, WorkingHours};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/appointments
#[derive(Deserialize)]
pub struct AppointmentsQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    id: String,
    client_name: String,
    service_name: String,
    appointment_date: String,
    status: String,
    notes: Option<String>,
}

pub async fn get_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<Vec<AppointmentResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let appointments = {
        let db = state.db.lock().unwrap();
        queries::list_appointments(&db, query.limit.unwrap_or(50))?
    };

    Ok(Json(
        appointments
            .into_iter()
            .map(|a| AppointmentResponse {
                id: a.id,
                client_name: a.client_name,
                service_name: a.service_name,
                appointment_date: a.appointment_date,
                status: a.status.as_str().to_string(),
                notes: a.notes,
            })
            .collect(),
    ))
}

// POST /api/admin/appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let cancelled = {
        let db = state.db.lock().unwrap();
        queries::update_appointment_status(&db, &id, &AppointmentStatus::Cancelled)?
    };

    if !cancelled {
        return Err(AppError::NotFound(format!("appointment {id}")));
    }

    tracing::info!(%id, "appointment cancelled by admin");
    Ok(Json(serde_json::json!({ "cancelled": id })))
}

// GET /api/admin/settings
#[derive(Serialize, Deserialize)]
pub struct SettingsBody {
    pub working_hours: WorkingHours,
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SettingsBody>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let working_hours = {
        let db = state.db.lock().unwrap();
        queries::get_working_hours(&db)?.unwrap_or_default()
    };

    Ok(Json(SettingsBody { working_hours }))
}

// POST /api/admin/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SettingsBody>,
) -> Result<Json<SettingsBody>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    {
        let db = state.db.lock().unwrap();
        queries::set_working_hours(&db, &body.working_hours)?;
    }

    tracing::info!(
        start = %body.working_hours.start,
        end = %body.working_hours.end,
        "working hours updated"
    );
    Ok(Json(body))
}
