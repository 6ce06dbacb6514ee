pub mod admin;
pub mod chat;
pub mod health;
pub mod webhook;

use chrono::Utc;

use crate::engine::conflict;
use crate::engine::BookingAction;
use crate::models::{Appointment, AppointmentStatus};

/// Builds the appointment row a transport inserts when the engine hands
/// back a booking action. The engine itself never writes.
pub(crate) fn appointment_from_action(
    action: &BookingAction,
    utc_offset: &str,
    client_name: String,
    notes: String,
) -> Appointment {
    let now = Utc::now().naive_utc();
    Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        client_name,
        service_name: action.data.service_name.clone(),
        appointment_date: conflict::slot_timestamp(&action.data.date, &action.data.time, utc_offset),
        status: AppointmentStatus::Pending,
        notes: Some(notes),
        created_at: now,
        updated_at: now,
    }
}
