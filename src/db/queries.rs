use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::models::{
    Appointment, AppointmentStatus, ChatSession, CollectedData, ConversationState,
    ConversationStep, Service, WorkingHours,
};

// ── Services ──

pub fn load_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt =
        conn.prepare("SELECT name, price, duration_minutes FROM services ORDER BY rowid ASC")?;

    let rows = stmt.query_map([], |row| {
        Ok(Service {
            name: row.get(0)?,
            price: row.get(1)?,
            duration_minutes: row.get(2)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

pub fn upsert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (name, price, duration_minutes) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET
           price = excluded.price,
           duration_minutes = excluded.duration_minutes",
        params![service.name, service.price, service.duration_minutes],
    )?;
    Ok(())
}

// ── Settings ──

pub fn get_working_hours(conn: &Connection) -> anyhow::Result<Option<WorkingHours>> {
    let result = conn.query_row(
        "SELECT value FROM settings WHERE key = 'working_hours'",
        [],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(json) => Ok(Some(WorkingHours::from_json(&json)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set_working_hours(conn: &Connection, hours: &WorkingHours) -> anyhow::Result<()> {
    let json = serde_json::to_string(hours)?;
    conn.execute(
        "INSERT INTO settings (key, value) VALUES ('working_hours', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![json],
    )?;
    Ok(())
}

// ── Appointments ──

fn parse_appointment_row(row: &Row) -> rusqlite::Result<Appointment> {
    let status_str: String = row.get(4)?;
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;

    let created_at = NaiveDateTime::parse_from_str(&created_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());
    let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
        .unwrap_or_else(|_| Utc::now().naive_utc());

    Ok(Appointment {
        id: row.get(0)?,
        client_name: row.get(1)?,
        service_name: row.get(2)?,
        appointment_date: row.get(3)?,
        status: AppointmentStatus::parse(&status_str),
        notes: row.get(5)?,
        created_at,
        updated_at,
    })
}

const APPOINTMENT_COLUMNS: &str =
    "id, client_name, service_name, appointment_date, status, notes, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    let created_at = appointment.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
    let updated_at = appointment.updated_at.format("%Y-%m-%d %H:%M:%S").to_string();

    conn.execute(
        "INSERT INTO appointments (id, client_name, service_name, appointment_date, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            appointment.id,
            appointment.client_name,
            appointment.service_name,
            appointment.appointment_date,
            appointment.status.as_str(),
            appointment.notes,
            created_at,
            updated_at,
        ],
    )?;
    Ok(())
}

/// Non-cancelled appointments whose stored timestamp equals `timestamp`
/// exactly. This is the read behind the conflict check.
pub fn find_appointments_by_slot(
    conn: &Connection,
    timestamp: &str,
) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE appointment_date = ?1 AND status != 'cancelled'",
    ))?;

    let rows = stmt.query_map(params![timestamp], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn list_appointments(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Appointment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         ORDER BY appointment_date DESC LIMIT ?1",
    ))?;

    let rows = stmt.query_map(params![limit], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn get_appointment_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn.query_row(
        &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
        params![id],
        parse_appointment_row,
    );

    match result {
        Ok(appointment) => Ok(Some(appointment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_appointment_status(
    conn: &Connection,
    id: &str,
    status: &AppointmentStatus,
) -> anyhow::Result<bool> {
    let now = Utc::now()
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(count > 0)
}

// ── Chat sessions ──

pub fn get_session(conn: &Connection, phone: &str) -> anyhow::Result<Option<ChatSession>> {
    let result = conn.query_row(
        "SELECT phone, current_step, collected_data, history, updated_at
         FROM chat_sessions WHERE phone = ?1",
        params![phone],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    );

    match result {
        Ok((phone, step_str, collected_json, history_json, updated_at_str)) => {
            // A corrupted row degrades to a fresh greeting-state session
            // rather than an error.
            let collected: CollectedData =
                serde_json::from_str(&collected_json).unwrap_or_default();
            let history: Vec<String> = serde_json::from_str(&history_json).unwrap_or_default();
            let updated_at = NaiveDateTime::parse_from_str(&updated_at_str, "%Y-%m-%d %H:%M:%S")
                .unwrap_or_else(|_| Utc::now().naive_utc());

            Ok(Some(ChatSession {
                phone,
                state: ConversationState {
                    step: ConversationStep::parse(&step_str),
                    collected_data: collected,
                },
                history,
                updated_at,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_session(conn: &Connection, session: &ChatSession) -> anyhow::Result<()> {
    let collected_json = serde_json::to_string(&session.state.collected_data)?;
    let history_json = serde_json::to_string(&session.history)?;
    let updated_at = session.updated_at.format("%Y-%m-%d %H:%M:%S").to_string();

    conn.execute(
        "INSERT INTO chat_sessions (phone, current_step, collected_data, history, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(phone) DO UPDATE SET
           current_step = excluded.current_step,
           collected_data = excluded.collected_data,
           history = excluded.history,
           updated_at = excluded.updated_at",
        params![
            session.phone,
            session.state.step.as_str(),
            collected_json,
            history_json,
            updated_at,
        ],
    )?;
    Ok(())
}
