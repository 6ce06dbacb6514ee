use anyhow::Context;
use rusqlite::Connection;

use crate::db::queries;

/// Candidate timestamp in the business's fixed UTC offset, e.g.
/// `2026-02-03T14:30:00-03:00`. Conflicts compare this string for
/// exact equality against stored appointments.
pub fn slot_timestamp(date: &str, time: &str, utc_offset: &str) -> String {
    format!("{date}T{time}:00{utc_offset}")
}

/// True when any non-cancelled appointment occupies exactly this slot.
///
/// This is equality on the minute, not an interval-overlap check: two
/// bookings whose service windows overlap but start at different
/// minutes are both allowed. A storage failure propagates as an error
/// and must never be read as "no conflict".
pub fn has_conflict(
    conn: &Connection,
    date: &str,
    time: &str,
    utc_offset: &str,
) -> anyhow::Result<bool> {
    let timestamp = slot_timestamp(date, time, utc_offset);
    let occupied = queries::find_appointments_by_slot(conn, &timestamp)
        .context("conflict check failed")?;
    Ok(!occupied.is_empty())
}
