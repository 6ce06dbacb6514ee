pub mod catalog;
pub mod composer;
pub mod conflict;
pub mod datetime;
pub mod history;
pub mod machine;

use chrono::{FixedOffset, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{default_catalog, Service, WorkingHours};

pub use composer::{BookingAction, ChatTurn};
pub use machine::process_turn;

/// Per-turn snapshot of the catalog and working hours. Loaded once at
/// the start of a turn so the engine never caches collaborator data
/// across calls.
pub struct EngineContext {
    pub catalog: Vec<Service>,
    pub hours: WorkingHours,
    pub utc_offset: String,
}

impl EngineContext {
    pub fn load(conn: &Connection, utc_offset: &str) -> Self {
        let catalog = match queries::load_services(conn) {
            Ok(services) if !services.is_empty() => services,
            Ok(_) => default_catalog(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load services, using built-in catalog");
                default_catalog()
            }
        };

        let hours = match queries::get_working_hours(conn) {
            Ok(Some(hours)) => hours,
            Ok(None) => WorkingHours::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load working hours, using defaults");
                WorkingHours::default()
            }
        };

        Self {
            catalog,
            hours,
            utc_offset: utc_offset.to_string(),
        }
    }
}

/// Wall-clock time in the business's fixed UTC offset. An unparsable
/// offset falls back to UTC.
pub fn business_now(utc_offset: &str) -> NaiveDateTime {
    match parse_offset(utc_offset) {
        Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
        None => {
            tracing::warn!(utc_offset, "unparsable UTC offset, using UTC");
            Utc::now().naive_utc()
        }
    }
}

fn parse_offset(utc_offset: &str) -> Option<FixedOffset> {
    let (sign, rest) = if let Some(rest) = utc_offset.strip_prefix('-') {
        (-1, rest)
    } else if let Some(rest) = utc_offset.strip_prefix('+') {
        (1, rest)
    } else {
        return None;
    };
    let (hours, minutes) = rest.split_once(':')?;
    let secs = sign * (hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60);
    FixedOffset::east_opt(secs)
}
