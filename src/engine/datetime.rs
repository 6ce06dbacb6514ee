use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// A resolved `(date, time)` pair, normalized to `YYYY-MM-DD` and
/// zero-padded 24h `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub date: String,
    pub time: String,
}

static ISO_SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})[ t](\d{1,2}):(\d{2})").expect("iso slot regex")
});

static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})(?:[:.](\d{2}))?\s*(am|pm|hs)?").expect("time regex"));

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"el (\d{1,2})").expect("day regex"));

// Insertion order matters: the first contained name wins, so the
// accented variants sit right after their ASCII spellings.
const WEEKDAYS: [(&str, u32); 9] = [
    ("domingo", 0),
    ("lunes", 1),
    ("martes", 2),
    ("miercoles", 3),
    ("miércoles", 3),
    ("jueves", 4),
    ("viernes", 5),
    ("sabado", 6),
    ("sábado", 6),
];

/// Resolves a natural-language Spanish date/time phrase against `now`.
///
/// The time grammar is evaluated first over the whole text: the first
/// digit run (optionally `:MM` and an `am`/`pm`/`hs` suffix) is the
/// time, and without one the whole resolution fails. The grammar does
/// not bound the hour; the working-hours check downstream rejects
/// out-of-range values. Pure and deterministic given `now`.
pub fn resolve_date_time(text: &str, now: NaiveDateTime) -> Option<Slot> {
    let lower = text.to_lowercase();
    let today = now.date();

    // Already-normalized "YYYY-MM-DD HH:MM" text resolves to itself.
    if let Some(caps) = ISO_SLOT.captures(&lower) {
        let hour: u32 = caps[2].parse().ok()?;
        return Some(Slot {
            date: caps[1].to_string(),
            time: format!("{:02}:{}", hour, &caps[3]),
        });
    }

    let caps = TIME.captures(&lower)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    match caps.get(3).map(|m| m.as_str()) {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        // "hs" marks an already-24h time
        _ => {}
    }

    let date = resolve_date(&lower, today);

    Some(Slot {
        date: date.format("%Y-%m-%d").to_string(),
        time: format!("{hour:02}:{minute:02}"),
    })
}

fn resolve_date(lower: &str, today: NaiveDate) -> NaiveDate {
    if lower.contains("hoy") {
        return today;
    }
    if lower.contains("mañana") {
        return today + Duration::days(1);
    }

    if let Some((_, target)) = WEEKDAYS.iter().find(|(name, _)| lower.contains(name)) {
        let current = today.weekday().num_days_from_sunday() as i64;
        let mut diff = *target as i64 - current;
        if diff <= 0 {
            // next occurrence, never today
            diff += 7;
        }
        return today + Duration::days(diff);
    }

    if let Some(caps) = MONTH_DAY.captures(lower) {
        if let Some(day) = caps[1].parse::<u32>().ok().and_then(|d| today.with_day(d)) {
            if day < today {
                if let Some(next_month) = day.checked_add_months(Months::new(1)) {
                    return next_month;
                }
            } else {
                return day;
            }
        }
        // impossible day-of-month falls through to the fallback below
    }

    // A time without any recognizable date phrase books for tomorrow,
    // never silently for today.
    today + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} 12:00:00"), "%Y-%m-%d %H:%M:%S").unwrap()
    }

    // 2026-02-03 is a Tuesday
    const NOW: &str = "2026-02-03";

    fn slot(date: &str, time: &str) -> Slot {
        Slot {
            date: date.to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn test_hoy_with_24h_time() {
        let parsed = resolve_date_time("hoy a las 14:30", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-02-03", "14:30"));
    }

    #[test]
    fn test_manana_with_pm_time() {
        let parsed = resolve_date_time("mañana a las 2pm", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-02-04", "14:00"));
    }

    #[test]
    fn test_hs_suffix_is_24h() {
        let parsed = resolve_date_time("hoy 15hs", at(NOW)).unwrap();
        assert_eq!(parsed.time, "15:00");
    }

    #[test]
    fn test_midnight_and_noon_edges() {
        assert_eq!(resolve_date_time("hoy 12am", at(NOW)).unwrap().time, "00:00");
        assert_eq!(resolve_date_time("hoy 12pm", at(NOW)).unwrap().time, "12:00");
    }

    #[test]
    fn test_weekday_next_occurrence() {
        // Tuesday asking for lunes -> next Monday
        let parsed = resolve_date_time("lunes 4pm", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-02-09", "16:00"));
    }

    #[test]
    fn test_same_weekday_rolls_a_week() {
        let parsed = resolve_date_time("martes 9:00", at(NOW)).unwrap();
        assert_eq!(parsed.date, "2026-02-10");
    }

    #[test]
    fn test_accented_weekday() {
        let parsed = resolve_date_time("miércoles 10am", at(NOW)).unwrap();
        assert_eq!(parsed.date, "2026-02-04");
    }

    #[test]
    fn test_day_of_month_future() {
        // First digit run doubles as the time, per the grammar
        let parsed = resolve_date_time("el 15", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-02-15", "15:00"));
    }

    #[test]
    fn test_day_of_month_past_rolls_to_next_month() {
        let parsed = resolve_date_time("el 2", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-03-02", "02:00"));
    }

    #[test]
    fn test_impossible_day_falls_back_to_tomorrow() {
        let parsed = resolve_date_time("el 31 a las 10", at(NOW)).unwrap();
        assert_eq!(parsed.date, "2026-02-04");
    }

    #[test]
    fn test_no_date_phrase_defaults_to_tomorrow() {
        let parsed = resolve_date_time("a las 16:00", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-02-04", "16:00"));
    }

    #[test]
    fn test_no_time_fails_entirely() {
        assert!(resolve_date_time("mañana por favor", at(NOW)).is_none());
        assert!(resolve_date_time("el lunes", at(NOW)).is_none());
    }

    #[test]
    fn test_out_of_range_hour_still_parses() {
        // The grammar does not bound the hour; the hours check does.
        let parsed = resolve_date_time("mañana a las 25:00", at(NOW)).unwrap();
        assert_eq!(parsed.time, "25:00");
    }

    #[test]
    fn test_normalized_output_is_idempotent() {
        let parsed = resolve_date_time("2026-02-03 14:30", at(NOW)).unwrap();
        assert_eq!(parsed, slot("2026-02-03", "14:30"));
    }
}
