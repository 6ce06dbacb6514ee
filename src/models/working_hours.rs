use serde::{Deserialize, Serialize};

/// Daily booking window, stored as `"HH:MM"` strings under the
/// `working_hours` settings key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: "09:00".to_string(),
            end: "20:00".to_string(),
        }
    }
}

impl WorkingHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: WorkingHours = serde_json::from_str(s)?;
        Ok(hours)
    }

    /// Compact base-10 reading of a zero-padded `"HH:MM"` string
    /// (`"09:00"` -> 900). The hours check compares these integers
    /// directly rather than minutes since midnight.
    pub fn compact(time: &str) -> i32 {
        time.replace(':', "").parse().unwrap_or(-1)
    }

    /// End-inclusive window check over compact time integers.
    pub fn contains(&self, time: &str) -> bool {
        let t = Self::compact(time);
        t >= Self::compact(&self.start) && t <= Self::compact(&self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_reading() {
        assert_eq!(WorkingHours::compact("09:00"), 900);
        assert_eq!(WorkingHours::compact("20:00"), 2000);
        assert_eq!(WorkingHours::compact("14:30"), 1430);
    }

    #[test]
    fn test_end_is_inclusive() {
        let hours = WorkingHours::default();
        assert!(hours.contains("20:00"));
        assert!(!hours.contains("20:01"));
        assert!(hours.contains("09:00"));
        assert!(!hours.contains("08:59"));
    }

    #[test]
    fn test_out_of_range_hour_rejected() {
        let hours = WorkingHours::default();
        assert!(!hours.contains("25:00"));
    }
}
