use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where the booking dialogue currently stands. A closed set; anything
/// else found in storage parses back to `Greeting` so a corrupted row
/// restarts the flow instead of crashing it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    Greeting,
    ServiceSelection,
    DateTime,
    Confirmation,
}

impl ConversationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStep::Greeting => "greeting",
            ConversationStep::ServiceSelection => "service_selection",
            ConversationStep::DateTime => "date_time",
            ConversationStep::Confirmation => "confirmation",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "service_selection" => ConversationStep::ServiceSelection,
            "date_time" => ConversationStep::DateTime,
            "confirmation" => ConversationStep::Confirmation,
            _ => ConversationStep::Greeting,
        }
    }
}

/// Slot data gathered across turns. `date` and `time` are only ever set
/// together, after the hours and conflict checks both passed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CollectedData {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub step: ConversationStep,
    #[serde(default)]
    pub collected_data: CollectedData,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            step: ConversationStep::Greeting,
            collected_data: CollectedData::default(),
        }
    }
}

impl ConversationState {
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

/// One persisted conversation, keyed by the sender's phone number. The
/// transcript lines carry the `User:` / `assistant:` prefixes the
/// history reconstructor expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub phone: String,
    pub state: ConversationState,
    pub history: Vec<String>,
    pub updated_at: NaiveDateTime,
}
