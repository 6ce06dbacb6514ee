use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{CollectedData, ConversationState};

/// The engine's only side-effect-triggering output. The caller, not the
/// engine, inserts the appointment when this is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingAction {
    pub action: String,
    pub data: BookingData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingData {
    pub service_name: String,
    pub date: String,
    pub time: String,
    pub client_name: String,
}

impl BookingAction {
    pub fn book(collected: &CollectedData) -> Option<Self> {
        Some(Self {
            action: "book_appointment".to_string(),
            data: BookingData {
                service_name: collected.service_name.clone()?,
                date: collected.date.clone()?,
                time: collected.time.clone()?,
                client_name: collected
                    .client_name
                    .clone()
                    .unwrap_or_else(|| "Cliente Chat".to_string()),
            },
        })
    }
}

/// One fully composed engine turn. `text` is what the end user sees;
/// `transcript` additionally carries the machine-only state block and
/// is what the transport appends to the conversation history.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub text: String,
    pub transcript: String,
    pub state: ConversationState,
    pub action: Option<BookingAction>,
}

static MACHINE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json.*?```").expect("machine block regex"));

static STATE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\n(.*?)\n```").expect("state block regex"));

pub fn compose(reply: String, state: ConversationState, action: Option<BookingAction>) -> ChatTurn {
    let state_json =
        serde_json::to_string(&state).unwrap_or_else(|_| "{}".to_string());
    let transcript = format!("{reply}\n\n```json\n{state_json}\n```");
    ChatTurn {
        text: strip_machine_blocks(&reply),
        transcript,
        state,
        action,
    }
}

/// Removes every fenced machine block, leaving only human-readable text.
pub fn strip_machine_blocks(text: &str) -> String {
    MACHINE_BLOCK.replace_all(text, "").trim().to_string()
}

/// Reads the state sidecar back out of a transcript line, if one
/// survived the transport.
pub fn extract_state_block(line: &str) -> Option<ConversationState> {
    let caps = STATE_BLOCK.captures(line)?;
    ConversationState::from_json(caps.get(1)?.as_str())
}
