use once_cell::sync::Lazy;
use regex::Regex;

use crate::engine::composer;
use crate::models::{ConversationState, ConversationStep, Service};

// Markers the engine embeds in its own replies. Transcript lines are a
// private wire format between the engine's output and its next input:
// a transport that paraphrases engine text breaks prose reconstruction
// (the sidecar block is the robust channel).
static SLOT_PROSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"horario (\d{4}-\d{2}-\d{2}) a las (\d{2}:\d{2})").expect("slot prose regex")
});

static SLOT_AVAILABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"hora (\d{2}:\d{2}) \((\d{4}-\d{2}-\d{2})\)").expect("slot available regex")
});

const ENGINE_PREFIXES: [&str; 2] = ["assistant:", "Model:"];

fn is_engine_line(line: &str) -> bool {
    ENGINE_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Re-derives the current step and partially collected data from the
/// transcript when the transport did not round-trip a state object.
///
/// The newest engine-authored sidecar block wins outright. Without one,
/// the step is inferred from the phrasing of the last engine line and
/// the slot/service markers are extracted newest-first, never
/// overwriting fields already present in `state`.
pub fn reconstruct(history: &[String], catalog: &[Service], state: &mut ConversationState) {
    for line in history.iter().rev() {
        if !is_engine_line(line) {
            continue;
        }
        if let Some(sidecar) = composer::extract_state_block(line) {
            // A recorded greeting step means the catalog listing was
            // already sent; the reply being processed picks a service.
            state.step = match sidecar.step {
                ConversationStep::Greeting => ConversationStep::ServiceSelection,
                step => step,
            };
            let collected = &mut state.collected_data;
            let found = sidecar.collected_data;
            collected.service_name = collected.service_name.take().or(found.service_name);
            collected.date = collected.date.take().or(found.date);
            collected.time = collected.time.take().or(found.time);
            collected.client_name = collected.client_name.take().or(found.client_name);
            return;
        }
    }

    let last_bot = match history.iter().rev().find(|l| is_engine_line(l)) {
        Some(line) => line.to_lowercase(),
        None => return,
    };

    if last_bot.contains("confirmamos") || last_bot.contains("disponible") {
        state.step = ConversationStep::Confirmation;
        fill_from_markers(history, catalog, state);
    } else if last_bot.contains("para qué día")
        || last_bot.contains("día y hora")
        || last_bot.contains("estamos cerrados")
        || last_bot.contains("horario de atención")
        || last_bot.contains("ocupado")
    {
        state.step = ConversationStep::DateTime;
        fill_from_markers(history, catalog, state);
    } else if last_bot.contains("servicios") || last_bot.contains("número del servicio") {
        state.step = ConversationStep::ServiceSelection;
    }
    // anything else keeps the caller-supplied step
}

/// Newest-first scan for the service restatement and slot markers,
/// stopping at the first hit per field.
fn fill_from_markers(history: &[String], catalog: &[Service], state: &mut ConversationState) {
    let collected = &mut state.collected_data;

    for line in history.iter().rev() {
        let lower = line.to_lowercase();

        if collected.service_name.is_none() {
            for service in catalog {
                if lower.contains(&format!("elegiste: **{}**", service.name.to_lowercase())) {
                    collected.service_name = Some(service.name.clone());
                    break;
                }
            }
        }

        if collected.date.is_none() {
            if let Some(caps) = SLOT_PROSE.captures(&lower) {
                collected.date = Some(caps[1].to_string());
                collected.time = Some(caps[2].to_string());
            } else if let Some(caps) = SLOT_AVAILABLE.captures(&lower) {
                collected.time = Some(caps[1].to_string());
                collected.date = Some(caps[2].to_string());
            }
        }
    }

    if collected.client_name.is_none() {
        collected.client_name = Some("Cliente Chat".to_string());
    }
}
