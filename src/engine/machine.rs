use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::engine::composer::{compose, BookingAction, ChatTurn};
use crate::engine::{catalog, conflict, datetime, history, EngineContext};
use crate::models::{ConversationState, ConversationStep};

const GREETING_KEYWORDS: [&str; 2] = ["hola", "inicio"];
const AFFIRMATIVES: [&str; 4] = ["si", "sí", "ok", "dale"];

/// Runs exactly one turn of the booking dialogue.
///
/// Stateless across invocations: everything it knows comes from the
/// message, the transcript, the optional persisted state, and the
/// per-turn snapshot in `ctx`. The only storage access is the conflict
/// read; a failure there propagates as an error so the caller retries
/// instead of double-booking.
pub fn process_turn(
    ctx: &EngineContext,
    conn: &Connection,
    now: NaiveDateTime,
    message: &str,
    history: &[String],
    prior_state: Option<ConversationState>,
) -> anyhow::Result<ChatTurn> {
    let lower = message.to_lowercase();
    let mut state = prior_state.unwrap_or_default();

    // A greeting keyword hard-resets the flow, superseding both the
    // persisted state and anything the transcript says.
    if GREETING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        state = ConversationState::default();
    } else {
        history::reconstruct(history, &ctx.catalog, &mut state);

        // Naming a service straight away skips the greeting.
        if state.step == ConversationStep::Greeting
            && ctx
                .catalog
                .iter()
                .any(|s| lower.contains(&s.name.to_lowercase()))
        {
            state.step = ConversationStep::ServiceSelection;
        }
    }

    tracing::info!(step = state.step.as_str(), "processing turn");

    // Standing hours question, answerable from any step.
    if lower.contains("que hora") || lower.contains("horario") {
        let reply = format!(
            "Nuestro horario de atención es de {} a {}. ¿Para qué día te gustaría agendar?",
            ctx.hours.start, ctx.hours.end
        );
        return Ok(compose(reply, state, None));
    }

    let (reply, action) = match state.step {
        ConversationStep::Greeting => (greet(ctx), None),
        ConversationStep::ServiceSelection => (select_service(ctx, &lower, &mut state), None),
        ConversationStep::DateTime => (collect_slot(ctx, conn, now, &lower, &mut state)?, None),
        ConversationStep::Confirmation => confirm(ctx, conn, &lower, &mut state)?,
    };

    Ok(compose(reply, state, action))
}

fn greet(ctx: &EngineContext) -> String {
    let listing = ctx
        .catalog
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {} - ${} ({} min)", i + 1, s.name, s.price, s.duration_minutes))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "¡Hola! Soy BarberFlow. Nuestro horario es de {} a {}.\n\
         Aquí tienes nuestros servicios:\n\n{listing}\n\n\
         Por favor, escribe el número del servicio que deseas (ej: \"1\").",
        ctx.hours.start, ctx.hours.end
    )
}

fn select_service(ctx: &EngineContext, lower: &str, state: &mut ConversationState) -> String {
    match catalog::resolve_service(lower, &ctx.catalog) {
        Some(service) => {
            state.collected_data.service_name = Some(service.name.clone());
            state.step = ConversationStep::DateTime;
            format!(
                "Elegiste: **{}** (${} - {} min).\n\n\
                 ¿Para qué día y hora te gustaría reservar?\n(Ej: \"Mañana a las 2pm\")",
                service.name, service.price, service.duration_minutes
            )
        }
        None => {
            "No entendí cuál servicio prefieres. Por favor escribe el NÚMERO o el NOMBRE del servicio."
                .to_string()
        }
    }
}

fn collect_slot(
    ctx: &EngineContext,
    conn: &Connection,
    now: NaiveDateTime,
    lower: &str,
    state: &mut ConversationState,
) -> anyhow::Result<String> {
    let slot = match datetime::resolve_date_time(lower, now) {
        Some(slot) => slot,
        None => return Ok("¿Me repites la fecha y hora? (Ej: Lunes 4pm)".to_string()),
    };

    if !ctx.hours.contains(&slot.time) {
        return Ok(format!(
            "Lo siento, esa hora ({}) está fuera de nuestro horario de atención ({} - {}).\n\n\
             ¿Podrías elegir otra hora?",
            slot.time, ctx.hours.start, ctx.hours.end
        ));
    }

    if conflict::has_conflict(conn, &slot.date, &slot.time, &ctx.utc_offset)? {
        return Ok(format!(
            "Lo siento, el horario {} a las {} ya está ocupado ❌.\n\nPor favor elige otro horario.",
            slot.date, slot.time
        ));
    }

    let collected = &mut state.collected_data;
    collected.date = Some(slot.date.clone());
    collected.time = Some(slot.time.clone());
    if collected.client_name.is_none() {
        collected.client_name = Some("Cliente Chat".to_string());
    }
    state.step = ConversationStep::Confirmation;

    let service = collected
        .service_name
        .clone()
        .unwrap_or_else(|| "tu corte".to_string());
    Ok(format!(
        "Hora {} ({}) disponible ✅.\n\n¿Confirmamos la cita para **{service}**? (Responde SÍ)",
        slot.time, slot.date
    ))
}

fn confirm(
    ctx: &EngineContext,
    conn: &Connection,
    lower: &str,
    state: &mut ConversationState,
) -> anyhow::Result<(String, Option<BookingAction>)> {
    if !AFFIRMATIVES.iter().any(|k| lower.contains(k)) {
        return Ok((
            "Entendido. No he confirmado la cita aún. ¿Deseas confirmar? (Responde SÍ)".to_string(),
            None,
        ));
    }

    let collected = &mut state.collected_data;
    if collected.service_name.is_none() {
        collected.service_name = Some("Corte General".to_string());
    }
    if collected.client_name.is_none() {
        collected.client_name = Some("Cliente Chat".to_string());
    }

    let (date, time) = match (collected.date.clone(), collected.time.clone()) {
        (Some(date), Some(time)) => (date, time),
        _ => {
            state.step = ConversationStep::DateTime;
            return Ok((
                "Lo siento, hubo un error al recuperar la fecha. Por favor escribe la fecha y hora de nuevo."
                    .to_string(),
                None,
            ));
        }
    };

    // Final re-check: the slot may have been taken since it was offered.
    if conflict::has_conflict(conn, &date, &time, &ctx.utc_offset)? {
        state.step = ConversationStep::DateTime;
        return Ok((
            format!("Ups, alguien acaba de reservar ese horario ({time}). Por favor elige otro."),
            None,
        ));
    }

    let action = BookingAction::book(&state.collected_data);
    let service = state
        .collected_data
        .service_name
        .clone()
        .unwrap_or_default();
    tracing::info!(%service, %date, %time, "booking confirmed");

    Ok((
        format!(
            "¡Listo! Cita agendada. 🎉\n\nServicio: {service}\nFecha: {date} {time}\n\nTe esperamos."
        ),
        action,
    ))
}
