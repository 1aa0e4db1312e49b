//! Time-skip processing: the narrative fast-forward that ages and evolves a
//! character after a death.
//!
//! A transient placeholder message (reserved nil id) marks the calculation
//! in progress; it is deleted — not edited — once the projection resolves,
//! and the consolidated summary is appended at the end of the log.

use crate::engine::SessionError;
use crate::model::{Character, Message, MessageId, Role, SessionId};
use crate::narrator::{NarrativeModel, TimeSkipProjection};
use crate::store::SessionStore;
use chrono::Utc;
use tracing::warn;

/// Text of the transient placeholder message.
pub const TIME_SKIP_PLACEHOLDER_TEXT: &str = "Calculating the consequences of the passing time…";

/// Outcome of a completed time skip.
#[derive(Debug, Clone)]
pub struct TimeSkipOutcome {
    /// The consolidated narrative message that was appended.
    pub summary_text: String,

    /// The character's base image was replaced by an evolved one.
    pub image_evolved: bool,
}

pub(crate) fn placeholder_message() -> Message {
    Message {
        id: MessageId::placeholder(),
        role: Role::Model,
        text: TIME_SKIP_PLACEHOLDER_TEXT.to_string(),
        timestamp: Utc::now(),
        is_death: false,
        image: None,
    }
}

pub(crate) async fn run_time_skip<M: NarrativeModel>(
    store: &mut SessionStore,
    model: &M,
    session_id: SessionId,
    duration: &str,
) -> Result<TimeSkipOutcome, SessionError> {
    let duration = duration.trim();
    if duration.is_empty() {
        return Err(SessionError::EmptyDuration);
    }

    let session = store
        .get(session_id)
        .ok_or(SessionError::UnknownSession(session_id))?;
    let character = session.character.clone();
    let persona = session.user_persona.clone();

    let mut messages = session.messages.clone();
    messages.push(placeholder_message());
    store.update_session(
        session_id,
        messages.clone(),
        character.clone(),
        persona.clone(),
    )?;

    let projection = match model.project_time_skip(&character, duration).await {
        Ok(projection) => projection,
        Err(e) => {
            // Revert: drop the placeholder, leave the character untouched.
            messages.retain(|m| !m.id.is_placeholder());
            store.update_session(session_id, messages, character, persona)?;
            return Err(SessionError::Narrator(e));
        }
    };

    let mut updated = character.clone();
    updated.attributes.height = projection.new_height.clone();
    updated.attributes.weight = projection.new_weight.clone();
    updated.attributes.age = projection.new_age.clone();

    let mut image_evolved = false;
    if let Some(instruction) = projection.visual_instruction() {
        if let Some(image) = &character.base_image {
            match model.evolve_image(image, instruction).await {
                Ok(evolved) => {
                    updated.base_image = Some(evolved);
                    image_evolved = true;
                }
                Err(e) => warn!(error = %e, "image evolution failed; keeping prior image"),
            }
        }
    }

    let summary_text = format_summary(duration, &projection, &updated);
    messages.retain(|m| !m.id.is_placeholder());
    // The summary keeps the death flag: a reloaded session must still derive
    // dead until a fresh persona enters the story.
    messages.push(Message::death(summary_text.clone()));
    store.update_session(session_id, messages, updated, persona)?;

    Ok(TimeSkipOutcome {
        summary_text,
        image_evolved,
    })
}

/// Deterministic consolidated message: duration, activity log, stats, then
/// a one-line status of the new body.
fn format_summary(
    duration: &str,
    projection: &TimeSkipProjection,
    character: &Character,
) -> String {
    format!(
        "Time passes: {duration}.\n\n{summary}\n\n{stats}\n\nWeight: {weight} | Height: {height} | Age: {age}",
        summary = projection.summary.trim(),
        stats = projection.stats.trim(),
        weight = character.attributes.weight,
        height = character.attributes.height,
        age = character.attributes.age,
    )
}
