//! Chat turn orchestration: user input to committed model reply.
//!
//! The user message commits before the backend call so it is visible while
//! the reply is in flight; the reply (or the fixed fallback) commits after.
//! Both commits go through [`crate::store::SessionStore::update_session`].

use crate::engine::SessionError;
use crate::model::{Message, SessionId};
use crate::narrator::{ChatTurn, NarrativeModel, DEATH_SENTINEL};
use crate::store::SessionStore;
use crate::voice::AudioSink;
use tracing::warn;

/// Fallback reply committed when the chat backend cannot be reached.
pub const CONNECTION_LOST_TEXT: &str =
    "The thread of the story slips out of reach. (connection interrupted)";

/// Outcome of a single chat turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The committed reply text, with the death sentinel stripped.
    pub reply: String,

    /// The reply carried the death sentinel.
    pub died: bool,

    /// The backend failed and the fallback reply was committed instead.
    pub interrupted: bool,
}

pub(crate) async fn run_turn<M: NarrativeModel>(
    store: &mut SessionStore,
    model: &M,
    sink: &dyn AudioSink,
    session_id: SessionId,
    input: &str,
    voice_autoplay: bool,
) -> Result<TurnOutcome, SessionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SessionError::EmptyInput);
    }

    let session = store
        .get(session_id)
        .ok_or(SessionError::UnknownSession(session_id))?;
    let character = session.character.clone();
    let persona = session
        .user_persona
        .clone()
        .ok_or(SessionError::MissingPersona)?;
    let history = replay_history(&session.messages);

    let mut messages = session.messages.clone();
    messages.push(Message::user(input));
    store.update_session(
        session_id,
        messages.clone(),
        character.clone(),
        Some(persona.clone()),
    )?;

    match model.chat(&history, input, &character, &persona).await {
        Ok(reply) => {
            let (text, died) = strip_death_sentinel(&reply);
            let message = if died {
                Message::death(text.clone())
            } else {
                Message::model(text.clone())
            };
            messages.push(message);
            store.update_session(session_id, messages, character, Some(persona))?;

            if !died && voice_autoplay {
                speak(model, sink, &text).await;
            }

            Ok(TurnOutcome {
                reply: text,
                died,
                interrupted: false,
            })
        }
        Err(e) => {
            warn!(error = %e, "chat backend failed; committing fallback reply");
            messages.push(Message::model(CONNECTION_LOST_TEXT));
            store.update_session(session_id, messages, character, Some(persona))?;
            Ok(TurnOutcome {
                reply: CONNECTION_LOST_TEXT.to_string(),
                died: false,
                interrupted: true,
            })
        }
    }
}

/// The history replayed to the model: prior turns excluding the seed
/// message, image-bearing messages, and death messages.
fn replay_history(messages: &[Message]) -> Vec<ChatTurn> {
    messages
        .iter()
        .skip(1)
        .filter(|m| m.image.is_none() && !m.is_death)
        .map(|m| ChatTurn {
            role: m.role,
            text: m.text.clone(),
        })
        .collect()
}

/// Detect the death sentinel, returning the displayable text and whether
/// the sentinel was present.
fn strip_death_sentinel(reply: &str) -> (String, bool) {
    if reply.contains(DEATH_SENTINEL) {
        (reply.replace(DEATH_SENTINEL, "").trim().to_string(), true)
    } else {
        (reply.to_string(), false)
    }
}

/// Voice is fire-and-forget: synthesis or playback failure never blocks or
/// rolls back the text turn.
async fn speak<M: NarrativeModel>(model: &M, sink: &dyn AudioSink, text: &str) {
    match model.synthesize_speech(text).await {
        Ok(clip) => {
            if let Err(e) = sink.play(clip) {
                warn!(error = %e, "audio playback failed");
            }
        }
        Err(e) => warn!(error = %e, "speech synthesis failed"),
    }
}
