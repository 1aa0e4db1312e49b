//! The narrative engine: sessions, derived state, and orchestration.
//!
//! This is the primary public API. It owns the session store and the
//! narrative backend, derives each session's state before dispatching, and
//! holds the transient flags and in-flight guards that never persist.

use crate::model::{
    Character, ChatSession, ImageHandle, Message, SessionId, UserPersona, ValidationError,
};
use crate::narrator::{NarrativeModel, NarratorError};
use crate::state::{NarrativeState, SessionFlags};
use crate::store::{SessionStore, SessionSummary, StoreError};
use crate::timeskip::{self, TimeSkipOutcome};
use crate::turn::{self, TurnOutcome};
use crate::voice::{AudioSink, NullSink};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message text is empty")]
    EmptyInput,

    #[error("time-skip duration is empty")]
    EmptyDuration,

    #[error("no active session")]
    NoActiveSession,

    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("session has no user persona")]
    MissingPersona,

    #[error("a request is already in flight for this session")]
    TurnInFlight,

    #[error("operation not allowed while {state}")]
    NotAllowed { state: NarrativeState },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("narrator error: {0}")]
    Narrator(#[from] NarratorError),
}

/// The narrative engine.
pub struct Engine<M: NarrativeModel> {
    store: SessionStore,
    model: M,
    sink: Box<dyn AudioSink>,
    flags: HashMap<SessionId, SessionFlags>,
    in_flight: HashSet<SessionId>,
    voice_autoplay: bool,
    autosave_path: Option<PathBuf>,
}

impl<M: NarrativeModel> Engine<M> {
    /// Create an engine with an empty store and no audio output.
    pub fn new(model: M) -> Self {
        Self {
            store: SessionStore::new(),
            model,
            sink: Box::new(NullSink),
            flags: HashMap::new(),
            in_flight: HashSet::new(),
            voice_autoplay: false,
            autosave_path: None,
        }
    }

    /// Create an engine whose store is loaded from `path` and rewritten
    /// there on every change.
    pub async fn load(model: M, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut engine = Self::new(model);
        engine.store = SessionStore::load(&path).await;
        engine.autosave_path = Some(path);
        engine
    }

    /// Wire up an audio output for voice auto-play.
    pub fn with_audio_sink(mut self, sink: impl AudioSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Persist the store to `path` after every mutation.
    pub fn with_autosave(mut self, path: impl Into<PathBuf>) -> Self {
        self.autosave_path = Some(path.into());
        self
    }

    pub fn set_voice_autoplay(&mut self, enabled: bool) {
        self.voice_autoplay = enabled;
    }

    pub fn voice_autoplay(&self) -> bool {
        self.voice_autoplay
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    // ========================================================================
    // Session management
    // ========================================================================

    /// Create a session from a validated character and persona; it becomes
    /// the active session.
    pub async fn create_session(
        &mut self,
        character: Character,
        persona: UserPersona,
    ) -> Result<SessionId, SessionError> {
        let id = self.store.create_session(character, persona)?;
        self.autosave().await;
        Ok(id)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.list_sessions()
    }

    pub fn select_session(&mut self, id: SessionId) {
        self.store.select_session(id);
    }

    pub async fn delete_session(&mut self, id: SessionId) {
        self.store.delete_session(id);
        self.flags.remove(&id);
        self.in_flight.remove(&id);
        self.autosave().await;
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.store.active_session()
    }

    /// Derived state of a session.
    pub fn state_of(&self, id: SessionId) -> Option<NarrativeState> {
        let session = self.store.get(id)?;
        let flags = self.flags.get(&id).copied().unwrap_or_default();
        Some(NarrativeState::of(session, flags))
    }

    /// Derived state of the active session.
    pub fn active_state(&self) -> Option<NarrativeState> {
        self.store.active_id().and_then(|id| self.state_of(id))
    }

    // ========================================================================
    // Narrative operations
    // ========================================================================

    /// Run one chat turn against the active session.
    pub async fn send_turn(&mut self, input: &str) -> Result<TurnOutcome, SessionError> {
        let (id, state) = self.active()?;
        if !state.accepts_turns() {
            return Err(SessionError::NotAllowed { state });
        }
        self.begin(id)?;
        let result = turn::run_turn(
            &mut self.store,
            &self.model,
            self.sink.as_ref(),
            id,
            input,
            self.voice_autoplay,
        )
        .await;
        self.finish(id);
        self.autosave().await;
        result
    }

    /// Fast-forward the active (dead) session by `duration`. On success the
    /// session awaits a new persona; on failure it reverts to dead and the
    /// skip can be retried.
    pub async fn skip_time(&mut self, duration: &str) -> Result<TimeSkipOutcome, SessionError> {
        let (id, state) = self.active()?;
        if !state.accepts_time_skip() {
            return Err(SessionError::NotAllowed { state });
        }
        if duration.trim().is_empty() {
            return Err(SessionError::EmptyDuration);
        }
        self.begin(id)?;
        self.flags.entry(id).or_default().time_skip_requested = true;

        let result = timeskip::run_time_skip(&mut self.store, &self.model, id, duration).await;

        let flags = self.flags.entry(id).or_default();
        flags.time_skip_requested = false;
        if result.is_ok() {
            flags.new_persona_requested = true;
        }
        self.finish(id);
        self.autosave().await;
        result
    }

    /// Generate a standalone scene image and append it as an image-bearing
    /// message. Image messages are narrative artifacts: they are never
    /// replayed to the model as history. Failure leaves the session
    /// untouched.
    pub async fn generate_scene_image(
        &mut self,
        prompt: &str,
    ) -> Result<ImageHandle, SessionError> {
        let (id, state) = self.active()?;
        if !state.accepts_turns() {
            return Err(SessionError::NotAllowed { state });
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.begin(id)?;

        let session = self
            .store
            .get(id)
            .ok_or(SessionError::UnknownSession(id))?;
        let character = session.character.clone();
        let persona = session.user_persona.clone();
        let mut messages = session.messages.clone();

        let result = self.model.generate_image(prompt).await;
        let outcome = match result {
            Ok(image) => {
                messages.push(Message::model(prompt).with_image(image.clone()));
                self.store.update_session(id, messages, character, persona)?;
                Ok(image)
            }
            Err(e) => Err(e.into()),
        };
        self.finish(id);
        self.autosave().await;
        outcome
    }

    /// Replace the active session's persona after a time skip. Appends an
    /// entrance message (never a death message), so the session derives
    /// alive again.
    pub async fn submit_new_persona(&mut self, persona: UserPersona) -> Result<(), SessionError> {
        let (id, state) = self.active()?;
        if !state.accepts_new_persona() {
            return Err(SessionError::NotAllowed { state });
        }
        persona.validate()?;

        let session = self
            .store
            .get(id)
            .ok_or(SessionError::UnknownSession(id))?;
        let character = session.character.clone();
        let mut messages = session.messages.clone();
        messages.push(Message::model(entrance_text(&persona)));
        self.store
            .update_session(id, messages, character, Some(persona))?;

        self.flags.entry(id).or_default().new_persona_requested = false;
        self.autosave().await;
        Ok(())
    }

    /// Persist the store explicitly.
    pub async fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), SessionError> {
        self.store.save(path).await.map_err(Into::into)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn active(&self) -> Result<(SessionId, NarrativeState), SessionError> {
        let id = self.store.active_id().ok_or(SessionError::NoActiveSession)?;
        let state = self
            .state_of(id)
            .ok_or(SessionError::UnknownSession(id))?;
        Ok((id, state))
    }

    /// Per-session in-flight guard: at most one mutating request per
    /// session, so concurrent store updates cannot drop a message.
    fn begin(&mut self, id: SessionId) -> Result<(), SessionError> {
        if !self.in_flight.insert(id) {
            return Err(SessionError::TurnInFlight);
        }
        Ok(())
    }

    fn finish(&mut self, id: SessionId) {
        self.in_flight.remove(&id);
    }

    async fn autosave(&self) {
        if let Some(path) = &self.autosave_path {
            if let Err(e) = self.store.save(path).await {
                warn!(error = %e, "failed to autosave session store");
            }
        }
    }
}

fn entrance_text(persona: &UserPersona) -> String {
    format!("A new figure steps into the story: {}.", persona.name)
}
