//! Session collection with whole-document persistence.
//!
//! The store owns every session reachable through it; orchestration code
//! mutates sessions exclusively through [`SessionStore::update_session`] so
//! persistence and observers always see a consistent post-turn snapshot.
//! The full collection serializes as one JSON document, loaded once at
//! startup and rewritten in full on every change.

use crate::model::{
    Character, ChatSession, Message, SessionId, UserPersona, ValidationError, WhoSawFirst,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// File name the session collection is stored under.
pub const STORAGE_FILE: &str = "reverie_sessions.json";

/// Maximum characters of the last message kept as the session preview.
const PREVIEW_MAX_CHARS: usize = 60;

/// Errors from session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Summary of a session for listings.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub character_name: String,
    pub preview_text: String,
    pub last_updated: chrono::DateTime<Utc>,
}

/// The set of independent conversation sessions, newest-created first.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    active: Option<SessionId>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh session from a validated character and persona, seed
    /// it with a single opening message, and make it the active session.
    pub fn create_session(
        &mut self,
        character: Character,
        persona: UserPersona,
    ) -> Result<SessionId, StoreError> {
        character.validate()?;
        persona.validate()?;

        let seed = seed_message(&character);
        let session = ChatSession {
            id: SessionId::new(),
            preview_text: preview_of(&seed.text),
            character,
            user_persona: Some(persona),
            messages: vec![seed],
            last_updated: Utc::now(),
        };
        let id = session.id;
        self.sessions.insert(0, session);
        self.active = Some(id);
        Ok(id)
    }

    /// Summaries in creation order, newest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|session| SessionSummary {
                id: session.id,
                character_name: session.character.name.clone(),
                preview_text: session.preview_text.clone(),
                last_updated: session.last_updated,
            })
            .collect()
    }

    /// Select the active session. An unknown id leaves the store with no
    /// active session rather than failing.
    pub fn select_session(&mut self, id: SessionId) {
        self.active = self.sessions.iter().find(|s| s.id == id).map(|s| s.id);
    }

    /// Remove a session. If it was active, the active session becomes none.
    pub fn delete_session(&mut self, id: SessionId) {
        self.sessions.retain(|s| s.id != id);
        if self.active == Some(id) {
            self.active = None;
        }
    }

    /// Atomically replace a session's mutable fields, recomputing the
    /// preview and bumping `last_updated`. The sole mutation path used by
    /// the turn and time-skip orchestrators.
    pub fn update_session(
        &mut self,
        id: SessionId,
        messages: Vec<Message>,
        character: Character,
        user_persona: Option<UserPersona>,
    ) -> Result<(), StoreError> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::UnknownSession(id))?;

        session.preview_text = messages
            .last()
            .map(|m| preview_of(&m.text))
            .unwrap_or_default();
        session.messages = messages;
        session.character = character;
        session.user_persona = user_persona;
        session.last_updated = Utc::now();
        Ok(())
    }

    pub fn get(&self, id: SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Conventional storage path inside a data directory.
    pub fn default_path(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(STORAGE_FILE)
    }

    /// Load the collection from disk. A missing or corrupt document yields
    /// an empty store; it is never an error.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(_) => return Self::new(),
        };

        match serde_json::from_str::<SavedSessions>(&content) {
            Ok(saved) => Self {
                sessions: saved.sessions,
                active: None,
            },
            Err(e) => {
                warn!(error = %e, "discarding corrupt session document");
                Self::new()
            }
        }
    }

    /// Rewrite the full collection to disk.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let saved = SavedSessions {
            sessions: self.sessions.clone(),
        };
        let content = serde_json::to_string_pretty(&saved)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

/// The persisted document: the ordered session collection.
#[derive(Debug, Serialize, Deserialize)]
struct SavedSessions {
    sessions: Vec<ChatSession>,
}

/// Deterministic opening message derived from the encounter configuration.
fn seed_message(character: &Character) -> Message {
    let text = match &character.encounter {
        Some(encounter) => {
            let sighting = match encounter.who_saw_first {
                WhoSawFirst::User => {
                    format!("You spot {} before you are noticed.", character.name)
                }
                WhoSawFirst::Character => format!("{} has already seen you.", character.name),
                WhoSawFirst::Both => format!(
                    "You and {} notice each other at the same moment.",
                    character.name
                ),
            };
            format!("The scene opens in {}. {}", encounter.environment, sighting)
        }
        None => format!("Your story with {} begins.", character.name),
    };
    Message::model(text)
}

fn preview_of(text: &str) -> String {
    if text.chars().count() > PREVIEW_MAX_CHARS {
        let truncated: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{truncated}…")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EncounterConfig;

    fn character(name: &str) -> Character {
        Character::new(name, "a towering guardian")
    }

    fn persona() -> UserPersona {
        UserPersona::new("Ren", "180cm", "75kg", "28")
    }

    #[test]
    fn test_create_session_seeds_and_activates() {
        let mut store = SessionStore::new();
        let id = store
            .create_session(character("Vala"), persona())
            .expect("creates");

        assert_eq!(store.active_id(), Some(id));
        let session = store.get(id).expect("exists");
        assert_eq!(session.messages.len(), 1);
        assert!(session.messages[0].text.contains("Vala"));
        assert!(!session.preview_text.is_empty());
    }

    #[test]
    fn test_create_session_validates_both_records() {
        let mut store = SessionStore::new();
        assert!(store.create_session(character("  "), persona()).is_err());

        let bad_persona = UserPersona::new("", "180cm", "75kg", "28");
        assert!(store
            .create_session(character("Vala"), bad_persona)
            .is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_seed_message_reflects_encounter() {
        let mut c = character("Vala");
        c.encounter = Some(EncounterConfig {
            environment: "a flooded forest".to_string(),
            who_saw_first: WhoSawFirst::Character,
        });
        let seed = seed_message(&c);
        assert!(seed.text.contains("a flooded forest"));
        assert!(seed.text.contains("has already seen you"));
        assert!(!seed.is_death);
    }

    #[test]
    fn test_list_is_newest_first() {
        let mut store = SessionStore::new();
        let first = store
            .create_session(character("First"), persona())
            .expect("creates");
        let second = store
            .create_session(character("Second"), persona())
            .expect("creates");

        let summaries = store.list_sessions();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, second);
        assert_eq!(summaries[1].id, first);
    }

    #[test]
    fn test_select_unknown_clears_active() {
        let mut store = SessionStore::new();
        let id = store
            .create_session(character("Vala"), persona())
            .expect("creates");
        assert_eq!(store.active_id(), Some(id));

        store.select_session(SessionId::new());
        assert_eq!(store.active_id(), None);
        assert!(store.active_session().is_none());

        store.select_session(id);
        assert_eq!(store.active_id(), Some(id));
    }

    #[test]
    fn test_delete_active_clears_active() {
        let mut store = SessionStore::new();
        let id = store
            .create_session(character("Vala"), persona())
            .expect("creates");

        store.delete_session(id);
        assert!(store.is_empty());
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn test_update_recomputes_preview_and_bumps_time() {
        let mut store = SessionStore::new();
        let id = store
            .create_session(character("Vala"), persona())
            .expect("creates");
        let before = store.get(id).expect("exists").last_updated;

        let mut messages = store.get(id).expect("exists").messages.clone();
        messages.push(Message::user("hello"));
        let c = store.get(id).expect("exists").character.clone();
        let p = store.get(id).expect("exists").user_persona.clone();
        store
            .update_session(id, messages, c, p)
            .expect("updates");

        let session = store.get(id).expect("exists");
        assert_eq!(session.preview_text, "hello");
        assert!(session.last_updated >= before);
    }

    #[test]
    fn test_update_unknown_session_errors() {
        let mut store = SessionStore::new();
        let result = store.update_session(
            SessionId::new(),
            Vec::new(),
            character("Vala"),
            Some(persona()),
        );
        assert!(matches!(result, Err(StoreError::UnknownSession(_))));
    }

    #[test]
    fn test_preview_truncation_is_char_safe() {
        let long = "é".repeat(100);
        let preview = preview_of(&long);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));

        assert_eq!(preview_of("short"), "short");
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        use tempfile::TempDir;

        let dir = TempDir::new().expect("temp dir");
        let path = SessionStore::default_path(dir.path());

        let mut store = SessionStore::new();
        store
            .create_session(character("Alpha"), persona())
            .expect("creates");
        store
            .create_session(character("Beta"), persona())
            .expect("creates");
        store.save(&path).await.expect("saves");

        let loaded = SessionStore::load(&path).await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.list_sessions()[0].character_name, "Beta");
        // The active session is UI state, not persisted.
        assert_eq!(loaded.active_id(), None);
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_and_corrupt() {
        use tempfile::TempDir;

        let dir = TempDir::new().expect("temp dir");
        let path = SessionStore::default_path(dir.path());

        let loaded = SessionStore::load(&path).await;
        assert!(loaded.is_empty());

        std::fs::write(&path, "{not json").expect("writes");
        let loaded = SessionStore::load(&path).await;
        assert!(loaded.is_empty());
    }
}
