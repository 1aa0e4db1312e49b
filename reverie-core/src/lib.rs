//! Interactive-fiction session engine with an AI narrator.
//!
//! This crate provides:
//! - A character/persona/session data model with validation
//! - A session store with whole-collection JSON persistence
//! - A derived narrative state machine (alive, dead, time-skip pending,
//!   awaiting a new persona)
//! - Turn orchestration against a generative narrator backend, including
//!   the in-band death-sentinel protocol
//! - A time-skip processor that ages and evolves a character
//!
//! # Quick Start
//!
//! ```ignore
//! use reverie_core::{Character, Engine, Narrator, UserPersona};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let narrator = Narrator::from_env()?;
//!     let mut engine = Engine::load(narrator, "reverie_sessions.json").await;
//!
//!     let character = Character::new("Vala", "An ancient guardian of the coast.");
//!     let persona = UserPersona::new("Ren", "180cm", "75kg", "28");
//!     engine.create_session(character, persona).await?;
//!
//!     let outcome = engine.send_turn("I wade into the shallows.").await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod model;
pub mod narrator;
pub mod state;
pub mod store;
pub mod testing;
pub mod timeskip;
pub mod turn;
pub mod voice;

// Primary public API
pub use engine::{Engine, SessionError};
pub use model::{
    Character, CharacterId, ChatSession, DietConfig, DietType, EncounterConfig, HumanPreferences,
    ImageHandle, Message, MessageId, PhysicalAttributes, Role, SessionId, UserPersona,
    ValidationError, WhoSawFirst,
};
pub use narrator::{
    ChatTurn, NarrativeModel, Narrator, NarratorConfig, NarratorError, TimeSkipProjection, Tone,
    DEATH_SENTINEL,
};
pub use state::{NarrativeState, SessionFlags};
pub use store::{SessionStore, SessionSummary, StoreError, STORAGE_FILE};
pub use testing::{MockModel, TestHarness};
pub use timeskip::{TimeSkipOutcome, TIME_SKIP_PLACEHOLDER_TEXT};
pub use turn::{TurnOutcome, CONNECTION_LOST_TEXT};
pub use voice::{AudioClip, AudioError, AudioSink, NullSink};
