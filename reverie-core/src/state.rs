//! Derived narrative state for a session.
//!
//! State is never stored: it is recomputed from the tail of the message log
//! plus two transient per-session flags, so a reloaded session always
//! re-derives its state from content alone.

use crate::model::{ChatSession, Message};
use std::fmt;

/// Transient flags held by the engine while a time skip is in progress.
/// Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// A time-skip duration has been submitted and a result is awaited.
    pub time_skip_requested: bool,
    /// A time skip completed; chat stays locked until a new persona exists.
    pub new_persona_requested: bool,
}

/// What the session currently permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NarrativeState {
    /// Default: chat input enabled.
    Alive,
    /// The last message is a death message; only a time skip can follow.
    Dead,
    /// A time-skip result is awaited.
    TimeSkipPending,
    /// A time skip completed; a fresh persona must be submitted.
    AwaitingNewPersona,
}

impl NarrativeState {
    /// Compute the state from the last message and the transient flags.
    pub fn derive(last_message: Option<&Message>, flags: SessionFlags) -> Self {
        if flags.new_persona_requested {
            return NarrativeState::AwaitingNewPersona;
        }
        if flags.time_skip_requested {
            return NarrativeState::TimeSkipPending;
        }
        match last_message {
            Some(message) if message.is_death => NarrativeState::Dead,
            _ => NarrativeState::Alive,
        }
    }

    pub fn of(session: &ChatSession, flags: SessionFlags) -> Self {
        Self::derive(session.last_message(), flags)
    }

    pub fn accepts_turns(self) -> bool {
        self == NarrativeState::Alive
    }

    pub fn accepts_time_skip(self) -> bool {
        self == NarrativeState::Dead
    }

    pub fn accepts_new_persona(self) -> bool {
        self == NarrativeState::AwaitingNewPersona
    }

    pub fn name(self) -> &'static str {
        match self {
            NarrativeState::Alive => "alive",
            NarrativeState::Dead => "dead",
            NarrativeState::TimeSkipPending => "time skip pending",
            NarrativeState::AwaitingNewPersona => "awaiting new persona",
        }
    }
}

impl fmt::Display for NarrativeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
