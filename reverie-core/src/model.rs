//! Core data types for characters, personas, sessions, and messages.
//!
//! These records are pure data plus validation; all behavior lives in the
//! store and orchestration modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for chat sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for messages within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The reserved id carried by the transient time-skip placeholder
    /// message, stable so the placeholder can be located and removed.
    pub fn placeholder() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_placeholder(self) -> bool {
        self.0.is_nil()
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Errors from record validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),

    #[error("human preferences are only valid for a carnivore that eats humans")]
    InvalidHumanPreferences,
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

// ============================================================================
// Images
// ============================================================================

/// Handle to an image payload (base64 data plus its MIME type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub mime_type: String,
    pub data: String,
}

impl ImageHandle {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

// ============================================================================
// Diet
// ============================================================================

/// What the character eats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DietType {
    Herbivore,
    Carnivore,
}

impl DietType {
    pub fn name(&self) -> &'static str {
        match self {
            DietType::Herbivore => "Herbivore",
            DietType::Carnivore => "Carnivore",
        }
    }
}

/// Preferences that apply when a carnivore eats humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanPreferences {
    pub age_group: String,
    pub body_type: String,
    pub taste: String,
}

/// The character's dietary configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DietConfig {
    pub diet_type: DietType,
    pub details: String,
    pub eats_humans: bool,
    #[serde(default)]
    pub human_preferences: Option<HumanPreferences>,
}

impl DietConfig {
    /// Human preferences, only when they are meaningful: a carnivore that
    /// eats humans. Stored preferences on any other diet are ignored.
    pub fn effective_human_preferences(&self) -> Option<&HumanPreferences> {
        if self.diet_type == DietType::Carnivore && self.eats_humans {
            self.human_preferences.as_ref()
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.human_preferences.is_some()
            && (self.diet_type == DietType::Herbivore || !self.eats_humans)
        {
            return Err(ValidationError::InvalidHumanPreferences);
        }
        Ok(())
    }
}

// ============================================================================
// Encounter
// ============================================================================

/// Who noticed the other first when the story opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhoSawFirst {
    User,
    Character,
    Both,
}

/// How the opening encounter is framed. Immutable after session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterConfig {
    pub environment: String,
    pub who_saw_first: WhoSawFirst,
}

// ============================================================================
// Character
// ============================================================================

/// Free-text physical attributes, evolved by time skips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalAttributes {
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub weight: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub life_expectancy: String,
    #[serde(default)]
    pub powers: String,
}

/// A story character. Identity is `id`; height, weight, age, and the base
/// image mutate over time skips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub base_image: Option<ImageHandle>,
    /// Character and tone summary fed to the narrator as system context.
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default)]
    pub attributes: PhysicalAttributes,
    #[serde(default)]
    pub diet: Option<DietConfig>,
    #[serde(default)]
    pub encounter: Option<EncounterConfig>,
    /// Personality-question text mapped to the player's answer.
    #[serde(default)]
    pub personality_answers: BTreeMap<String, String>,
}

impl Character {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            description: description.into(),
            base_image: None,
            system_instruction: String::new(),
            attributes: PhysicalAttributes::default(),
            diet: None,
            encounter: None,
            personality_answers: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        if let Some(diet) = &self.diet {
            diet.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// User persona
// ============================================================================

/// The player's persona inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPersona {
    pub name: String,
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub base_image: Option<ImageHandle>,
    pub height: String,
    pub weight: String,
    pub age: String,
}

impl UserPersona {
    pub fn new(
        name: impl Into<String>,
        height: impl Into<String>,
        weight: impl Into<String>,
        age: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            appearance: String::new(),
            base_image: None,
            height: height.into(),
            weight: weight.into(),
            age: age.into(),
        }
    }

    pub fn with_appearance(mut self, appearance: impl Into<String>) -> Self {
        self.appearance = appearance.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;
        require("height", &self.height)?;
        require("weight", &self.weight)?;
        require("age", &self.age)?;
        Ok(())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One message in a session log. Append-only except for the transient
/// time-skip placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_death: bool,
    #[serde(default)]
    pub image: Option<ImageHandle>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            is_death: false,
            image: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Model,
            text: text.into(),
            timestamp: Utc::now(),
            is_death: false,
            image: None,
        }
    }

    /// A model message marking the user persona's death.
    pub fn death(text: impl Into<String>) -> Self {
        Self {
            is_death: true,
            ..Self::model(text)
        }
    }

    pub fn with_image(mut self, image: ImageHandle) -> Self {
        self.image = Some(image);
        self
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// One narrative thread: a character, the player's persona, and the message
/// log, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub character: Character,
    /// Absent only transiently before the first persona exists.
    pub user_persona: Option<UserPersona>,
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub preview_text: String,
}

impl ChatSession {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
