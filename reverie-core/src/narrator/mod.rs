//! The narrative model protocol: the contract with the generative backend.
//!
//! [`NarrativeModel`] is the seam every orchestrator talks through; the
//! Gemini-backed [`Narrator`] implements it for production and
//! [`crate::testing::MockModel`] implements it with scripted responses.

mod agent;
pub mod profile;

pub use agent::{Narrator, NarratorConfig, Tone};

use crate::model::{Character, ImageHandle, Role, UserPersona};
use crate::voice::AudioClip;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Literal token the model embeds in a reply to signal the persona's death.
/// Part of the external protocol; detected and stripped, never displayed.
pub const DEATH_SENTINEL: &str = "[GAME_OVER]";

/// Errors from the narrative backend.
#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("Gemini API error: {0}")]
    Api(#[from] gemini::Error),

    #[error("failed to parse model output: {0}")]
    Parse(String),

    #[error("model returned no usable content")]
    EmptyReply,

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// One prior exchange replayed to the model as conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

/// Structured result of projecting a character across a span of time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSkipProjection {
    pub new_weight: String,
    pub new_height: String,
    pub new_age: String,
    /// Short stats line.
    pub stats: String,
    /// Longer narrative of what the character did in the interim.
    pub summary: String,
    #[serde(default)]
    pub visual_evolution_prompt: Option<String>,
}

impl TimeSkipProjection {
    /// The visual instruction, if one was actually provided. An empty or
    /// whitespace-only prompt means no image evolution is wanted.
    pub fn visual_instruction(&self) -> Option<&str> {
        self.visual_evolution_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
    }
}

/// The generative collaborators the narrative core depends on.
///
/// Every call is one request/response; failures are scoped to the operation
/// that issued them and never corrupt session state.
#[async_trait]
pub trait NarrativeModel: Send + Sync {
    /// One chat completion: history plus the new input, in character.
    async fn chat(
        &self,
        history: &[ChatTurn],
        input: &str,
        character: &Character,
        persona: &UserPersona,
    ) -> Result<String, NarratorError>;

    /// Project the character forward across a narrated span of time.
    async fn project_time_skip(
        &self,
        character: &Character,
        duration: &str,
    ) -> Result<TimeSkipProjection, NarratorError>;

    /// Evolve an image per an instruction, returning the replacement.
    async fn evolve_image(
        &self,
        image: &ImageHandle,
        instruction: &str,
    ) -> Result<ImageHandle, NarratorError>;

    /// Generate a standalone scene image from a prompt.
    async fn generate_image(&self, prompt: &str) -> Result<ImageHandle, NarratorError>;

    /// Synthesize speech for a reply.
    async fn synthesize_speech(&self, text: &str) -> Result<AudioClip, NarratorError>;

    /// Generate a full character profile from an optional description.
    async fn generate_profile(
        &self,
        description: Option<&str>,
        tone: Tone,
    ) -> Result<profile::GeneratedProfile, NarratorError>;

    /// Describe an uploaded image, including estimated measurements.
    async fn analyze_image(&self, image: &ImageHandle)
        -> Result<profile::ImageAnalysis, NarratorError>;
}
