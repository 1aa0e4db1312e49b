//! Testing utilities for the narrative engine.
//!
//! This module provides tools for integration testing:
//! - `MockModel` for deterministic testing without API calls
//! - `TestHarness` for scripted story scenarios
//! - Assertion helpers for verifying derived state

use crate::engine::Engine;
use crate::model::{Character, ChatSession, ImageHandle, Message, UserPersona};
use crate::narrator::profile::{GeneratedProfile, ImageAnalysis};
use crate::narrator::{ChatTurn, NarrativeModel, NarratorError, TimeSkipProjection, Tone};
use crate::state::NarrativeState;
use crate::voice::AudioClip;
use async_trait::async_trait;
use std::sync::Mutex;

/// A scripted chat reply from the mock model.
#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Fail(String),
}

#[derive(Default)]
struct MockState {
    replies: Vec<MockReply>,
    reply_index: usize,
    projections: Vec<Result<TimeSkipProjection, String>>,
    projection_index: usize,
    evolved_image: Option<ImageHandle>,
    fail_image_evolution: bool,
    scene_image: Option<ImageHandle>,
    chat_calls: usize,
    projection_calls: usize,
    image_evolution_calls: usize,
    image_generation_calls: usize,
    speech_calls: usize,
    last_chat_history_len: Option<usize>,
}

/// A mock narrative backend that returns scripted responses.
///
/// Use this for deterministic integration tests without API calls.
#[derive(Default)]
pub struct MockModel {
    state: Mutex<MockState>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chat reply to return in order.
    pub fn queue_reply(&self, text: impl Into<String>) {
        self.lock().replies.push(MockReply::Text(text.into()));
    }

    /// Queue a chat failure.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.lock().replies.push(MockReply::Fail(message.into()));
    }

    /// Queue a time-skip projection.
    pub fn queue_projection(&self, projection: TimeSkipProjection) {
        self.lock().projections.push(Ok(projection));
    }

    /// Queue a time-skip failure.
    pub fn queue_projection_failure(&self, message: impl Into<String>) {
        self.lock().projections.push(Err(message.into()));
    }

    /// Image to return from evolution calls; defaults to echoing the input.
    pub fn set_evolved_image(&self, image: ImageHandle) {
        self.lock().evolved_image = Some(image);
    }

    /// Make every image-evolution call fail.
    pub fn fail_image_evolution(&self) {
        self.lock().fail_image_evolution = true;
    }

    /// Image to return from scene generation; defaults to a stub.
    pub fn set_scene_image(&self, image: ImageHandle) {
        self.lock().scene_image = Some(image);
    }

    pub fn chat_calls(&self) -> usize {
        self.lock().chat_calls
    }

    pub fn projection_calls(&self) -> usize {
        self.lock().projection_calls
    }

    pub fn image_evolution_calls(&self) -> usize {
        self.lock().image_evolution_calls
    }

    pub fn image_generation_calls(&self) -> usize {
        self.lock().image_generation_calls
    }

    pub fn speech_calls(&self) -> usize {
        self.lock().speech_calls
    }

    /// Length of the history slice passed to the most recent chat call.
    pub fn last_chat_history_len(&self) -> Option<usize> {
        self.lock().last_chat_history_len
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }
}

#[async_trait]
impl NarrativeModel for MockModel {
    async fn chat(
        &self,
        history: &[ChatTurn],
        _input: &str,
        _character: &Character,
        _persona: &UserPersona,
    ) -> Result<String, NarratorError> {
        let mut state = self.lock();
        state.chat_calls += 1;
        state.last_chat_history_len = Some(history.len());
        let reply = if state.reply_index < state.replies.len() {
            let reply = state.replies[state.reply_index].clone();
            state.reply_index += 1;
            reply
        } else {
            MockReply::Text("The narrator has no more scripted replies.".to_string())
        };
        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Fail(message) => Err(NarratorError::Unavailable(message)),
        }
    }

    async fn project_time_skip(
        &self,
        _character: &Character,
        _duration: &str,
    ) -> Result<TimeSkipProjection, NarratorError> {
        let mut state = self.lock();
        state.projection_calls += 1;
        if state.projection_index < state.projections.len() {
            let projection = state.projections[state.projection_index].clone();
            state.projection_index += 1;
            projection.map_err(NarratorError::Unavailable)
        } else {
            Err(NarratorError::Unavailable(
                "no scripted projection".to_string(),
            ))
        }
    }

    async fn evolve_image(
        &self,
        image: &ImageHandle,
        _instruction: &str,
    ) -> Result<ImageHandle, NarratorError> {
        let mut state = self.lock();
        state.image_evolution_calls += 1;
        if state.fail_image_evolution {
            return Err(NarratorError::Unavailable(
                "image backend down".to_string(),
            ));
        }
        Ok(state.evolved_image.clone().unwrap_or_else(|| image.clone()))
    }

    async fn generate_image(&self, _prompt: &str) -> Result<ImageHandle, NarratorError> {
        let mut state = self.lock();
        state.image_generation_calls += 1;
        Ok(state
            .scene_image
            .clone()
            .unwrap_or_else(|| ImageHandle::new("image/png", "c2NlbmU=")))
    }

    async fn synthesize_speech(&self, _text: &str) -> Result<AudioClip, NarratorError> {
        let mut state = self.lock();
        state.speech_calls += 1;
        Ok(AudioClip {
            mime_type: "audio/wav".to_string(),
            data: Vec::new(),
        })
    }

    async fn generate_profile(
        &self,
        _description: Option<&str>,
        _tone: Tone,
    ) -> Result<GeneratedProfile, NarratorError> {
        Err(NarratorError::Unavailable(
            "profile generation is not scripted".to_string(),
        ))
    }

    async fn analyze_image(
        &self,
        _image: &ImageHandle,
    ) -> Result<ImageAnalysis, NarratorError> {
        Err(NarratorError::Unavailable(
            "image analysis is not scripted".to_string(),
        ))
    }
}

// ============================================================================
// Sample records
// ============================================================================

/// A character suitable for scenario tests.
pub fn sample_character(name: &str) -> Character {
    let mut character = Character::new(name, "An ancient guardian of the drowned coast.");
    character.attributes.height = "4m".to_string();
    character.attributes.weight = "800kg".to_string();
    character.attributes.age = "300".to_string();
    character.attributes.life_expectancy = "2000".to_string();
    character.base_image = Some(ImageHandle::new("image/png", "c2VlZA=="));
    character
}

/// A persona suitable for scenario tests.
pub fn sample_persona(name: &str) -> UserPersona {
    UserPersona::new(name, "180cm", "75kg", "28")
}

/// The projection used by the time-skip scenarios.
pub fn sample_projection() -> TimeSkipProjection {
    TimeSkipProjection {
        new_weight: "300kg".to_string(),
        new_height: "3m".to_string(),
        new_age: "310".to_string(),
        stats: "Leaner and slower.".to_string(),
        summary: "She kept to the deep water and waited.".to_string(),
        visual_evolution_prompt: None,
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Test harness bundling an engine with a single mock-backed session.
pub struct TestHarness {
    pub engine: Engine<MockModel>,
}

impl TestHarness {
    /// Create a harness with one session for a sample character pair.
    pub async fn new() -> Self {
        let mut engine = Engine::new(MockModel::new());
        engine
            .create_session(sample_character("Vala"), sample_persona("Ren"))
            .await
            .expect("harness session");
        Self { engine }
    }

    pub fn session(&self) -> &ChatSession {
        self.engine.active_session().expect("harness session")
    }

    pub fn messages(&self) -> &[Message] {
        &self.session().messages
    }

    pub fn message_count(&self) -> usize {
        self.messages().len()
    }

    pub fn last_message(&self) -> &Message {
        self.messages().last().expect("at least the seed message")
    }

    pub fn state(&self) -> NarrativeState {
        self.engine.active_state().expect("harness session")
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the harness session is in the expected derived state.
#[track_caller]
pub fn assert_state(harness: &TestHarness, expected: NarrativeState) {
    let actual = harness.state();
    assert_eq!(
        actual, expected,
        "expected narrative state `{expected}`, got `{actual}`"
    );
}

/// Assert the harness session holds exactly `expected` messages.
#[track_caller]
pub fn assert_message_count(harness: &TestHarness, expected: usize) {
    let actual = harness.message_count();
    assert_eq!(
        actual, expected,
        "expected {expected} messages, got {actual}"
    );
}
