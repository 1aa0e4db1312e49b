//! The Gemini-backed narrator.
//!
//! Assembles the system instruction from the character pair and encounter
//! framing, and maps each collaborator call onto the Gemini API.

use super::profile::{parse_image_analysis, parse_json, GeneratedProfile, ImageAnalysis};
use super::{ChatTurn, NarrativeModel, NarratorError, TimeSkipProjection, DEATH_SENTINEL};
use crate::model::{Character, ImageHandle, Role, UserPersona};
use crate::voice::AudioClip;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gemini::{Content, Gemini, Modality, Part, Request};

/// Overall register of the narration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tone {
    Wholesome,
    #[default]
    Playful,
    Romantic,
    Grim,
}

impl Tone {
    pub fn name(self) -> &'static str {
        match self {
            Tone::Wholesome => "Wholesome",
            Tone::Playful => "Playful",
            Tone::Romantic => "Romantic",
            Tone::Grim => "Grim",
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            Tone::Wholesome => "Keep the story warm and gentle; peril stays mild.",
            Tone::Playful => "Keep the story light and teasing; danger is real but never grim.",
            Tone::Romantic => "Let tension and intimacy drive the story.",
            Tone::Grim => "The world is harsh and consequences are permanent.",
        }
    }
}

/// Configuration for the narrator.
#[derive(Debug, Clone)]
pub struct NarratorConfig {
    /// Model override; the client default is used when unset.
    pub model: Option<String>,

    /// Maximum tokens for replies.
    pub max_output_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,

    /// Narration register woven into the system instruction.
    pub tone: Tone,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_output_tokens: 2048,
            temperature: Some(0.9),
            tone: Tone::default(),
        }
    }
}

/// The AI narrator.
pub struct Narrator {
    client: Gemini,
    config: NarratorConfig,
}

impl Narrator {
    /// Create a narrator with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Gemini::new(api_key),
            config: NarratorConfig::default(),
        }
    }

    /// Create a narrator from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, NarratorError> {
        Ok(Self {
            client: Gemini::from_env()?,
            config: NarratorConfig::default(),
        })
    }

    /// Configure the narrator.
    pub fn with_config(mut self, config: NarratorConfig) -> Self {
        self.config = config;
        self
    }

    fn apply_config(&self, mut request: Request) -> Request {
        request = request.with_max_output_tokens(self.config.max_output_tokens);
        if let Some(ref model) = self.config.model {
            request = request.with_model(model);
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    fn build_system_instruction(&self, character: &Character, persona: &UserPersona) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "You are {}, a character in an ongoing interactive story. \
             Stay in character at all times and narrate in second person.\n",
            character.name
        ));
        if !character.description.trim().is_empty() {
            prompt.push_str(&format!("\n## Who You Are\n{}\n", character.description));
        }
        if !character.system_instruction.trim().is_empty() {
            prompt.push('\n');
            prompt.push_str(&character.system_instruction);
            prompt.push('\n');
        }

        let attributes = &character.attributes;
        let mut lines = Vec::new();
        if !attributes.height.trim().is_empty() {
            lines.push(format!("**Height:** {}", attributes.height));
        }
        if !attributes.weight.trim().is_empty() {
            lines.push(format!("**Weight:** {}", attributes.weight));
        }
        if !attributes.age.trim().is_empty() {
            lines.push(format!("**Age:** {}", attributes.age));
        }
        if !attributes.life_expectancy.trim().is_empty() {
            lines.push(format!("**Life expectancy:** {}", attributes.life_expectancy));
        }
        if !attributes.powers.trim().is_empty() {
            lines.push(format!("**Powers:** {}", attributes.powers));
        }
        if !lines.is_empty() {
            prompt.push_str("\n## Your Body\n");
            for line in lines {
                prompt.push_str(&line);
                prompt.push('\n');
            }
        }

        if let Some(diet) = &character.diet {
            prompt.push_str(&format!(
                "\n## Your Diet\nYou are a {}. {}\n",
                diet.diet_type.name().to_lowercase(),
                diet.details
            ));
            if diet.eats_humans {
                prompt.push_str("Humans are part of your diet.\n");
            }
            if let Some(preferences) = diet.effective_human_preferences() {
                prompt.push_str(&format!(
                    "Preferred prey: {} with a {} build, {} taste.\n",
                    preferences.age_group, preferences.body_type, preferences.taste
                ));
            }
        }

        if !character.personality_answers.is_empty() {
            prompt.push_str("\n## Your Personality\n");
            for (question, answer) in &character.personality_answers {
                prompt.push_str(&format!("- {question}: {answer}\n"));
            }
        }

        if let Some(encounter) = &character.encounter {
            prompt.push_str(&format!(
                "\n## The Encounter\nThe story takes place in {}.\n",
                encounter.environment
            ));
            let sighting = match encounter.who_saw_first {
                crate::model::WhoSawFirst::User => "The human noticed you first.",
                crate::model::WhoSawFirst::Character => "You noticed the human first.",
                crate::model::WhoSawFirst::Both => "You both noticed each other at once.",
            };
            prompt.push_str(sighting);
            prompt.push('\n');
        }

        prompt.push_str(&format!(
            "\n## The Human\n**Name:** {}\n**Height:** {}\n**Weight:** {}\n**Age:** {}\n",
            persona.name, persona.height, persona.weight, persona.age
        ));
        if !persona.appearance.trim().is_empty() {
            prompt.push_str(&format!("**Appearance:** {}\n", persona.appearance));
        }

        prompt.push_str(&format!("\n## Tone\n{}\n", self.config.tone.guidance()));

        prompt.push_str(&format!(
            "\n## Death Protocol\nIf the story reaches a point where {} dies, \
             finish the narration of that moment and append the literal token \
             {DEATH_SENTINEL} at the very end of your reply. Never use the \
             token anywhere else, and never mention it.\n",
            persona.name
        ));

        prompt
    }
}

#[async_trait]
impl NarrativeModel for Narrator {
    async fn chat(
        &self,
        history: &[ChatTurn],
        input: &str,
        character: &Character,
        persona: &UserPersona,
    ) -> Result<String, NarratorError> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| match turn.role {
                Role::User => Content::user(&turn.text),
                Role::Model => Content::model(&turn.text),
            })
            .collect();
        contents.push(Content::user(input));

        let request = self
            .apply_config(Request::new(contents))
            .with_system_instruction(self.build_system_instruction(character, persona));

        let response = self.client.generate(request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(NarratorError::EmptyReply);
        }
        Ok(text)
    }

    async fn project_time_skip(
        &self,
        character: &Character,
        duration: &str,
    ) -> Result<TimeSkipProjection, NarratorError> {
        let attributes = &character.attributes;
        let prompt = format!(
            "{name} is a character in an interactive story. {duration} now pass \
             for {name} alone.\n\
             Current height: {height}. Current weight: {weight}. Current age: {age}. \
             Life expectancy: {life}.\n\
             Describe how {name} spent that time and how their body changed. \
             Respond with a single JSON object with exactly these string fields:\n\
             newWeight, newHeight, newAge, stats (one short line of current stats), \
             summary (a paragraph of what they did), visualEvolutionPrompt \
             (an image-editing instruction describing the visible changes, or an \
             empty string if their appearance is unchanged).",
            name = character.name,
            duration = duration,
            height = attributes.height,
            weight = attributes.weight,
            age = attributes.age,
            life = attributes.life_expectancy,
        );

        let request = self
            .apply_config(Request::new(vec![Content::user(prompt)]))
            .with_json_response();

        let response = self.client.generate(request).await?;
        parse_json(&response.text())
    }

    async fn evolve_image(
        &self,
        image: &ImageHandle,
        instruction: &str,
    ) -> Result<ImageHandle, NarratorError> {
        let content = Content::user_parts(vec![
            Part::inline_data(&image.mime_type, &image.data),
            Part::text(format!(
                "Edit this image: {instruction}. Keep the character recognizable."
            )),
        ]);

        let request = Request::new(vec![content])
            .with_model(gemini::IMAGE_MODEL)
            .with_modalities(vec![Modality::Image, Modality::Text]);

        let response = self.client.generate(request).await?;
        let (mime_type, data) = response.inline_data().ok_or(NarratorError::EmptyReply)?;
        Ok(ImageHandle::new(mime_type, data))
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageHandle, NarratorError> {
        let request = Request::new(vec![Content::user(prompt)])
            .with_model(gemini::IMAGE_MODEL)
            .with_modalities(vec![Modality::Image, Modality::Text]);

        let response = self.client.generate(request).await?;
        let (mime_type, data) = response.inline_data().ok_or(NarratorError::EmptyReply)?;
        Ok(ImageHandle::new(mime_type, data))
    }

    async fn synthesize_speech(&self, text: &str) -> Result<AudioClip, NarratorError> {
        let request = Request::new(vec![Content::user(text)])
            .with_model(gemini::TTS_MODEL)
            .with_modalities(vec![Modality::Audio]);

        let response = self.client.generate(request).await?;
        let (mime_type, data) = response.inline_data().ok_or(NarratorError::EmptyReply)?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| NarratorError::Parse(format!("invalid audio payload: {e}")))?;
        Ok(AudioClip {
            mime_type: mime_type.to_string(),
            data: bytes,
        })
    }

    async fn generate_profile(
        &self,
        description: Option<&str>,
        tone: Tone,
    ) -> Result<GeneratedProfile, NarratorError> {
        let premise = match description {
            Some(description) if !description.trim().is_empty() => {
                format!("Base the character on this description: {description}")
            }
            _ => "Invent an original non-human character for an interactive story.".to_string(),
        };

        let prompt = format!(
            "{premise}\n\
             The narration tone will be: {tone}.\n\
             Respond with a single JSON object with these fields:\n\
             name, description (their backstory and nature), height, weight, age, \
             lifeExpectancy, powers, diet (object with dietType of \"HERBIVORE\" or \
             \"CARNIVORE\", details, eatsHumans boolean, and optional humanPreferences \
             object with ageGroup, bodyType, taste), and answers (object mapping each \
             personality question to this character's answer).",
            premise = premise,
            tone = tone.name(),
        );

        let request = self
            .apply_config(Request::new(vec![Content::user(prompt)]))
            .with_json_response();

        let response = self.client.generate(request).await?;
        parse_json(&response.text())
    }

    async fn analyze_image(
        &self,
        image: &ImageHandle,
    ) -> Result<ImageAnalysis, NarratorError> {
        let content = Content::user_parts(vec![
            Part::inline_data(&image.mime_type, &image.data),
            Part::text(
                "Describe the character in this image for an interactive story. \
                 After the description, add one line each starting with exactly \
                 \"Height:\", \"Weight:\", and \"Environment:\" with your best \
                 estimates.",
            ),
        ]);

        let request = self.apply_config(Request::new(vec![content]));
        let response = self.client.generate(request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(NarratorError::EmptyReply);
        }
        Ok(parse_image_analysis(&text))
    }
}
