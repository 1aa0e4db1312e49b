//! Parsing for the character-creation collaborators: profile autofill and
//! image analysis.

use super::NarratorError;
use crate::model::{
    Character, DietConfig, DietType, HumanPreferences, ImageHandle, PhysicalAttributes,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A model-generated character profile, as it comes over the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedProfile {
    pub name: String,
    pub description: String,
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
    #[serde(default)]
    pub diet: Option<GeneratedDiet>,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

/// Wire shape of the generated diet configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDiet {
    pub diet_type: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub eats_humans: bool,
    #[serde(default)]
    pub human_preferences: Option<GeneratedHumanPreferences>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedHumanPreferences {
    #[serde(default)]
    pub age_group: String,
    #[serde(default)]
    pub body_type: String,
    #[serde(default)]
    pub taste: String,
}

impl GeneratedDiet {
    fn into_diet_config(self) -> DietConfig {
        let diet_type = if self.diet_type.eq_ignore_ascii_case("carnivore") {
            DietType::Carnivore
        } else {
            DietType::Herbivore
        };
        let eats_humans = self.eats_humans && diet_type == DietType::Carnivore;
        let human_preferences = if eats_humans {
            self.human_preferences.map(|p| HumanPreferences {
                age_group: p.age_group,
                body_type: p.body_type,
                taste: p.taste,
            })
        } else {
            None
        };
        DietConfig {
            diet_type,
            details: self.details,
            eats_humans,
            human_preferences,
        }
    }
}

impl GeneratedProfile {
    /// Build a character from the generated profile.
    pub fn into_character(self, base_image: Option<ImageHandle>) -> Character {
        let system_instruction = format!(
            "{} is {}. Powers: {}.",
            self.name,
            self.description.trim_end_matches('.'),
            if self.powers.trim().is_empty() {
                "none"
            } else {
                self.powers.as_str()
            }
        );

        let mut character = Character::new(self.name, self.description);
        character.base_image = base_image;
        character.system_instruction = system_instruction;
        character.attributes = PhysicalAttributes {
            height: self.height,
            weight: self.weight,
            age: self.age,
            life_expectancy: self.life_expectancy,
            powers: self.powers,
        };
        character.diet = self.diet.map(GeneratedDiet::into_diet_config);
        character.personality_answers = self.answers;
        character
    }
}

/// Result of analyzing an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAnalysis {
    /// The full descriptive text.
    pub description: String,
    pub estimated_height: Option<String>,
    pub estimated_weight: Option<String>,
    pub environment: Option<String>,
}

/// Pull the optionally-present `Height:` / `Weight:` / `Environment:` lines
/// out of an image description.
pub fn parse_image_analysis(text: &str) -> ImageAnalysis {
    let mut estimated_height = None;
    let mut estimated_weight = None;
    let mut environment = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = strip_label(line, "height:") {
            estimated_height.get_or_insert_with(|| rest.to_string());
        } else if let Some(rest) = strip_label(line, "weight:") {
            estimated_weight.get_or_insert_with(|| rest.to_string());
        } else if let Some(rest) = strip_label(line, "environment:") {
            environment.get_or_insert_with(|| rest.to_string());
        }
    }

    ImageAnalysis {
        description: text.trim().to_string(),
        estimated_height,
        estimated_weight,
        environment,
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let prefix = line.get(..label.len())?;
    if prefix.eq_ignore_ascii_case(label) {
        let rest = line[label.len()..].trim();
        (!rest.is_empty()).then_some(rest)
    } else {
        None
    }
}

/// Parse a JSON document out of model output, tolerating ```json fences.
pub(crate) fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, NarratorError> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| NarratorError::Parse(e.to_string()))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}
