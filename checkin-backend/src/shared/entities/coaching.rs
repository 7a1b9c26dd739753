use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachingMode {
    /// Local lookup tables only.
    Fast,
    /// LLM-personalized message on top of the fast template.
    Optimized,
}

impl CoachingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Optimized => "optimized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "optimized" => Some(Self::Optimized),
            _ => None,
        }
    }
}

impl fmt::Display for CoachingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathingExercise {
    pub title: String,
    pub instructions: Vec<String>,
    /// Minutes.
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StretchExercise {
    pub title: String,
    pub instructions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Counseling,
    Meditation,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub description: String,
    pub url: String,
    pub category: ResourceCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingResponse {
    pub breathing_exercise: BreathingExercise,
    pub stretch_exercise: StretchExercise,
    pub resources: Vec<Resource>,
    pub motivational_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    /// Estimated seconds of speech.
    pub duration: u32,
    pub file_size: u64,
    pub format: String,
    /// Milliseconds spent synthesizing.
    pub processing_time: u64,
}

/// Coaching content plus narration, present only when synthesis succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingResponseWithTts {
    #[serde(flatten)]
    pub coaching: CoachingResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_metadata: Option<AudioMetadata>,
}

impl CoachingResponseWithTts {
    pub fn without_audio(coaching: CoachingResponse) -> Self {
        Self {
            coaching,
            audio_url: None,
            audio_text: None,
            audio_metadata: None,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_rejects_unknown_values() {
        assert_eq!(CoachingMode::parse("Optimized"), Some(CoachingMode::Optimized));
        assert_eq!(CoachingMode::parse("fast"), Some(CoachingMode::Fast));
        assert_eq!(CoachingMode::parse("turbo"), None);
    }

    #[test]
    fn coaching_serializes_with_camel_case_keys() {
        let coaching = CoachingResponse {
            breathing_exercise: BreathingExercise {
                title: "t".to_string(),
                instructions: vec!["a".to_string()],
                duration: 3,
            },
            stretch_exercise: StretchExercise {
                title: "s".to_string(),
                instructions: vec![],
                image_url: None,
            },
            resources: vec![Resource {
                title: "r".to_string(),
                description: "d".to_string(),
                url: "https://example.com".to_string(),
                category: ResourceCategory::Meditation,
            }],
            motivational_message: "m".to_string(),
        };
        let value = serde_json::to_value(&coaching).expect("serialize");
        assert_eq!(value["breathingExercise"]["duration"], 3);
        assert!(value["stretchExercise"].get("imageUrl").is_none());
        assert_eq!(value["resources"][0]["category"], "meditation");
        assert_eq!(value["motivationalMessage"], "m");
    }
}
