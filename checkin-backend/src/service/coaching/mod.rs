use std::sync::Arc;

use serde::Deserialize;

use crate::shared::entities::{CoachingMode, CoachingResponse, SentimentResult};
use crate::shared::error::ai::LlmError;
use crate::shared::ports::ai::{ChatMessage, CompletionRequest, LlmPort};
use crate::shared::utils::truncate_chars;

pub mod resources;
pub mod templates;
pub mod tts;

pub use resources::{motivational_message, select_resources};
pub use templates::{template_for, ExerciseTemplate};
pub use tts::CoachingWithSpeech;

const PROMPT_TRANSCRIPT_CHARS: usize = 150;
const LLM_TEMPERATURE: f32 = 0.3;
const LLM_MAX_TOKENS: u32 = 200;
const SYSTEM_PROMPT: &str =
    "You are a warm, concise wellness coach for university students. Reply with one JSON object only.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoachingTips {
    #[serde(default)]
    motivational_message: Option<String>,
    #[serde(default)]
    breathing_tip: Option<String>,
    #[serde(default)]
    stretch_tip: Option<String>,
}

/// Produces coaching content for a sentiment result. Never fails: every error path
/// ends in the fast, table-driven response.
pub struct CoachingEngine {
    llm: Arc<dyn LlmPort>,
}

impl CoachingEngine {
    pub fn new(llm: Arc<dyn LlmPort>) -> Self {
        Self { llm }
    }

    pub async fn generate_coaching(
        &self,
        sentiment: &SentimentResult,
        transcript: &str,
        mode: CoachingMode,
    ) -> CoachingResponse {
        let effective = effective_mode(sentiment, mode);
        if effective != mode {
            log::info!(
                "[coaching] crisis detected (score={:.2}), forcing fast mode",
                sentiment.score
            );
        }
        match effective {
            CoachingMode::Fast => generate_fast_coaching(sentiment),
            CoachingMode::Optimized => self.generate_optimized_coaching(sentiment, transcript).await,
        }
    }

    /// LLM-personalized coaching on top of the fast template. Crisis input and any
    /// LLM or parse failure return the fast response unchanged.
    pub async fn generate_optimized_coaching(
        &self,
        sentiment: &SentimentResult,
        transcript: &str,
    ) -> CoachingResponse {
        let base = generate_fast_coaching(sentiment);
        if sentiment.is_crisis() {
            return base;
        }

        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(sentiment, transcript)),
            ],
            temperature: LLM_TEMPERATURE,
            max_tokens: LLM_MAX_TOKENS,
        };
        let tips = match self.llm.complete_json(request).await {
            Ok(raw) => parse_tips(&raw),
            Err(err) => Err(err),
        };
        match tips {
            Ok(tips) => merge_tips(base, tips),
            Err(err) => {
                log::warn!("[coaching] LLM coaching failed, using fast mode: {}", err);
                base
            }
        }
    }
}

/// Table lookup for exercises plus rule-based resources and message. Deterministic.
pub fn generate_fast_coaching(sentiment: &SentimentResult) -> CoachingResponse {
    let is_crisis = sentiment.is_crisis();
    let template = template_for(sentiment.label);
    CoachingResponse {
        breathing_exercise: template.breathing(),
        stretch_exercise: template.stretch(),
        resources: select_resources(sentiment.score, sentiment.label, is_crisis),
        motivational_message: motivational_message(sentiment.score, sentiment.label, is_crisis)
            .to_string(),
    }
}

/// Crisis input always runs in fast mode.
pub fn effective_mode(sentiment: &SentimentResult, requested: CoachingMode) -> CoachingMode {
    if sentiment.is_crisis() {
        CoachingMode::Fast
    } else {
        requested
    }
}

/// Picks the coaching mode from query parameter, then header, then environment default.
/// Values other than `fast`/`optimized` are skipped; nothing valid means fast.
pub fn resolve_mode(
    query: Option<&str>,
    header: Option<&str>,
    env_default: Option<&str>,
) -> CoachingMode {
    [query, header, env_default]
        .into_iter()
        .flatten()
        .find_map(CoachingMode::parse)
        .unwrap_or(CoachingMode::Fast)
}

/// TTS runs unless the request says `tts=false` or the environment disabled it.
pub fn resolve_tts_enabled(query: Option<&str>, env_enabled: bool) -> bool {
    let disabled_by_request = query
        .map(|value| value.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(false);
    env_enabled && !disabled_by_request
}

pub fn build_prompt(sentiment: &SentimentResult, transcript: &str) -> String {
    format!(
        "Sentiment: {} ({:.2})\nText: \"{}\"\n\nReturn JSON only:\n{{\n  \"motivationalMessage\": \"English encouragement message (1 sentence)\",\n  \"breathingTip\": \"breathing method (1 line)\",\n  \"stretchTip\": \"stretching (1 line)\"\n}}",
        sentiment.label,
        sentiment.score,
        truncate_chars(transcript.trim(), PROMPT_TRANSCRIPT_CHARS)
    )
}

fn parse_tips(raw: &str) -> Result<CoachingTips, LlmError> {
    let trimmed = raw.trim();
    // some models wrap JSON in a markdown fence even in json mode
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(json.trim()).map_err(|e| LlmError::MalformedCompletion(e.to_string()))
}

fn merge_tips(mut base: CoachingResponse, tips: CoachingTips) -> CoachingResponse {
    if let Some(message) = non_empty(tips.motivational_message) {
        base.motivational_message = message;
    }
    if let Some(tip) = non_empty(tips.breathing_tip) {
        base.breathing_exercise.instructions = vec![tip];
    }
    if let Some(tip) = non_empty(tips.stretch_tip) {
        base.stretch_exercise.instructions = vec![tip];
    }
    base
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
