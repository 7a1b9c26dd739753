use std::fmt;

use serde::{Deserialize, Serialize};

/// Scores strictly below this, with a negative label, are treated as a crisis.
pub const CRISIS_SCORE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    /// Case-insensitive, so vendor spellings like `POSITIVE` parse too.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub score: f64,
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl SentimentResult {
    /// Returned when the upstream reported no per-sentence sentiment at all.
    pub fn neutral_default() -> Self {
        Self {
            score: 0.5,
            label: SentimentLabel::Neutral,
            confidence: 0.5,
        }
    }

    pub fn is_crisis(&self) -> bool {
        self.score < CRISIS_SCORE_THRESHOLD && self.label == SentimentLabel::Negative
    }
}

/// The cacheable unit: transcript, sentiment and how long it took to obtain them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedResult {
    pub transcript: String,
    pub confidence: f64,
    pub sentiment: SentimentResult,
    pub processing_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_requires_low_score_and_negative_label() {
        let crisis = SentimentResult {
            score: 0.1,
            label: SentimentLabel::Negative,
            confidence: 0.9,
        };
        assert!(crisis.is_crisis());

        let boundary = SentimentResult {
            score: 0.2,
            ..crisis
        };
        assert!(!boundary.is_crisis());

        let neutral_low = SentimentResult {
            label: SentimentLabel::Neutral,
            ..crisis
        };
        assert!(!neutral_low.is_crisis());
    }

    #[test]
    fn label_parsing_is_case_insensitive() {
        assert_eq!(SentimentLabel::parse("POSITIVE"), Some(SentimentLabel::Positive));
        assert_eq!(SentimentLabel::parse(" negative "), Some(SentimentLabel::Negative));
        assert_eq!(SentimentLabel::parse("mixed"), None);
    }

    #[test]
    fn unified_result_serializes_camel_case() {
        let result = UnifiedResult {
            transcript: "ok".to_string(),
            confidence: 0.8,
            sentiment: SentimentResult::neutral_default(),
            processing_time: 12,
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["processingTime"], 12);
        assert_eq!(value["sentiment"]["label"], "neutral");
    }
}
