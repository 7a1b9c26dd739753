use serde::Deserialize;

use crate::shared::entities::{SentimentLabel, SentimentResult};
use crate::shared::utils::round2;

/// One per-sentence sentiment entry as reported by the speech API.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SentenceSentiment {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Collapses per-sentence sentiment into one score/label/confidence triple.
///
/// Confidence is summed per class and divided by the total to get ratios. The label is
/// the class with the strictly greatest ratio; ties resolve to neutral. Scores land in
/// `[0.5, 1.0]` for positive, `[0.0, 0.5]` for negative and `[0.4, 0.6]` for neutral.
/// Entries with an unrecognized class still count towards the total. No entries, or
/// entries whose confidences sum to zero, yield [`SentimentResult::neutral_default`].
pub fn aggregate_sentiment(entries: &[SentenceSentiment]) -> SentimentResult {
    if entries.is_empty() {
        return SentimentResult::neutral_default();
    }

    let mut positive = 0.0;
    let mut negative = 0.0;
    let mut neutral = 0.0;
    let mut total = 0.0;
    for entry in entries {
        let confidence = entry.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
        match entry.sentiment.as_deref().and_then(SentimentLabel::parse) {
            Some(SentimentLabel::Positive) => positive += confidence,
            Some(SentimentLabel::Negative) => negative += confidence,
            Some(SentimentLabel::Neutral) => neutral += confidence,
            None => {}
        }
        total += confidence;
    }
    if total <= 0.0 {
        return SentimentResult::neutral_default();
    }

    let positive_ratio = positive / total;
    let negative_ratio = negative / total;
    let neutral_ratio = neutral / total;

    let (label, score) = if positive_ratio > negative_ratio && positive_ratio > neutral_ratio {
        (SentimentLabel::Positive, 0.5 + positive_ratio * 0.5)
    } else if negative_ratio > positive_ratio && negative_ratio > neutral_ratio {
        (SentimentLabel::Negative, 0.5 - negative_ratio * 0.5)
    } else {
        (SentimentLabel::Neutral, 0.4 + neutral_ratio * 0.2)
    };

    SentimentResult {
        score: round2(score.clamp(0.0, 1.0)),
        label,
        confidence: round2(total / entries.len() as f64),
    }
}
