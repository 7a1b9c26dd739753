use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AudioMetadata, SentimentLabel, SessionId, VoiceConfig};

/// One anonymized row of the sentiment log. No audio, transcript or device data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentLogRecord {
    pub session_id: SessionId,
    pub score: f64,
    pub label: SentimentLabel,
    pub created_at: DateTime<Utc>,
}

/// Input for a coaching session row. Timestamps and the cleanup flag are owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCoachingSession {
    pub session_id: String,
    pub tts_text: String,
    pub audio_url: Option<String>,
    pub audio_metadata: Option<AudioMetadata>,
    pub voice_config: Option<VoiceConfig>,
    pub processing_time_ms: Option<u64>,
    pub file_size: Option<u64>,
    pub duration_sec: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingSessionRecord {
    pub session_id: String,
    pub tts_text: String,
    pub audio_url: Option<String>,
    pub audio_metadata: Option<AudioMetadata>,
    pub voice_config: Option<VoiceConfig>,
    pub processing_time_ms: Option<u64>,
    pub file_size: Option<u64>,
    pub duration_sec: Option<u32>,
    /// Flips once the backing audio file has been deleted.
    pub cleanup: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CoachingSessionRecord {
    pub fn from_new(session: NewCoachingSession, created_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            session_id: session.session_id,
            tts_text: session.tts_text,
            audio_url: session.audio_url,
            audio_metadata: session.audio_metadata,
            voice_config: session.voice_config,
            processing_time_ms: session.processing_time_ms,
            file_size: session.file_size,
            duration_sec: session.duration_sec,
            cleanup: false,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired_uncleaned(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now && !self.cleanup
    }
}
