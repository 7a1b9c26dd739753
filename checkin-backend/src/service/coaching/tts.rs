use std::sync::Arc;
use std::time::Duration;

use crate::service::speech::SpeechSynthesizer;
use crate::shared::entities::{
    AudioMetadata, CoachingMode, CoachingResponseWithTts, NewCoachingSession, SentimentResult,
};
use crate::shared::ports::CoachingSessionPort;

use super::CoachingEngine;

/// Coaching plus narration of the motivational message. Speech is optional: any
/// synthesis failure yields the same coaching without audio fields.
pub struct CoachingWithSpeech {
    engine: Arc<CoachingEngine>,
    speech: Arc<SpeechSynthesizer>,
    sessions: Arc<dyn CoachingSessionPort>,
    file_ttl: Duration,
}

impl CoachingWithSpeech {
    pub fn new(
        engine: Arc<CoachingEngine>,
        speech: Arc<SpeechSynthesizer>,
        sessions: Arc<dyn CoachingSessionPort>,
    ) -> Self {
        let file_ttl = speech.file_ttl();
        Self {
            engine,
            speech,
            sessions,
            file_ttl,
        }
    }

    pub fn engine(&self) -> &Arc<CoachingEngine> {
        &self.engine
    }

    pub fn speech(&self) -> &Arc<SpeechSynthesizer> {
        &self.speech
    }

    pub async fn generate_coaching_with_tts(
        &self,
        sentiment: &SentimentResult,
        transcript: &str,
        session_id: &str,
        mode: CoachingMode,
        enable_tts: bool,
    ) -> CoachingResponseWithTts {
        let coaching = self
            .engine
            .generate_coaching(sentiment, transcript, mode)
            .await;
        if !enable_tts {
            return CoachingResponseWithTts::without_audio(coaching);
        }

        let text = coaching.motivational_message.clone();
        let speech = match self.speech.generate_speech(&text, session_id).await {
            Ok(speech) => speech,
            Err(err) => {
                log::warn!(
                    "[tts] synthesis failed session={}, responding without audio: {}",
                    session_id,
                    err
                );
                return CoachingResponseWithTts::without_audio(coaching);
            }
        };

        let metadata = AudioMetadata {
            duration: speech.duration,
            file_size: speech.file_size,
            format: speech.format.to_string(),
            processing_time: speech.processing_time,
        };
        let record = NewCoachingSession {
            session_id: session_id.to_string(),
            tts_text: text.clone(),
            audio_url: Some(speech.audio_url.clone()),
            audio_metadata: Some(metadata.clone()),
            voice_config: Some(self.speech.voice().clone()),
            processing_time_ms: Some(speech.processing_time),
            file_size: Some(speech.file_size),
            duration_sec: Some(speech.duration),
        };
        if let Err(err) = self.sessions.create(record).await {
            log::warn!(
                "[coaching] session record not stored session={}: {}",
                session_id,
                err
            );
        }
        self.speech
            .schedule_session_cleanup(session_id.to_string(), self.file_ttl);

        CoachingResponseWithTts {
            coaching,
            audio_url: Some(speech.audio_url),
            audio_text: Some(text),
            audio_metadata: Some(metadata),
        }
    }
}
