//! One check-in, end to end: cache, transcription with fallback, sentiment log,
//! coaching and narration, response assembly, temp file removal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::service::cache::ContentAddressedCache;
use crate::service::coaching::{effective_mode, resolve_mode, resolve_tts_enabled, CoachingWithSpeech};
use crate::shared::config;
use crate::shared::entities::{
    AudioMetadata, CoachingMode, CoachingResponse, SentimentResult, SessionId, UnifiedResult,
};
use crate::shared::error::{CheckinError, UploadError};
use crate::shared::ports::ai::TranscriptionPort;
use crate::shared::ports::SentimentLogPort;
use crate::shared::utils::{ceil_millis, mask_pii};

/// Deployment-wide coaching defaults; request inputs override them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinDefaults {
    pub coaching_mode: Option<String>,
    pub tts_enabled: bool,
}

impl CheckinDefaults {
    pub fn from_env() -> Self {
        let coaching = config::coaching_config();
        Self {
            coaching_mode: coaching.default_mode.clone(),
            tts_enabled: coaching.tts_enabled,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckinRequest {
    /// Uploaded audio already spooled to a temp file. Deleted once the request ends.
    pub audio_path: Option<PathBuf>,
    pub mode_param: Option<String>,
    pub mode_header: Option<String>,
    pub tts_param: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinData {
    pub transcript: String,
    pub sentiment: SentimentResult,
    pub coaching: CoachingResponse,
    pub coaching_mode: CoachingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_metadata: Option<AudioMetadata>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResponse {
    pub success: bool,
    pub data: CheckinData,
    /// Milliseconds from request start to response assembly.
    pub processing_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct CheckinOrchestrator {
    cache: Arc<ContentAddressedCache>,
    primary: Arc<dyn TranscriptionPort>,
    fallback: Arc<dyn TranscriptionPort>,
    sentiment_log: Arc<dyn SentimentLogPort>,
    coaching: Arc<CoachingWithSpeech>,
    defaults: CheckinDefaults,
}

impl CheckinOrchestrator {
    pub fn new(
        cache: Arc<ContentAddressedCache>,
        primary: Arc<dyn TranscriptionPort>,
        fallback: Arc<dyn TranscriptionPort>,
        sentiment_log: Arc<dyn SentimentLogPort>,
        coaching: Arc<CoachingWithSpeech>,
        defaults: CheckinDefaults,
    ) -> Self {
        Self {
            cache,
            primary,
            fallback,
            sentiment_log,
            coaching,
            defaults,
        }
    }

    /// Runs the pipeline on its own task so a panic anywhere inside becomes an
    /// internal error. The temp file is removed on every path.
    pub async fn process(self: &Arc<Self>, request: CheckinRequest) -> Result<CheckinResponse, CheckinError> {
        let started = Instant::now();
        let Some(audio_path) = request.audio_path.clone() else {
            log::info!("[checkin] rejected: no audio file");
            return Err(UploadError::MissingFile.into());
        };

        let this = Arc::clone(self);
        let path = audio_path.clone();
        let outcome = tokio::spawn(async move { this.run_pipeline(path, request, started).await }).await;
        remove_temp_file(&audio_path).await;

        match outcome {
            Ok(result) => result,
            Err(err) => {
                log::error!("[checkin] pipeline aborted: {}", err);
                Err(CheckinError::Internal(err.to_string()))
            }
        }
    }

    async fn run_pipeline(
        &self,
        audio_path: PathBuf,
        request: CheckinRequest,
        started: Instant,
    ) -> Result<CheckinResponse, CheckinError> {
        let unified = self.transcribe(&audio_path).await?;

        let session_id = SessionId::new();
        let session_key = session_id.to_string();
        let requested = resolve_mode(
            request.mode_param.as_deref(),
            request.mode_header.as_deref(),
            self.defaults.coaching_mode.as_deref(),
        );
        let mode = effective_mode(&unified.sentiment, requested);
        let tts_enabled = resolve_tts_enabled(request.tts_param.as_deref(), self.defaults.tts_enabled);
        log::info!(
            "[checkin] session={} label={} score={:.2} mode={} tts={}",
            session_key,
            unified.sentiment.label,
            unified.sentiment.score,
            mode,
            tts_enabled
        );

        let (logged, coached) = tokio::join!(
            self.sentiment_log.log(session_id, unified.sentiment),
            self.coaching.generate_coaching_with_tts(
                &unified.sentiment,
                &unified.transcript,
                &session_key,
                mode,
                tts_enabled,
            )
        );
        if let Err(err) = logged {
            log::warn!("[checkin] sentiment log write failed session={}: {}", session_key, err);
        }

        let processing_time = ceil_millis(started.elapsed()).max(1);
        log::info!(
            "[checkin] done session={} transcript={} audio={} elapsed_ms={}",
            session_key,
            mask_pii(&unified.transcript),
            coached.has_audio(),
            processing_time
        );
        Ok(CheckinResponse {
            success: true,
            data: CheckinData {
                transcript: unified.transcript,
                sentiment: unified.sentiment,
                coaching: coached.coaching,
                coaching_mode: mode,
                audio_url: coached.audio_url,
                audio_text: coached.audio_text,
                audio_metadata: coached.audio_metadata,
                session_id: session_key,
            },
            processing_time,
            error: None,
        })
    }

    /// Cache, then primary provider, then fallback. Only primary results are cached.
    async fn transcribe(&self, audio_path: &Path) -> Result<UnifiedResult, CheckinError> {
        if let Some(hit) = self.cache.get(audio_path).await {
            return Ok(hit);
        }

        match self.primary.transcribe_with_sentiment(audio_path.to_path_buf()).await {
            Ok(result) => {
                self.cache.set(audio_path, &result).await;
                Ok(result)
            }
            Err(primary_err) => {
                log::warn!(
                    "[checkin] primary provider {} failed, using fallback: {}",
                    self.primary.info().provider,
                    primary_err
                );
                self.fallback
                    .transcribe_with_sentiment(audio_path.to_path_buf())
                    .await
                    .map_err(|fallback_err| {
                        log::error!("[checkin] fallback provider failed: {}", fallback_err);
                        CheckinError::Internal(format!(
                            "transcription unavailable: {}",
                            fallback_err
                        ))
                    })
            }
        }
    }
}

async fn remove_temp_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("[checkin] removed temp file {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("[checkin] temp file {} not removed: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::entities::{BreathingExercise, SentimentLabel, StretchExercise};

    #[test]
    fn response_serializes_in_client_shape() {
        let response = CheckinResponse {
            success: true,
            data: CheckinData {
                transcript: "ok".to_string(),
                sentiment: SentimentResult {
                    score: 0.5,
                    label: SentimentLabel::Neutral,
                    confidence: 0.5,
                },
                coaching: CoachingResponse {
                    breathing_exercise: BreathingExercise {
                        title: "b".to_string(),
                        instructions: vec![],
                        duration: 3,
                    },
                    stretch_exercise: StretchExercise {
                        title: "s".to_string(),
                        instructions: vec![],
                        image_url: None,
                    },
                    resources: vec![],
                    motivational_message: "m".to_string(),
                },
                coaching_mode: CoachingMode::Fast,
                audio_url: None,
                audio_text: None,
                audio_metadata: None,
                session_id: "abc".to_string(),
            },
            processing_time: 12,
            error: None,
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["success"], true);
        assert_eq!(value["processingTime"], 12);
        assert_eq!(value["data"]["sessionId"], "abc");
        assert_eq!(value["data"]["coachingMode"], "fast");
        assert_eq!(value["data"]["sentiment"]["label"], "neutral");
        assert_eq!(value["data"]["coaching"]["motivationalMessage"], "m");
        assert!(value["data"].get("audioUrl").is_none());
        assert!(value.get("error").is_none());
    }
}
