//! Narration of coaching messages: synthesis, per-session file tracking and file cleanup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::shared::config;
use crate::shared::entities::VoiceConfig;
use crate::shared::error::ai::SynthesisError;
use crate::shared::error::PersistenceError;
use crate::shared::ports::ai::TtsPort;
use crate::shared::ports::CoachingSessionPort;
use crate::shared::utils::ceil_millis;

pub const AUDIO_FORMAT: &str = "mp3";
const FILE_PREFIX: &str = "tts_";
const FILE_SUFFIX: &str = ".mp3";
const WORDS_PER_MINUTE: f64 = 125.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechResult {
    /// Relative URL under the audio prefix, e.g. `/audio/tts_<session>_<ts>.mp3`.
    pub audio_url: String,
    pub audio_file_path: PathBuf,
    /// Estimated seconds.
    pub duration: u32,
    pub file_size: u64,
    pub format: &'static str,
    pub processing_time: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsCleanupReport {
    pub files_cleaned_up: usize,
    pub sessions_marked: usize,
}

/// The expired-session lookup failed. The directory sweep still ran and its
/// count is in `partial`.
#[derive(Debug, Error)]
#[error("expired session lookup failed: {source}")]
pub struct TtsCleanupError {
    pub partial: TtsCleanupReport,
    pub source: PersistenceError,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechInfo {
    pub provider: &'static str,
    pub voice_config: VoiceConfig,
    pub format: &'static str,
    pub active_sessions: usize,
    pub tracked_files: usize,
}

pub struct SpeechSynthesizer {
    tts: Arc<dyn TtsPort>,
    audio_dir: PathBuf,
    url_prefix: String,
    voice: VoiceConfig,
    file_ttl: Duration,
    session_files: Mutex<HashMap<String, Vec<PathBuf>>>,
    seq: AtomicU64,
}

impl SpeechSynthesizer {
    pub fn new(
        tts: Arc<dyn TtsPort>,
        audio_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        voice: VoiceConfig,
        file_ttl: Duration,
    ) -> Self {
        Self {
            tts,
            audio_dir: audio_dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            voice,
            file_ttl,
            session_files: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn from_env(tts: Arc<dyn TtsPort>) -> Self {
        let storage = config::storage_config();
        let ai = config::ai_config();
        Self::new(
            tts,
            storage.audio_dir.clone(),
            storage.audio_url_prefix.clone(),
            VoiceConfig::new(ai.tts_language_code.clone(), ai.tts_voice_name.clone()),
            storage.tts_file_ttl,
        )
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn voice(&self) -> &VoiceConfig {
        &self.voice
    }

    pub fn file_ttl(&self) -> Duration {
        self.file_ttl
    }

    pub async fn generate_speech(
        &self,
        text: &str,
        session_id: &str,
    ) -> Result<SpeechResult, SynthesisError> {
        let started = Instant::now();
        let audio = self
            .tts
            .synthesize(text.to_string(), self.voice.clone())
            .await?;
        if audio.is_empty() {
            return Err(SynthesisError::NoAudioContent);
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let file_name = self.next_file_name(session_id);
        let path = self.audio_dir.join(&file_name);
        tokio::fs::write(&path, &audio).await?;

        self.session_files
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(path.clone());

        let result = SpeechResult {
            audio_url: format!("{}/{}", self.url_prefix, file_name),
            audio_file_path: path,
            duration: estimate_duration_secs(text),
            file_size: audio.len() as u64,
            format: AUDIO_FORMAT,
            processing_time: ceil_millis(started.elapsed()),
        };
        log::info!(
            "[tts] synthesized session={} provider={} bytes={} est_duration_sec={} elapsed_ms={}",
            session_id,
            self.tts.provider_name(),
            result.file_size,
            result.duration,
            result.processing_time
        );
        Ok(result)
    }

    /// Deletes every tracked file for the session and forgets it. Missing files are
    /// skipped, so repeated calls are harmless.
    pub async fn cleanup_session_files(&self, session_id: &str) -> usize {
        let files = self.session_files.lock().await.remove(session_id);
        let Some(files) = files else {
            return 0;
        };
        let mut removed = 0;
        for path in files {
            if remove_if_exists(&path).await {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("[tts] cleaned {} file(s) for session={}", removed, session_id);
        }
        removed
    }

    /// One-shot deferred [`cleanup_session_files`](Self::cleanup_session_files).
    pub fn schedule_session_cleanup(self: &Arc<Self>, session_id: String, delay: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.cleanup_session_files(&session_id).await;
        })
    }

    /// Sweeps the audio directory for `tts_*.mp3` files older than `max_age`, whether
    /// or not they are still tracked.
    pub async fn cleanup_expired_files(&self, max_age: Duration) -> usize {
        let mut dir = match tokio::fs::read_dir(&self.audio_dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(err) => {
                log::warn!(
                    "[tts] cannot read audio dir {}: {}",
                    self.audio_dir.display(),
                    err
                );
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed_paths = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("[tts] audio dir scan aborted: {}", err);
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_tts_file_name(name) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let Ok(born) = meta.created().or_else(|_| meta.modified()) else {
                continue;
            };
            let age = now.duration_since(born).unwrap_or(Duration::ZERO);
            if age >= max_age && remove_if_exists(&entry.path()).await {
                removed_paths.push(entry.path());
            }
        }

        if !removed_paths.is_empty() {
            let mut tracked = self.session_files.lock().await;
            tracked.retain(|_, files| {
                files.retain(|path| !removed_paths.contains(path));
                !files.is_empty()
            });
            log::info!("[tts] swept {} expired file(s)", removed_paths.len());
        }
        removed_paths.len()
    }

    /// Reclaims files behind expired coaching sessions, flags those rows cleaned, then
    /// sweeps the directory for anything older than the file TTL. The sweep runs even
    /// when the store cannot be read.
    pub async fn cleanup_expired_sessions(
        &self,
        store: &dyn CoachingSessionPort,
    ) -> Result<TtsCleanupReport, TtsCleanupError> {
        let mut report = TtsCleanupReport::default();
        let lookup = match store.list_expired(Utc::now()).await {
            Ok(expired) => {
                for record in expired {
                    let mut removed = self.cleanup_session_files(&record.session_id).await;
                    if removed == 0 {
                        // untracked after a restart; fall back to the file named in the row
                        if let Some(path) =
                            record.audio_url.as_deref().and_then(|url| self.path_for_url(url))
                        {
                            if remove_if_exists(&path).await {
                                removed = 1;
                            }
                        }
                    }
                    report.files_cleaned_up += removed;
                    store.mark_cleaned(record.session_id.clone()).await;
                    report.sessions_marked += 1;
                }
                Ok(())
            }
            Err(err) => {
                log::warn!("[tts] expired session lookup failed, sweeping directory only: {}", err);
                Err(err)
            }
        };
        report.files_cleaned_up += self.cleanup_expired_files(self.file_ttl).await;
        if report.files_cleaned_up > 0 || report.sessions_marked > 0 {
            log::info!(
                "[tts] expired session cleanup files={} sessions={}",
                report.files_cleaned_up,
                report.sessions_marked
            );
        }
        lookup
            .map(|()| report)
            .map_err(|source| TtsCleanupError {
                partial: report,
                source,
            })
    }

    /// Maps a served URL back to a file in the audio directory. Only `tts_*.mp3`
    /// basenames resolve.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let name = url.rsplit('/').next()?;
        is_tts_file_name(name).then(|| self.audio_dir.join(name))
    }

    pub async fn info(&self) -> SpeechInfo {
        let tracked = self.session_files.lock().await;
        SpeechInfo {
            provider: self.tts.provider_name(),
            voice_config: self.voice.clone(),
            format: AUDIO_FORMAT,
            active_sessions: tracked.len(),
            tracked_files: tracked.values().map(Vec::len).sum(),
        }
    }

    fn next_file_name(&self, session_id: &str) -> String {
        let safe: String = session_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}{}_{}_{}{}",
            FILE_PREFIX,
            safe,
            Utc::now().timestamp_millis(),
            seq,
            FILE_SUFFIX
        )
    }
}

/// Seconds of speech at ~125 words per minute, never less than one.
pub fn estimate_duration_secs(text: &str) -> u32 {
    let words = text.split_whitespace().count() as f64;
    let secs = (words / WORDS_PER_MINUTE * 60.0).ceil() as u32;
    secs.max(1)
}

/// `tts_<anything>.mp3` with no path separators.
pub fn is_tts_file_name(name: &str) -> bool {
    name.starts_with(FILE_PREFIX)
        && name.ends_with(FILE_SUFFIX)
        && name.len() > FILE_PREFIX.len() + FILE_SUFFIX.len()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

async fn remove_if_exists(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
        Err(err) => {
            log::warn!("[tts] failed to delete {}: {}", path.display(), err);
            false
        }
    }
}
