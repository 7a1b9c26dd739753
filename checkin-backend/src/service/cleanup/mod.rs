use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::service::cache::ContentAddressedCache;
use crate::service::speech::{SpeechSynthesizer, TtsCleanupReport};
use crate::shared::config;
use crate::shared::error::PersistenceError;
use crate::shared::ports::{CoachingSessionPort, SentimentLogPort};
use crate::shared::utils::ceil_millis;

#[derive(Debug, Error)]
pub enum CleanupStepError {
    #[error("tts session cleanup failed: {0}")]
    TtsSessions(PersistenceError),
    #[error("sentiment log prune failed: {0}")]
    SentimentPrune(PersistenceError),
    #[error("coaching session prune failed: {0}")]
    SessionPrune(PersistenceError),
}

/// A pass where at least one step failed. Every other step still ran; `report`
/// holds what they did.
#[derive(Debug, Error)]
#[error("cleanup pass had {} failed step(s): {}", .failures.len(), describe(.failures))]
pub struct CleanupError {
    pub report: CleanupReport,
    pub failures: Vec<CleanupStepError>,
}

fn describe(failures: &[CleanupStepError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSettings {
    pub interval: Duration,
    pub sentiment_retention_days: u32,
    pub coaching_session_retention_hours: u32,
}

impl CleanupSettings {
    pub fn from_env() -> Self {
        let retention = config::retention_config();
        Self {
            interval: config::cleanup_config().interval,
            sentiment_retention_days: retention.sentiment_retention_days,
            coaching_session_retention_hours: retention.coaching_session_retention_hours,
        }
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            sentiment_retention_days: 30,
            coaching_session_retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub tts: TtsCleanupReport,
    pub sentiment_rows_pruned: u64,
    pub coaching_rows_pruned: u64,
    pub cache_entries_pruned: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupStatus {
    pub is_running: bool,
    pub interval_minutes: u64,
    pub next_run_time: Option<DateTime<Utc>>,
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic reclamation of TTS files and retention pruning of both stores.
///
/// `stopped -> running` on [`start`](Self::start), back on [`stop`](Self::stop) or
/// [`shutdown`](Self::shutdown). A failing pass is logged; the next tick still runs.
pub struct CleanupScheduler {
    speech: Arc<SpeechSynthesizer>,
    sessions: Arc<dyn CoachingSessionPort>,
    sentiments: Arc<dyn SentimentLogPort>,
    cache: Arc<ContentAddressedCache>,
    settings: CleanupSettings,
    running: Mutex<Option<Running>>,
    next_run: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl CleanupScheduler {
    pub fn new(
        speech: Arc<SpeechSynthesizer>,
        sessions: Arc<dyn CoachingSessionPort>,
        sentiments: Arc<dyn SentimentLogPort>,
        cache: Arc<ContentAddressedCache>,
        settings: CleanupSettings,
    ) -> Self {
        Self {
            speech,
            sessions,
            sentiments,
            cache,
            settings,
            running: Mutex::new(None),
            next_run: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs one pass right away, then every interval. No-op while already running.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            log::debug!("[cleanup] scheduler already running");
            return;
        }

        let period = self.settings.interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        *this.next_run.lock().await = chrono::Duration::from_std(period)
                            .ok()
                            .map(|step| Utc::now() + step);
                        match this.run_pass().await {
                            Ok(report) => log_report("scheduled", &report),
                            Err(err) => {
                                log::warn!("[cleanup] scheduled pass failed: {}", err);
                                log_report("scheduled (partial)", &err.report);
                            }
                        }
                    }
                }
            }
        });
        *running = Some(Running { stop_tx, handle });
        log::info!(
            "[cleanup] scheduler started interval_min={}",
            self.interval_minutes()
        );
    }

    /// Stops the timer and waits for an in-flight pass to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        let _ = running.stop_tx.send(());
        if let Err(err) = running.handle.await {
            log::warn!("[cleanup] scheduler task ended abnormally: {}", err);
        }
        *self.next_run.lock().await = None;
        log::info!("[cleanup] scheduler stopped");
    }

    /// Stop, one last pass, then release store connections.
    pub async fn shutdown(&self) {
        log::info!("[cleanup] shutting down");
        self.stop().await;
        match self.run_pass().await {
            Ok(report) => log_report("final", &report),
            Err(err) => {
                log::warn!("[cleanup] final pass failed: {}", err);
                log_report("final (partial)", &err.report);
            }
        }
        if let Err(err) = self.sentiments.close().await {
            log::warn!("[cleanup] closing sentiment store failed: {}", err);
        }
        if let Err(err) = self.sessions.close().await {
            log::warn!("[cleanup] closing coaching session store failed: {}", err);
        }
        log::info!("[cleanup] shutdown complete");
    }

    pub async fn status(&self) -> CleanupStatus {
        let is_running = self.running.lock().await.is_some();
        CleanupStatus {
            is_running,
            interval_minutes: self.interval_minutes(),
            next_run_time: if is_running {
                *self.next_run.lock().await
            } else {
                None
            },
        }
    }

    /// On-demand pass. Unlike the timer, failures are returned to the caller along
    /// with the partial report.
    pub async fn run_manual_cleanup(&self) -> Result<CleanupReport, CleanupError> {
        log::info!("[cleanup] manual pass requested");
        let report = self.run_pass().await?;
        log_report("manual", &report);
        Ok(report)
    }

    /// Every step runs regardless of earlier failures.
    async fn run_pass(&self) -> Result<CleanupReport, CleanupError> {
        let started = Instant::now();
        let mut failures = Vec::new();

        let tts = match self.speech.cleanup_expired_sessions(self.sessions.as_ref()).await {
            Ok(report) => report,
            Err(err) => {
                failures.push(CleanupStepError::TtsSessions(err.source));
                err.partial
            }
        };
        let sentiment_rows_pruned = match self
            .sentiments
            .prune_older_than(self.settings.sentiment_retention_days)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                failures.push(CleanupStepError::SentimentPrune(err));
                0
            }
        };
        let coaching_rows_pruned = match self
            .sessions
            .prune_older_than(self.settings.coaching_session_retention_hours)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                failures.push(CleanupStepError::SessionPrune(err));
                0
            }
        };
        let cache_entries_pruned = self.cache.prune_expired().await;

        let report = CleanupReport {
            tts,
            sentiment_rows_pruned,
            coaching_rows_pruned,
            cache_entries_pruned,
            elapsed_ms: ceil_millis(started.elapsed()),
        };
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(CleanupError { report, failures })
        }
    }

    fn interval_minutes(&self) -> u64 {
        self.settings.interval.as_secs() / 60
    }
}

fn log_report(kind: &str, report: &CleanupReport) {
    log::info!(
        "[cleanup] {} pass files={} sessions_marked={} sentiment_pruned={} coaching_pruned={} cache_pruned={} elapsed_ms={}",
        kind,
        report.tts.files_cleaned_up,
        report.tts.sessions_marked,
        report.sentiment_rows_pruned,
        report.coaching_rows_pruned,
        report.cache_entries_pruned,
        report.elapsed_ms
    );
}
