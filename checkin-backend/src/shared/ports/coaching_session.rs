use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::shared::entities::{CoachingSessionRecord, NewCoachingSession};

use super::{InfallibleFuture, PersistenceFuture};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingSessionStats {
    pub total: u64,
    pub with_audio: u64,
    pub average_processing_time: f64,
    pub total_file_size: u64,
    pub average_duration: f64,
}

/// TTS session metadata. `expires_at` is always derived by the store from its own clock.
pub trait CoachingSessionPort: Send + Sync {
    fn create(&self, session: NewCoachingSession) -> PersistenceFuture<()>;
    fn get(&self, session_id: String) -> PersistenceFuture<Option<CoachingSessionRecord>>;
    /// Never fails; errors are logged by the adapter.
    fn mark_cleaned(&self, session_id: String) -> InfallibleFuture;
    /// Rows with `expires_at < now` whose file has not been cleaned yet.
    fn list_expired(&self, now: DateTime<Utc>) -> PersistenceFuture<Vec<CoachingSessionRecord>>;
    /// Deletes rows created more than `hours` ago, regardless of cleanup state.
    fn prune_older_than(&self, hours: u32) -> PersistenceFuture<u64>;
    fn stats(&self, window_hours: u32) -> PersistenceFuture<CoachingSessionStats>;
    fn health_check(&self) -> PersistenceFuture<()>;
    fn close(&self) -> PersistenceFuture<()>;
}
