use serde::Serialize;

use crate::shared::entities::{SentimentResult, SessionId};

use super::PersistenceFuture;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentStats {
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
    pub average_score: f64,
}

/// Append-only anonymized sentiment log.
pub trait SentimentLogPort: Send + Sync {
    fn log(&self, session_id: SessionId, sentiment: SentimentResult) -> PersistenceFuture<()>;
    /// Aggregates rows created within the last `window_hours`.
    fn stats(&self, window_hours: u32) -> PersistenceFuture<SentimentStats>;
    /// Deletes rows older than `days`; returns how many went.
    fn prune_older_than(&self, days: u32) -> PersistenceFuture<u64>;
    fn health_check(&self) -> PersistenceFuture<()>;
    fn close(&self) -> PersistenceFuture<()>;
}
