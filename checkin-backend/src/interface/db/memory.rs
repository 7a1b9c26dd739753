use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::shared::entities::{
    CoachingSessionRecord, NewCoachingSession, SentimentLabel, SentimentLogRecord,
    SentimentResult, SessionId,
};
use crate::shared::ports::{
    CoachingSessionPort, CoachingSessionStats, InfallibleFuture, PersistenceFuture,
    SentimentLogPort, SentimentStats,
};

#[derive(Default)]
struct Tables {
    sentiment_logs: Vec<SentimentLogRecord>,
    coaching_sessions: HashMap<String, CoachingSessionRecord>,
}

/// Process-local stand-in for both tables, used when no `DATABASE_URL` is configured
/// and in tests. Contents are lost on restart.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    session_ttl: chrono::Duration,
}

impl InMemoryStore {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            session_ttl: chrono::Duration::from_std(session_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    /// Inserts a sentiment row with an explicit timestamp.
    pub async fn log_at(&self, session_id: SessionId, sentiment: SentimentResult, created_at: DateTime<Utc>) {
        self.tables.lock().await.sentiment_logs.push(SentimentLogRecord {
            session_id,
            score: sentiment.score,
            label: sentiment.label,
            created_at,
        });
    }

    /// Inserts a coaching session as if it had been created at `created_at`.
    pub async fn create_at(&self, session: NewCoachingSession, created_at: DateTime<Utc>) {
        let record = CoachingSessionRecord::from_new(session, created_at, self.session_ttl);
        self.tables
            .lock()
            .await
            .coaching_sessions
            .insert(record.session_id.clone(), record);
    }

    pub async fn sentiment_logs(&self) -> Vec<SentimentLogRecord> {
        self.tables.lock().await.sentiment_logs.clone()
    }

    pub async fn coaching_session_count(&self) -> usize {
        self.tables.lock().await.coaching_sessions.len()
    }
}

impl SentimentLogPort for InMemoryStore {
    fn log(&self, session_id: SessionId, sentiment: SentimentResult) -> PersistenceFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            this.log_at(session_id, sentiment, Utc::now()).await;
            Ok(())
        })
    }

    fn stats(&self, window_hours: u32) -> PersistenceFuture<SentimentStats> {
        let this = self.clone();
        Box::pin(async move {
            let since = Utc::now() - chrono::Duration::hours(i64::from(window_hours));
            let tables = this.tables.lock().await;
            let mut stats = SentimentStats::default();
            let mut score_sum = 0.0;
            for row in tables.sentiment_logs.iter().filter(|row| row.created_at >= since) {
                stats.total += 1;
                score_sum += row.score;
                match row.label {
                    SentimentLabel::Positive => stats.positive += 1,
                    SentimentLabel::Negative => stats.negative += 1,
                    SentimentLabel::Neutral => stats.neutral += 1,
                }
            }
            if stats.total > 0 {
                stats.average_score = score_sum / stats.total as f64;
            }
            Ok(stats)
        })
    }

    fn prune_older_than(&self, days: u32) -> PersistenceFuture<u64> {
        let this = self.clone();
        Box::pin(async move {
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
            let mut tables = this.tables.lock().await;
            let before = tables.sentiment_logs.len();
            tables.sentiment_logs.retain(|row| row.created_at >= cutoff);
            Ok((before - tables.sentiment_logs.len()) as u64)
        })
    }

    fn health_check(&self) -> PersistenceFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> PersistenceFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

impl CoachingSessionPort for InMemoryStore {
    fn create(&self, session: NewCoachingSession) -> PersistenceFuture<()> {
        let this = self.clone();
        Box::pin(async move {
            this.create_at(session, Utc::now()).await;
            Ok(())
        })
    }

    fn get(&self, session_id: String) -> PersistenceFuture<Option<CoachingSessionRecord>> {
        let this = self.clone();
        Box::pin(async move {
            Ok(this
                .tables
                .lock()
                .await
                .coaching_sessions
                .get(&session_id)
                .cloned())
        })
    }

    fn mark_cleaned(&self, session_id: String) -> InfallibleFuture {
        let this = self.clone();
        Box::pin(async move {
            let mut tables = this.tables.lock().await;
            match tables.coaching_sessions.get_mut(&session_id) {
                Some(row) => row.cleanup = true,
                None => log::debug!("[db] mark_cleaned: no session {}", session_id),
            }
        })
    }

    fn list_expired(&self, now: DateTime<Utc>) -> PersistenceFuture<Vec<CoachingSessionRecord>> {
        let this = self.clone();
        Box::pin(async move {
            let tables = this.tables.lock().await;
            let mut rows: Vec<CoachingSessionRecord> = tables
                .coaching_sessions
                .values()
                .filter(|row| row.is_expired_uncleaned(now))
                .cloned()
                .collect();
            rows.sort_by_key(|row| row.expires_at);
            Ok(rows)
        })
    }

    fn prune_older_than(&self, hours: u32) -> PersistenceFuture<u64> {
        let this = self.clone();
        Box::pin(async move {
            let cutoff = Utc::now() - chrono::Duration::hours(i64::from(hours));
            let mut tables = this.tables.lock().await;
            let before = tables.coaching_sessions.len();
            tables.coaching_sessions.retain(|_, row| row.created_at >= cutoff);
            Ok((before - tables.coaching_sessions.len()) as u64)
        })
    }

    fn stats(&self, window_hours: u32) -> PersistenceFuture<CoachingSessionStats> {
        let this = self.clone();
        Box::pin(async move {
            let since = Utc::now() - chrono::Duration::hours(i64::from(window_hours));
            let tables = this.tables.lock().await;
            let rows: Vec<&CoachingSessionRecord> = tables
                .coaching_sessions
                .values()
                .filter(|row| row.created_at >= since)
                .collect();
            Ok(coaching_stats(&rows))
        })
    }

    fn health_check(&self) -> PersistenceFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> PersistenceFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

/// Averages skip rows where the column is absent, like SQL `AVG`.
fn coaching_stats(rows: &[&CoachingSessionRecord]) -> CoachingSessionStats {
    let mean = |values: Vec<f64>| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    CoachingSessionStats {
        total: rows.len() as u64,
        with_audio: rows.iter().filter(|row| row.audio_url.is_some()).count() as u64,
        average_processing_time: mean(
            rows.iter()
                .filter_map(|row| row.processing_time_ms)
                .map(|v| v as f64)
                .collect(),
        ),
        total_file_size: rows.iter().filter_map(|row| row.file_size).sum(),
        average_duration: mean(
            rows.iter()
                .filter_map(|row| row.duration_sec)
                .map(f64::from)
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(id: &str, audio: bool) -> NewCoachingSession {
        NewCoachingSession {
            session_id: id.to_string(),
            tts_text: "Keep going.".to_string(),
            audio_url: audio.then(|| format!("/audio/tts_{}_1_0.mp3", id)),
            audio_metadata: None,
            voice_config: None,
            processing_time_ms: audio.then_some(120),
            file_size: audio.then_some(2048),
            duration_sec: audio.then_some(2),
        }
    }

    fn sentiment(score: f64, label: SentimentLabel) -> SentimentResult {
        SentimentResult {
            score,
            label,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn sentiment_stats_and_retention() {
        let store = InMemoryStore::new(Duration::from_secs(3600));
        let now = Utc::now();
        store
            .log(SessionId::new(), sentiment(0.8, SentimentLabel::Positive))
            .await
            .expect("log");
        store
            .log_at(SessionId::new(), sentiment(0.2, SentimentLabel::Negative), now - chrono::Duration::hours(2))
            .await;
        store
            .log_at(SessionId::new(), sentiment(0.5, SentimentLabel::Neutral), now - chrono::Duration::days(40))
            .await;

        let last_hour = SentimentLogPort::stats(&store, 1).await.expect("stats");
        assert_eq!(last_hour.total, 1);
        assert_eq!(last_hour.positive, 1);

        let day = SentimentLogPort::stats(&store, 24).await.expect("stats");
        assert_eq!(day.total, 2);
        assert_eq!(day.negative, 1);
        assert!((day.average_score - 0.5).abs() < 1e-9);

        assert_eq!(SentimentLogPort::prune_older_than(&store, 30).await.expect("prune"), 1);
        assert_eq!(store.sentiment_logs().await.len(), 2);
    }

    #[tokio::test]
    async fn created_sessions_expire_after_ttl_server_side() {
        let store = InMemoryStore::new(Duration::from_secs(3600));
        store.create(new_session("s1", true)).await.expect("create");
        let row = store.get("s1".to_string()).await.expect("get").expect("row");
        assert_eq!(row.expires_at - row.created_at, chrono::Duration::hours(1));
        assert!(!row.cleanup);
        assert!(store.get("missing".to_string()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn list_expired_excludes_cleaned_and_live_rows() {
        let store = InMemoryStore::new(Duration::from_secs(3600));
        let now = Utc::now();
        store.create_at(new_session("old", true), now - chrono::Duration::hours(2)).await;
        store.create_at(new_session("cleaned", true), now - chrono::Duration::hours(3)).await;
        store.create(new_session("live", true)).await.expect("create");
        store.mark_cleaned("cleaned".to_string()).await;
        store.mark_cleaned("unknown".to_string()).await;

        let expired = store.list_expired(Utc::now()).await.expect("expired");
        let ids: Vec<&str> = expired.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["old"]);
    }

    #[tokio::test]
    async fn session_prune_ignores_cleanup_flag() {
        let store = InMemoryStore::new(Duration::from_secs(3600));
        let now = Utc::now();
        store.create_at(new_session("stale", true), now - chrono::Duration::hours(30)).await;
        store.create_at(new_session("recent", false), now - chrono::Duration::hours(2)).await;

        let pruned = CoachingSessionPort::prune_older_than(&store, 24).await.expect("prune");
        assert_eq!(pruned, 1);
        assert_eq!(store.coaching_session_count().await, 1);
    }

    #[tokio::test]
    async fn coaching_session_stats() {
        let store = InMemoryStore::new(Duration::from_secs(3600));
        store.create(new_session("a", true)).await.expect("create");
        store.create(new_session("b", true)).await.expect("create");
        store.create(new_session("c", false)).await.expect("create");

        let stats = CoachingSessionPort::stats(&store, 24).await.expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.with_audio, 2);
        assert_eq!(stats.total_file_size, 4096);
        assert!((stats.average_processing_time - 120.0).abs() < 1e-9);
        assert!((stats.average_duration - 2.0).abs() < 1e-9);
    }
}
