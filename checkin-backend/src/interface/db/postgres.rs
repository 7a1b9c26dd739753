use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::shared::entities::{
    AudioMetadata, CoachingSessionRecord, NewCoachingSession, SentimentResult, SessionId,
    VoiceConfig,
};
use crate::shared::error::PersistenceError;
use crate::shared::ports::{
    CoachingSessionPort, CoachingSessionStats, InfallibleFuture, PersistenceFuture,
    SentimentLogPort, SentimentStats,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_CONNECTIONS: u32 = 5;

const SESSION_COLUMNS: &str = "session_id, tts_text, audio_url, audio_metadata, voice_config,
     processing_time_ms, file_size, duration_sec, cleanup, created_at, expires_at";

#[derive(Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
    session_ttl: Duration,
}

impl PostgresAdapter {
    pub async fn new(database_url: String, session_ttl: Duration) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&database_url)
            .await?;
        Ok(Self { pool, session_ttl })
    }

    async fn log_sentiment_inner(
        pool: &PgPool,
        session_id: Uuid,
        sentiment: SentimentResult,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO sentiment_logs (session_id, score, label)
             VALUES ($1, $2, $3)",
        )
        .bind(session_id)
        .bind(sentiment.score)
        .bind(sentiment.label.as_str())
        .execute(pool)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn sentiment_stats_inner(
        pool: &PgPool,
        window_hours: u32,
    ) -> Result<SentimentStats, PersistenceError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE label = 'positive') AS positive,
                    COUNT(*) FILTER (WHERE label = 'negative') AS negative,
                    COUNT(*) FILTER (WHERE label = 'neutral') AS neutral,
                    COALESCE(AVG(score), 0)::float8 AS average_score
             FROM sentiment_logs
             WHERE created_at >= NOW() - make_interval(hours => $1)",
        )
        .bind(to_i32(window_hours))
        .fetch_one(pool)
        .await
        .map_err(map_read_err)?;

        Ok(SentimentStats {
            total: count(&row, "total")?,
            positive: count(&row, "positive")?,
            negative: count(&row, "negative")?,
            neutral: count(&row, "neutral")?,
            average_score: row.try_get("average_score").map_err(map_read_err)?,
        })
    }

    async fn prune_sentiment_inner(pool: &PgPool, days: u32) -> Result<u64, PersistenceError> {
        let result = sqlx::query(
            "DELETE FROM sentiment_logs
             WHERE created_at < NOW() - make_interval(days => $1)",
        )
        .bind(to_i32(days))
        .execute(pool)
        .await
        .map_err(map_write_err)?;
        Ok(result.rows_affected())
    }

    async fn create_session_inner(
        pool: &PgPool,
        session: NewCoachingSession,
        ttl: Duration,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO coaching_sessions
                 (session_id, tts_text, audio_url, audio_metadata, voice_config,
                  processing_time_ms, file_size, duration_sec, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW() + ($9 * INTERVAL '1 second'))
             ON CONFLICT (session_id) DO UPDATE SET
                 tts_text = EXCLUDED.tts_text,
                 audio_url = EXCLUDED.audio_url,
                 audio_metadata = EXCLUDED.audio_metadata,
                 voice_config = EXCLUDED.voice_config,
                 processing_time_ms = EXCLUDED.processing_time_ms,
                 file_size = EXCLUDED.file_size,
                 duration_sec = EXCLUDED.duration_sec,
                 cleanup = FALSE,
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(session.session_id)
        .bind(session.tts_text)
        .bind(session.audio_url)
        .bind(session.audio_metadata.map(Json))
        .bind(session.voice_config.map(Json))
        .bind(session.processing_time_ms.map(to_i64))
        .bind(session.file_size.map(to_i64))
        .bind(session.duration_sec.map(|v| i32::try_from(v).unwrap_or(i32::MAX)))
        .bind(ttl.as_secs_f64())
        .execute(pool)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn get_session_inner(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Option<CoachingSessionRecord>, PersistenceError> {
        let sql = format!(
            "SELECT {} FROM coaching_sessions WHERE session_id = $1 LIMIT 1",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(pool)
            .await
            .map_err(map_read_err)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn mark_cleaned_inner(pool: &PgPool, session_id: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE coaching_sessions SET cleanup = TRUE
             WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(pool)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn list_expired_inner(
        pool: &PgPool,
        now: DateTime<Utc>,
    ) -> Result<Vec<CoachingSessionRecord>, PersistenceError> {
        let sql = format!(
            "SELECT {} FROM coaching_sessions
             WHERE expires_at < $1 AND cleanup = FALSE
             ORDER BY expires_at ASC",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .fetch_all(pool)
            .await
            .map_err(map_read_err)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(session_from_row(row)?);
        }
        Ok(sessions)
    }

    async fn prune_sessions_inner(pool: &PgPool, hours: u32) -> Result<u64, PersistenceError> {
        let result = sqlx::query(
            "DELETE FROM coaching_sessions
             WHERE created_at < NOW() - make_interval(hours => $1)",
        )
        .bind(to_i32(hours))
        .execute(pool)
        .await
        .map_err(map_write_err)?;
        Ok(result.rows_affected())
    }

    async fn session_stats_inner(
        pool: &PgPool,
        window_hours: u32,
    ) -> Result<CoachingSessionStats, PersistenceError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(audio_url) AS with_audio,
                    COALESCE(AVG(processing_time_ms), 0)::float8 AS average_processing_time,
                    COALESCE(SUM(file_size), 0)::bigint AS total_file_size,
                    COALESCE(AVG(duration_sec), 0)::float8 AS average_duration
             FROM coaching_sessions
             WHERE created_at >= NOW() - make_interval(hours => $1)",
        )
        .bind(to_i32(window_hours))
        .fetch_one(pool)
        .await
        .map_err(map_read_err)?;

        Ok(CoachingSessionStats {
            total: count(&row, "total")?,
            with_audio: count(&row, "with_audio")?,
            average_processing_time: row
                .try_get("average_processing_time")
                .map_err(map_read_err)?,
            total_file_size: count(&row, "total_file_size")?,
            average_duration: row.try_get("average_duration").map_err(map_read_err)?,
        })
    }

    async fn health_check_inner(pool: &PgPool) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(map_connect_err)?;
        Ok(())
    }
}

impl SentimentLogPort for PostgresAdapter {
    fn log(&self, session_id: SessionId, sentiment: SentimentResult) -> PersistenceFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            PostgresAdapter::log_sentiment_inner(&pool, session_id.as_uuid(), sentiment).await
        })
    }

    fn stats(&self, window_hours: u32) -> PersistenceFuture<SentimentStats> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::sentiment_stats_inner(&pool, window_hours).await })
    }

    fn prune_older_than(&self, days: u32) -> PersistenceFuture<u64> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::prune_sentiment_inner(&pool, days).await })
    }

    fn health_check(&self) -> PersistenceFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::health_check_inner(&pool).await })
    }

    fn close(&self) -> PersistenceFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move {
            pool.close().await;
            log::info!("[db] connection pool closed");
            Ok(())
        })
    }
}

impl CoachingSessionPort for PostgresAdapter {
    fn create(&self, session: NewCoachingSession) -> PersistenceFuture<()> {
        let pool = self.pool.clone();
        let ttl = self.session_ttl;
        Box::pin(async move { PostgresAdapter::create_session_inner(&pool, session, ttl).await })
    }

    fn get(&self, session_id: String) -> PersistenceFuture<Option<CoachingSessionRecord>> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::get_session_inner(&pool, &session_id).await })
    }

    fn mark_cleaned(&self, session_id: String) -> InfallibleFuture {
        let pool = self.pool.clone();
        Box::pin(async move {
            if let Err(err) = PostgresAdapter::mark_cleaned_inner(&pool, &session_id).await {
                log::warn!("[db] mark_cleaned failed session={}: {}", session_id, err);
            }
        })
    }

    fn list_expired(&self, now: DateTime<Utc>) -> PersistenceFuture<Vec<CoachingSessionRecord>> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::list_expired_inner(&pool, now).await })
    }

    fn prune_older_than(&self, hours: u32) -> PersistenceFuture<u64> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::prune_sessions_inner(&pool, hours).await })
    }

    fn stats(&self, window_hours: u32) -> PersistenceFuture<CoachingSessionStats> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::session_stats_inner(&pool, window_hours).await })
    }

    fn health_check(&self) -> PersistenceFuture<()> {
        let pool = self.pool.clone();
        Box::pin(async move { PostgresAdapter::health_check_inner(&pool).await })
    }

    fn close(&self) -> PersistenceFuture<()> {
        SentimentLogPort::close(self)
    }
}

fn session_from_row(row: &PgRow) -> Result<CoachingSessionRecord, PersistenceError> {
    let audio_metadata: Option<Json<AudioMetadata>> =
        row.try_get("audio_metadata").map_err(map_read_err)?;
    let voice_config: Option<Json<VoiceConfig>> =
        row.try_get("voice_config").map_err(map_read_err)?;
    let processing_time_ms: Option<i64> =
        row.try_get("processing_time_ms").map_err(map_read_err)?;
    let file_size: Option<i64> = row.try_get("file_size").map_err(map_read_err)?;
    let duration_sec: Option<i32> = row.try_get("duration_sec").map_err(map_read_err)?;

    Ok(CoachingSessionRecord {
        session_id: row.try_get("session_id").map_err(map_read_err)?,
        tts_text: row.try_get("tts_text").map_err(map_read_err)?,
        audio_url: row.try_get("audio_url").map_err(map_read_err)?,
        audio_metadata: audio_metadata.map(|Json(v)| v),
        voice_config: voice_config.map(|Json(v)| v),
        processing_time_ms: processing_time_ms.map(|v| v.max(0) as u64),
        file_size: file_size.map(|v| v.max(0) as u64),
        duration_sec: duration_sec.map(|v| v.max(0) as u32),
        cleanup: row.try_get("cleanup").map_err(map_read_err)?,
        created_at: row.try_get("created_at").map_err(map_read_err)?,
        expires_at: row.try_get("expires_at").map_err(map_read_err)?,
    })
}

fn count(row: &PgRow, column: &str) -> Result<u64, PersistenceError> {
    let value: i64 = row.try_get(column).map_err(map_read_err)?;
    Ok(value.max(0) as u64)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn map_read_err(err: sqlx::Error) -> PersistenceError {
    PersistenceError::ReadFailed(err.to_string())
}

fn map_write_err(err: sqlx::Error) -> PersistenceError {
    PersistenceError::WriteFailed(err.to_string())
}

fn map_connect_err(err: sqlx::Error) -> PersistenceError {
    PersistenceError::ConnectionFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_columns_saturate() {
        assert_eq!(to_i32(u32::MAX), i32::MAX);
        assert_eq!(to_i32(24), 24);
        assert_eq!(to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn sql_errors_map_to_persistence_kinds() {
        assert!(matches!(
            map_read_err(sqlx::Error::RowNotFound),
            PersistenceError::ReadFailed(_)
        ));
        assert!(matches!(
            map_connect_err(sqlx::Error::PoolTimedOut),
            PersistenceError::ConnectionFailed(_)
        ));
    }
}
