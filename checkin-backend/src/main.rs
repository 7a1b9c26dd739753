use std::sync::Arc;
use std::time::Duration;

use checkin_backend::db::{InMemoryStore, PostgresAdapter};
use checkin_backend::http::{self, HttpState};
use checkin_backend::service::ai::{AssemblyAiProvider, FallbackProvider, GoogleTtsClient, OpenAiChatClient};
use checkin_backend::service::checkin::CheckinDefaults;
use checkin_backend::service::{
    CheckinOrchestrator, CleanupScheduler, CleanupSettings, CoachingEngine, CoachingWithSpeech,
    ContentAddressedCache, SpeechSynthesizer,
};
use checkin_backend::shared::ports::ai::TranscriptionPort;
use checkin_backend::shared::ports::{CoachingSessionPort, SentimentLogPort};
use checkin_backend::{config, logging};

/// Starts the check-in API: stores, AI adapters, cleanup scheduler and HTTP server.
///
/// Runs until Ctrl-C, then stops accepting requests, waits for in-flight check-ins,
/// stops the scheduler, runs a final cleanup pass and closes the stores, giving up
/// after `SHUTDOWN_TIMEOUT_SEC`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let server_cfg = config::ServerConfig::from_env()?;
    let storage = config::storage_config();
    let retention = config::retention_config();

    tokio::fs::create_dir_all(&server_cfg.upload_temp_dir).await?;
    tokio::fs::create_dir_all(&storage.audio_dir).await?;
    http::sweep_stale_uploads(&server_cfg.upload_temp_dir).await;

    let (sentiment_log, sessions) = build_stores(retention.coaching_session_ttl).await;

    let primary = AssemblyAiProvider::from_env();
    if !primary.is_configured() {
        log::warn!("[main] ASSEMBLYAI_API_KEY not set, every check-in will use the fallback provider");
    }
    let primary: Arc<dyn TranscriptionPort> = Arc::new(primary);
    let fallback: Arc<dyn TranscriptionPort> = Arc::new(FallbackProvider::new());

    let cache = Arc::new(ContentAddressedCache::from_env());
    let speech = Arc::new(SpeechSynthesizer::from_env(Arc::new(GoogleTtsClient::from_env())));
    let engine = Arc::new(CoachingEngine::new(Arc::new(OpenAiChatClient::from_env())));
    let coaching = Arc::new(CoachingWithSpeech::new(engine, speech.clone(), sessions.clone()));
    let orchestrator = Arc::new(CheckinOrchestrator::new(
        cache.clone(),
        primary,
        fallback,
        sentiment_log.clone(),
        coaching,
        CheckinDefaults::from_env(),
    ));

    let scheduler = Arc::new(CleanupScheduler::new(
        speech,
        sessions,
        sentiment_log,
        cache.clone(),
        CleanupSettings::from_env(),
    ));
    scheduler.start().await;

    let state = HttpState {
        orchestrator,
        scheduler: scheduler.clone(),
        cache,
        audio_dir: storage.audio_dir.clone(),
        audio_url_prefix: storage.audio_url_prefix.clone(),
        upload_dir: server_cfg.upload_temp_dir.clone(),
        upload_max_bytes: server_cfg.upload_max_bytes,
        io_timeout: config::timeouts().audio_io,
    };
    let server = http::spawn_checkin_server(&server_cfg.http_addr.to_string(), state).await?;

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("[main] shutdown signal error: {:?}", err);
    }
    log::info!("[main] shutdown requested");

    let shutdown_timeout = config::cleanup_config().shutdown_timeout;
    let graceful = async {
        server.shutdown().await;
        scheduler.shutdown().await;
    };
    if tokio::time::timeout(shutdown_timeout, graceful).await.is_err() {
        log::error!(
            "[main] graceful shutdown exceeded {}s, exiting anyway",
            shutdown_timeout.as_secs()
        );
    }
    Ok(())
}

async fn build_stores(session_ttl: Duration) -> (Arc<dyn SentimentLogPort>, Arc<dyn CoachingSessionPort>) {
    match config::database_url() {
        Some(url) => match PostgresAdapter::new(url, session_ttl).await {
            Ok(adapter) => {
                let adapter = Arc::new(adapter);
                match SentimentLogPort::health_check(adapter.as_ref()).await {
                    Ok(()) => log::info!("[db] connected to postgres"),
                    Err(err) => log::warn!("[db] postgres health check failed: {}", err),
                }
                return (adapter.clone(), adapter);
            }
            Err(err) => {
                log::warn!("[db] postgres unavailable, using in-memory stores: {}", err);
            }
        },
        None => log::warn!("[db] DATABASE_URL not set, using in-memory stores"),
    }
    let store = Arc::new(InMemoryStore::new(session_ttl));
    (store.clone(), store)
}
