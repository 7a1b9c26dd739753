use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use serde_json::Value;
use tempfile::tempdir;
use tokio::net::TcpListener;

use checkin_backend::db::InMemoryStore;
use checkin_backend::entities::{SentimentLabel, SentimentResult, UnifiedResult, VoiceConfig};
use checkin_backend::http::{self, HttpState};
use checkin_backend::ports::ai::{
    AiFuture, CompletionRequest, LlmError, LlmPort, ProviderError, ProviderInfo, SynthesisError,
    TranscriptionPort, TtsPort,
};
use checkin_backend::service::ai::FallbackProvider;
use checkin_backend::service::checkin::CheckinDefaults;
use checkin_backend::service::{
    CheckinOrchestrator, CleanupScheduler, CleanupSettings, CoachingEngine, CoachingWithSpeech,
    ContentAddressedCache, SpeechSynthesizer,
};
use checkin_backend::shared::logging;

const FAKE_MP3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00fake-mpeg-frames-for-range-tests";

struct ServerGuard(http::ServerHandle);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct CannedProvider;

impl TranscriptionPort for CannedProvider {
    fn transcribe_with_sentiment(&self, _audio_path: PathBuf) -> AiFuture<Result<UnifiedResult, ProviderError>> {
        Box::pin(async {
            Ok(UnifiedResult {
                transcript: "Busy week but I'm doing fine".to_string(),
                confidence: 0.9,
                sentiment: SentimentResult {
                    score: 0.64,
                    label: SentimentLabel::Positive,
                    confidence: 0.8,
                },
                processing_time: 25,
            })
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: "canned",
            features: vec!["transcription", "sentiment_analysis"],
            configured: true,
        }
    }
}

struct SlowProvider(Duration);

impl TranscriptionPort for SlowProvider {
    fn transcribe_with_sentiment(&self, audio_path: PathBuf) -> AiFuture<Result<UnifiedResult, ProviderError>> {
        let delay = self.0;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            CannedProvider.transcribe_with_sentiment(audio_path).await
        })
    }

    fn info(&self) -> ProviderInfo {
        CannedProvider.info()
    }
}

struct OfflineLlm;

impl LlmPort for OfflineLlm {
    fn complete_json(&self, _request: CompletionRequest) -> AiFuture<Result<String, LlmError>> {
        Box::pin(async { Err(LlmError::NotConfigured("offline")) })
    }
}

struct CannedTts;

impl TtsPort for CannedTts {
    fn synthesize(&self, _text: String, _voice: VoiceConfig) -> AiFuture<Result<Vec<u8>, SynthesisError>> {
        Box::pin(async { Ok(FAKE_MP3.to_vec()) })
    }

    fn provider_name(&self) -> &'static str {
        "canned"
    }
}

fn build_state(
    provider: Arc<dyn TranscriptionPort>,
    audio_dir: &Path,
    upload_dir: &Path,
) -> (HttpState, InMemoryStore) {
    let store = InMemoryStore::new(Duration::from_secs(3600));
    let cache = Arc::new(ContentAddressedCache::new(Duration::from_secs(86_400), 100));
    let speech = Arc::new(SpeechSynthesizer::new(
        Arc::new(CannedTts),
        audio_dir.to_path_buf(),
        "/audio",
        VoiceConfig::default(),
        Duration::from_secs(3600),
    ));
    let coaching = Arc::new(CoachingWithSpeech::new(
        Arc::new(CoachingEngine::new(Arc::new(OfflineLlm))),
        speech.clone(),
        Arc::new(store.clone()),
    ));
    let orchestrator = Arc::new(CheckinOrchestrator::new(
        cache.clone(),
        provider,
        Arc::new(FallbackProvider::with_seed(5)),
        Arc::new(store.clone()),
        coaching,
        CheckinDefaults {
            coaching_mode: None,
            tts_enabled: true,
        },
    ));
    let scheduler = Arc::new(CleanupScheduler::new(
        speech,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        cache.clone(),
        CleanupSettings::default(),
    ));
    let state = HttpState {
        orchestrator,
        scheduler,
        cache,
        audio_dir: audio_dir.to_path_buf(),
        audio_url_prefix: "/audio".to_string(),
        upload_dir: upload_dir.to_path_buf(),
        upload_max_bytes: 64 * 1024,
        io_timeout: Duration::from_secs(2),
    };
    (state, store)
}

fn header<'a>(res: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn checkin_http_e2e() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let audio_dir = temp.path().join("audio");
    let upload_dir = temp.path().join("uploads");
    let log_dir = match env::var("E2E_LOG_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => temp.path().join("logs"),
    };

    env::set_var("LOG_MODE", "file");
    env::set_var("LOG_DIR", log_dir.to_string_lossy().as_ref());
    env::set_var("LOG_FORMAT", "text");
    env::set_var("RUST_LOG", "info");
    logging::init();

    let (state, store) = build_state(Arc::new(CannedProvider), &audio_dir, &upload_dir);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let _guard = ServerGuard(http::spawn_checkin_server_with_listener(listener, state));

    let base_url = format!("http://{}", addr);
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/ping", base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["pong"], true);

    let res = client.get(format!("{}/api/health", base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"]["totalEntries"], 0);
    assert_eq!(body["cleanup"]["isRunning"], false);

    let mut wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    wav.extend(std::iter::repeat(7u8).take(2048));
    let res = client
        .post(format!("{}/api/checkin?mode=fast", base_url))
        .header(CONTENT_TYPE, "audio/wav")
        .body(wav.clone())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], true);
    assert!(body["processingTime"].as_u64().unwrap_or(0) > 0);
    let data = &body["data"];
    assert_eq!(data["transcript"], "Busy week but I'm doing fine");
    assert_eq!(data["sentiment"]["label"], "positive");
    assert_eq!(data["coachingMode"], "fast");
    assert_eq!(data["coaching"]["resources"].as_array().map(Vec::len), Some(3));
    assert!(data["sessionId"].as_str().is_some());
    let audio_url = data["audioUrl"].as_str().ok_or("missing audioUrl")?.to_string();
    assert!(audio_url.starts_with("/audio/tts_"));
    assert_eq!(data["audioMetadata"]["format"], "mp3");

    let leftover_uploads = fs::read_dir(&upload_dir)?.count();
    assert_eq!(leftover_uploads, 0);
    assert_eq!(store.sentiment_logs().await.len(), 1);

    let res = client
        .post(format!("{}/api/checkin?tts=false", base_url))
        .header(CONTENT_TYPE, "audio/wav")
        .body(wav)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert!(body["data"].get("audioUrl").is_none());

    let res = client
        .post(format!("{}/api/checkin", base_url))
        .header(CONTENT_TYPE, "video/mp4")
        .body(vec![1u8; 128])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Invalid file type. Only .wav, .mp3, and .m4a files are allowed."
    );

    let res = client
        .post(format!("{}/api/checkin", base_url))
        .header(CONTENT_TYPE, "audio/wav")
        .body(Vec::<u8>::new())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], "No audio file provided");

    let res = client
        .post(format!("{}/api/checkin", base_url))
        .header(CONTENT_TYPE, "audio/mpeg")
        .body(vec![0u8; 128 * 1024])
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let full_url = format!("{}{}", base_url, audio_url);
    let total_len = FAKE_MP3.len();

    let res = client.head(&full_url).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(header(&res, "content-type"), Some("audio/mpeg"));
    assert_eq!(header(&res, "accept-ranges"), Some("bytes"));
    assert_eq!(header(&res, "cache-control"), Some("public, max-age=3600"));
    let content_len: usize = header(&res, "content-length")
        .ok_or("missing content-length")?
        .parse()?;
    assert_eq!(content_len, total_len);

    let res = client.get(&full_url).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await?.as_ref(), FAKE_MP3);

    let res = client.get(&full_url).header(RANGE, "bytes=0-9").send().await?;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    let expected_range = format!("bytes 0-9/{}", total_len);
    assert_eq!(header(&res, "content-range"), Some(expected_range.as_str()));
    assert_eq!(res.bytes().await?.as_ref(), &FAKE_MP3[..10]);

    let res = client
        .get(&full_url)
        .header(RANGE, "bytes=999999-1000000")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    let expected_range = format!("bytes */{}", total_len);
    assert_eq!(header(&res, "content-range"), Some(expected_range.as_str()));

    let res = client
        .get(format!("{}/audio/tts_missing_1_0.mp3", base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // only synthesized files are served from the audio directory
    fs::write(audio_dir.join("notes.txt"), b"private")?;
    let res = client.get(format!("{}/audio/notes.txt", base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = client
        .get(format!("{}/audio/..%2Fuploads%2Fsecret.mp3", base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(format!("{}/api/unknown", base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], "Route not found");

    log::logger().flush();
    let logs = fs::read_to_string(log_dir.join("checkin.log"))?;
    assert!(logs.contains("[http] POST /api/checkin status=200"));
    assert!(logs.contains("[http] POST /api/checkin status=413"));
    assert!(logs.contains("audio_access status=206"));
    assert!(logs.contains("audio_access status=416"));
    assert!(logs.contains("range=bytes=0-9"));
    assert!(logs.contains("[checkin] done session="));

    Ok(())
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_checkin() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let upload_dir = temp.path().join("uploads");
    let (state, store) = build_state(
        Arc::new(SlowProvider(Duration::from_millis(400))),
        &temp.path().join("audio"),
        &upload_dir,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = http::spawn_checkin_server_with_listener(listener, state);

    let url = format!("http://{}/api/checkin?tts=false", addr);
    let in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .post(url)
            .header(CONTENT_TYPE, "audio/mpeg")
            .body(vec![3u8; 4096])
            .send()
            .await
    });

    // wait until the upload has been spooled and the provider is sleeping
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while fs::read_dir(&upload_dir).map(|d| d.count()).unwrap_or(0) == 0 {
        assert!(tokio::time::Instant::now() < deadline, "upload never spooled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.shutdown().await;

    let res = in_flight.await??;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(fs::read_dir(&upload_dir)?.count(), 0);
    assert_eq!(store.sentiment_logs().await.len(), 1);

    // listener is closed once shutdown returns
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    Ok(())
}
