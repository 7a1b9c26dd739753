use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::shared::config;
use crate::shared::entities::UnifiedResult;
use crate::shared::error::ai::ProviderError;
use crate::shared::ports::ai::{AiFuture, ProviderInfo, TranscriptionPort};
use crate::shared::utils::{mask_pii, round2};

use super::http_client;
use super::retry::{retry_with_backoff, RetryPolicy};
use super::sentiment::{aggregate_sentiment, SentenceSentiment};

const PROVIDER_NAME: &str = "assemblyai";
const DEFAULT_TRANSCRIPT_CONFIDENCE: f64 = 0.8;

#[derive(Serialize)]
struct CreateTranscriptRequest<'a> {
    audio_url: &'a str,
    sentiment_analysis: bool,
    punctuate: bool,
    format_text: bool,
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct CreateTranscriptResponse {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TranscriptResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    sentiment_analysis_results: Option<Vec<SentenceSentiment>>,
}

/// Speech-to-text with per-sentence sentiment, against an AssemblyAI-compatible REST API.
///
/// The upload → create → poll sequence is retried as a whole under [`RetryPolicy`];
/// reading the local file and validating the transcript are not.
#[derive(Clone)]
pub struct AssemblyAiProvider {
    api_key: Option<String>,
    base_url: String,
    http_timeout: Duration,
    retry: RetryPolicy,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl AssemblyAiProvider {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Self {
        let ai = config::ai_config();
        let timeouts = config::timeouts();
        Self::new(ai.assemblyai_api_key.clone(), ai.assemblyai_base_url.clone())
            .with_retry(RetryPolicy::from_env())
            .with_http_timeout(timeouts.ai_http)
            .with_polling(
                timeouts.transcript_poll_interval,
                timeouts.transcript_poll_timeout,
            )
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn run(&self, audio_path: PathBuf) -> Result<UnifiedResult, ProviderError> {
        let started = Instant::now();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("ASSEMBLYAI_API_KEY is not set"))?;
        let audio = tokio::fs::read(&audio_path).await?;
        let client = http_client(self.http_timeout)
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        log::info!(
            "[transcribe] start provider={} bytes={}",
            PROVIDER_NAME,
            audio.len()
        );
        let response = retry_with_backoff(self.retry, "assemblyai transcription", |_attempt| {
            self.request_transcript(&client, api_key, &audio)
        })
        .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let result = into_unified(response, elapsed_ms)?;
        log::info!(
            "[transcribe] done provider={} transcript={} label={} score={:.2} elapsed_ms={}",
            PROVIDER_NAME,
            mask_pii(&result.transcript),
            result.sentiment.label,
            result.sentiment.score,
            elapsed_ms
        );
        Ok(result)
    }

    async fn request_transcript(
        &self,
        client: &Client,
        api_key: &str,
        audio: &[u8],
    ) -> Result<TranscriptResponse, ProviderError> {
        let upload_url = self.upload(client, api_key, audio).await?;
        let transcript_id = self.create_transcript(client, api_key, &upload_url).await?;
        self.poll_transcript(client, api_key, &transcript_id).await
    }

    async fn upload(
        &self,
        client: &Client,
        api_key: &str,
        audio: &[u8],
    ) -> Result<String, ProviderError> {
        let resp = client
            .post(format!("{}/upload", self.base_url))
            .header("authorization", api_key)
            .header("content-type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(map_request_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "upload HTTP {}: {}",
                status, body
            )));
        }
        let body: UploadResponse = resp.json().await.map_err(map_request_err)?;
        Ok(body.upload_url)
    }

    async fn create_transcript(
        &self,
        client: &Client,
        api_key: &str,
        upload_url: &str,
    ) -> Result<String, ProviderError> {
        let request = CreateTranscriptRequest {
            audio_url: upload_url,
            sentiment_analysis: true,
            punctuate: true,
            format_text: true,
        };
        let resp = client
            .post(format!("{}/transcript", self.base_url))
            .header("authorization", api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_request_err)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "transcript HTTP {}: {}",
                status, body
            )));
        }
        let body: CreateTranscriptResponse = resp.json().await.map_err(map_request_err)?;
        Ok(body.id)
    }

    async fn poll_transcript(
        &self,
        client: &Client,
        api_key: &str,
        transcript_id: &str,
    ) -> Result<TranscriptResponse, ProviderError> {
        let url = format!("{}/transcript/{}", self.base_url, transcript_id);
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            let resp = client
                .get(&url)
                .header("authorization", api_key)
                .send()
                .await
                .map_err(map_request_err)?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::RequestFailed(format!(
                    "poll HTTP {}: {}",
                    status, body
                )));
            }
            let body: TranscriptResponse = resp.json().await.map_err(map_request_err)?;
            match body.status.as_str() {
                "completed" => return Ok(body),
                "error" => {
                    return Err(ProviderError::JobFailed(
                        body.error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(ProviderError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl TranscriptionPort for AssemblyAiProvider {
    fn transcribe_with_sentiment(
        &self,
        audio_path: PathBuf,
    ) -> AiFuture<Result<UnifiedResult, ProviderError>> {
        let this = self.clone();
        Box::pin(async move { this.run(audio_path).await })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: PROVIDER_NAME,
            features: vec![
                "transcription",
                "sentiment_analysis",
                "punctuation",
                "text_formatting",
            ],
            configured: self.is_configured(),
        }
    }
}

pub(crate) fn into_unified(
    response: TranscriptResponse,
    processing_time: u64,
) -> Result<UnifiedResult, ProviderError> {
    let transcript = response.text.unwrap_or_default();
    if transcript.trim().is_empty() {
        return Err(ProviderError::EmptyTranscript);
    }
    let sentences = response.sentiment_analysis_results.unwrap_or_default();
    Ok(UnifiedResult {
        transcript,
        confidence: round2(
            response
                .confidence
                .unwrap_or(DEFAULT_TRANSCRIPT_CONFIDENCE)
                .clamp(0.0, 1.0),
        ),
        sentiment: aggregate_sentiment(&sentences),
        processing_time,
    })
}

fn map_request_err(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::RequestFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::entities::SentimentLabel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn parse(body: &str) -> TranscriptResponse {
        serde_json::from_str(body).expect("transcript json")
    }

    #[test]
    fn completed_response_is_aggregated() {
        let response = parse(
            r#"{
                "status": "completed",
                "text": "I had a rough week.",
                "confidence": 0.912,
                "sentiment_analysis_results": [
                    {"text": "I had a rough week.", "sentiment": "NEGATIVE", "confidence": 0.8}
                ]
            }"#,
        );
        let result = into_unified(response, 40).expect("unified");
        assert_eq!(result.confidence, 0.91);
        assert_eq!(result.sentiment.label, SentimentLabel::Negative);
        assert_eq!(result.sentiment.score, 0.0);
        assert_eq!(result.processing_time, 40);
    }

    #[test]
    fn missing_confidence_defaults() {
        let response = parse(r#"{"status": "completed", "text": "fine"}"#);
        let result = into_unified(response, 1).expect("unified");
        assert_eq!(result.confidence, DEFAULT_TRANSCRIPT_CONFIDENCE);
        assert_eq!(result.sentiment.label, SentimentLabel::Neutral);
    }

    #[test]
    fn whitespace_transcript_is_rejected() {
        let response = parse(r#"{"status": "completed", "text": "   "}"#);
        assert!(matches!(
            into_unified(response, 1),
            Err(ProviderError::EmptyTranscript)
        ));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let provider = AssemblyAiProvider::new(None, "http://127.0.0.1:9");
        let err = provider
            .transcribe_with_sentiment(PathBuf::from("/nonexistent.wav"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        assert!(!provider.info().configured);
    }

    #[tokio::test]
    async fn unreadable_audio_is_not_retried() {
        let provider = AssemblyAiProvider::new(Some("key".to_string()), "http://127.0.0.1:9");
        let err = provider
            .transcribe_with_sentiment(PathBuf::from("/nonexistent/audio.wav"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProviderError::Io(_)));
    }

    /// Minimal stand-in for the vendor API: upload, create, then one pending poll before completion.
    async fn spawn_fake_api(polls: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let polls = polls.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let (head_end, content_len) = loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                            let len = head
                                .lines()
                                .find_map(|l| l.strip_prefix("content-length:"))
                                .and_then(|v| v.trim().parse::<usize>().ok())
                                .unwrap_or(0);
                            break (pos + 4, len);
                        }
                    };
                    while buf.len() < head_end + content_len {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }
                    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                    let request_line = head.lines().next().unwrap_or("").to_string();
                    let body = if request_line.starts_with("POST /upload") {
                        r#"{"upload_url": "https://cdn.example/audio"}"#.to_string()
                    } else if request_line.starts_with("POST /transcript") {
                        r#"{"id": "tx-1", "status": "queued"}"#.to_string()
                    } else if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                        r#"{"status": "processing"}"#.to_string()
                    } else {
                        r#"{"status": "completed", "text": "Today was great!", "confidence": 0.95,
                            "sentiment_analysis_results": [
                              {"text": "Today was great!", "sentiment": "POSITIVE", "confidence": 0.9}
                            ]}"#
                        .to_string()
                    };
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(resp.as_bytes()).await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn full_round_trip_against_fake_api() {
        let polls = Arc::new(AtomicUsize::new(0));
        let base_url = spawn_fake_api(polls.clone()).await;
        let temp = tempfile::tempdir().expect("tempdir");
        let audio = temp.path().join("checkin.wav");
        std::fs::write(&audio, b"RIFF....WAVE").expect("write audio");

        let provider = AssemblyAiProvider::new(Some("key".to_string()), base_url)
            .with_polling(Duration::from_millis(10), Duration::from_secs(5));
        let result = provider
            .transcribe_with_sentiment(audio)
            .await
            .expect("transcription");
        assert_eq!(result.transcript, "Today was great!");
        assert_eq!(result.sentiment.label, SentimentLabel::Positive);
        assert_eq!(result.sentiment.score, 1.0);
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }
}
