use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::shared::config;
use crate::shared::entities::VoiceConfig;
use crate::shared::error::ai::SynthesisError;
use crate::shared::ports::ai::{AiFuture, TtsPort};

use super::http_client;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: &'a VoiceConfig,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
    volume_gain_db: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

/// Text-to-speech over the Google Cloud TTS REST API (`text:synthesize`), MP3 output.
#[derive(Clone)]
pub struct GoogleTtsClient {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl GoogleTtsClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn from_env() -> Self {
        let ai = config::ai_config();
        Self::new(ai.google_tts_api_key.clone(), ai.google_tts_base_url.clone())
            .with_timeout(config::timeouts().ai_http)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn synthesize_mp3(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, SynthesisError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SynthesisError::NotConfigured("GOOGLE_TTS_API_KEY is not set"))?;
        let client =
            http_client(self.timeout).map_err(|e| SynthesisError::SynthesisFailed(e.to_string()))?;
        let body = SynthesizeRequest {
            input: SynthesisInput { text },
            voice,
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: 1.0,
                pitch: 0.0,
                volume_gain_db: 0.0,
            },
        };
        let resp = client
            .post(format!("{}/text:synthesize", self.base_url))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::SynthesisFailed(e.to_string()))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| SynthesisError::SynthesisFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(SynthesisError::SynthesisFailed(format!(
                "HTTP {}: {}",
                status, body_text
            )));
        }
        decode_audio_content(&body_text)
    }
}

impl TtsPort for GoogleTtsClient {
    fn synthesize(
        &self,
        text: String,
        voice: VoiceConfig,
    ) -> AiFuture<Result<Vec<u8>, SynthesisError>> {
        let this = self.clone();
        Box::pin(async move { this.synthesize_mp3(&text, &voice).await })
    }

    fn provider_name(&self) -> &'static str {
        "google-tts"
    }
}

fn decode_audio_content(body_text: &str) -> Result<Vec<u8>, SynthesisError> {
    let body: SynthesizeResponse = serde_json::from_str(body_text)
        .map_err(|e| SynthesisError::SynthesisFailed(e.to_string()))?;
    let encoded = body
        .audio_content
        .filter(|content| !content.is_empty())
        .ok_or(SynthesisError::NoAudioContent)?;
    let bytes = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| SynthesisError::SynthesisFailed(format!("invalid audioContent: {}", e)))?;
    if bytes.is_empty() {
        return Err(SynthesisError::NoAudioContent);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_audio() {
        let body = format!(r#"{{"audioContent":"{}"}}"#, STANDARD.encode(b"ID3mp3"));
        assert_eq!(decode_audio_content(&body).expect("audio"), b"ID3mp3".to_vec());
    }

    #[test]
    fn missing_audio_is_no_audio_content() {
        assert!(matches!(
            decode_audio_content("{}"),
            Err(SynthesisError::NoAudioContent)
        ));
        assert!(matches!(
            decode_audio_content(r#"{"audioContent":""}"#),
            Err(SynthesisError::NoAudioContent)
        ));
    }

    #[test]
    fn request_body_matches_rest_shape() {
        let voice = VoiceConfig::default();
        let body = SynthesizeRequest {
            input: SynthesisInput { text: "hello" },
            voice: &voice,
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: 1.0,
                pitch: 0.0,
                volume_gain_db: 0.0,
            },
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["voice"]["languageCode"], "en-US");
        assert_eq!(value["voice"]["ssmlGender"], "FEMALE");
        assert_eq!(value["audioConfig"]["audioEncoding"], "MP3");
    }
}
