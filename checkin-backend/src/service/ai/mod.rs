//! ai module: clients for the external speech, sentiment, LLM and TTS services.
//! - Vendor HTTP I/O stays in here; the rest of the crate only sees the ports.
//! - Retry policy lives with the transcription call; LLM and TTS failures are degraded by callers.

use anyhow::Result;
use reqwest::Client;
use std::time::Duration;

pub mod fallback;
pub mod llm;
pub mod retry;
pub mod sentiment;
pub mod transcription;
pub mod tts;

pub use fallback::FallbackProvider;
pub use llm::OpenAiChatClient;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sentiment::{aggregate_sentiment, SentenceSentiment};
pub use transcription::AssemblyAiProvider;
pub use tts::GoogleTtsClient;

fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}
