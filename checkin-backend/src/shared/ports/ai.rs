use std::future::Future;
use std::pin::Pin;

pub mod llm;
pub mod transcription;
pub mod tts;
pub mod types;

pub use llm::LlmPort;
pub use transcription::TranscriptionPort;
pub use tts::TtsPort;
pub use types::{ChatMessage, CompletionRequest, ProviderInfo, Role};

pub use crate::shared::error::ai::{LlmError, ProviderError, SynthesisError};

pub type AiFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
