use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Transcription provider not configured: {0}")]
    NotConfigured(&'static str),
    #[error("Transcription request failed: {0}")]
    RequestFailed(String),
    #[error("Transcription job failed: {0}")]
    JobFailed(String),
    #[error("Transcription timed out")]
    Timeout,
    #[error("Transcript is empty")]
    EmptyTranscript,
    #[error("Audio read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Malformed completion: {0}")]
    MalformedCompletion(String),
    #[error("Rate limited")]
    RateLimited,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("TTS not configured: {0}")]
    NotConfigured(&'static str),
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("No audio content received from TTS service")]
    NoAudioContent,
    #[error("Audio file write failed: {0}")]
    Io(#[from] std::io::Error),
}
