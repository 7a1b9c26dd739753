use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("No audio file provided")]
    MissingFile,
    #[error("Invalid file type. Only .wav, .mp3, and .m4a files are allowed.")]
    UnsupportedFormat,
    #[error("File too large. Maximum size is {max_mb}MB.")]
    TooLarge { max_mb: u64 },
}

/// Failures that reach the caller. Everything else degrades inside the pipeline.
#[derive(Debug, Error)]
pub enum CheckinError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CheckinError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Upload(UploadError::TooLarge { .. }) => 413,
            Self::Upload(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to hand to clients; internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Upload(err) => err.to_string(),
            Self::Internal(_) => "Internal server error during audio processing".to_string(),
        }
    }
}
