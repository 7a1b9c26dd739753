use std::path::PathBuf;

use crate::shared::entities::UnifiedResult;
use crate::shared::error::ai::ProviderError;

use super::{AiFuture, ProviderInfo};

/// Speech-to-text plus sentiment in one call.
pub trait TranscriptionPort: Send + Sync {
    fn transcribe_with_sentiment(
        &self,
        audio_path: PathBuf,
    ) -> AiFuture<Result<UnifiedResult, ProviderError>>;

    fn info(&self) -> ProviderInfo;
}
