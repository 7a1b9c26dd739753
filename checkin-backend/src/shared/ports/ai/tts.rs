use crate::shared::entities::VoiceConfig;
use crate::shared::error::ai::SynthesisError;

use super::AiFuture;

pub trait TtsPort: Send + Sync {
    /// Returns encoded MP3 bytes.
    fn synthesize(
        &self,
        text: String,
        voice: VoiceConfig,
    ) -> AiFuture<Result<Vec<u8>, SynthesisError>>;

    fn provider_name(&self) -> &'static str;
}
