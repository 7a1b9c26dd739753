use crate::shared::error::ai::LlmError;

use super::{AiFuture, CompletionRequest};

pub trait LlmPort: Send + Sync {
    /// Returns the raw completion text, expected to be a JSON object.
    fn complete_json(&self, request: CompletionRequest) -> AiFuture<Result<String, LlmError>>;
}
