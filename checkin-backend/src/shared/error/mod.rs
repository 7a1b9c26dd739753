pub mod ai;
pub mod checkin;
pub mod persistence;

pub use ai::{LlmError, ProviderError, SynthesisError};
pub use checkin::{CheckinError, UploadError};
pub use persistence::PersistenceError;
