pub mod ai;
pub mod cache;
pub mod checkin;
pub mod cleanup;
pub mod coaching;
pub mod speech;

pub use cache::ContentAddressedCache;
pub use checkin::{CheckinOrchestrator, CheckinRequest, CheckinResponse};
pub use cleanup::{CleanupReport, CleanupScheduler, CleanupSettings};
pub use coaching::{CoachingEngine, CoachingWithSpeech};
pub use speech::SpeechSynthesizer;
