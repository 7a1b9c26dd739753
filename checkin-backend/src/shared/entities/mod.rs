pub mod coaching;
pub mod identifiers;
pub mod sentiment;
pub mod session;
pub mod speech;

pub use coaching::{
    AudioMetadata, BreathingExercise, CoachingMode, CoachingResponse, CoachingResponseWithTts,
    Resource, ResourceCategory, StretchExercise,
};
pub use identifiers::SessionId;
pub use sentiment::{SentimentLabel, SentimentResult, UnifiedResult};
pub use session::{CoachingSessionRecord, NewCoachingSession, SentimentLogRecord};
pub use speech::VoiceConfig;
