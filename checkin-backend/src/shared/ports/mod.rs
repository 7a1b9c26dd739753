pub mod ai;
pub mod coaching_session;
pub mod sentiment_log;

pub use coaching_session::{CoachingSessionPort, CoachingSessionStats};
pub use sentiment_log::{SentimentLogPort, SentimentStats};

use std::future::Future;
use std::pin::Pin;

use crate::shared::error::PersistenceError;

pub type PersistenceFuture<T> = Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send>>;

/// For bookkeeping calls that log their own failures instead of returning them.
pub type InfallibleFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
