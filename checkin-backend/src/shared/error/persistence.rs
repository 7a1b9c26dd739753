use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}
