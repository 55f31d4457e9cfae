use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine process operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while driving the engine process
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to spawn engine: {0}")]
    SpawnError(#[from] io::Error),

    #[error("Engine {0} pipe was not captured")]
    MissingPipe(&'static str),

    #[error("Failed to write to engine: {0}")]
    WriteError(io::Error),

    #[error("Failed to read from engine: {0}")]
    ReadError(io::Error),

    #[error("Engine closed its output stream")]
    Closed,

    #[error("Engine did not exit within {0:?}")]
    Timeout(Duration),

    #[error("Engine writer task failed: {0}")]
    WriterTask(String),

    #[error("Failed to kill engine: {0}")]
    KillError(io::Error),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::WriterTask(err.to_string())
    }
}
