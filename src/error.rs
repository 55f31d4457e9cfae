use thiserror::Error;

use crate::engine::EngineError;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced to callers of the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The engine executable is missing or failed to start
    #[error("Parsing engine unavailable: {0}")]
    Unavailable(String),

    /// Writing a request or reading a response failed
    #[error("Engine communication error: {0}")]
    Communication(String),

    /// A response line did not decode against the expected format
    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether an engine session that produced this error must be replaced
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            BridgeError::Unavailable(_) | BridgeError::Communication(_)
        )
    }
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::SpawnError(_) | EngineError::MissingPipe(_) => {
                BridgeError::Unavailable(err.to_string())
            }
            other => BridgeError::Communication(other.to_string()),
        }
    }
}
