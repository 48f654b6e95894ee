//! Engine error types.

use seabee_transfer::TransferError;

/// Errors returned to callers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("a transfer is already running")]
    Busy,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<TransferError> for EngineError {
    /// Only step building fails synchronously, so every transfer error seen
    /// here rejects the request.
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InvalidRequest(msg) => EngineError::InvalidRequest(msg),
            other => EngineError::InvalidRequest(other.to_string()),
        }
    }
}
