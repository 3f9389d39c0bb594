use thiserror::Error;

/// Errors produced by the resource-slot core.
#[derive(Debug, Error)]
pub enum SlotError {
    /// The serialized slot payload was not valid JSON or not an object.
    #[error("malformed slot payload: {0}")]
    Parse(String),

    /// A numeric argument was NaN or otherwise not usable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A slot key outside the known vocabulary was rejected by policy.
    #[error("unknown slot key: {0}")]
    UnknownSlot(String),
}

impl From<serde_json::Error> for SlotError {
    fn from(e: serde_json::Error) -> Self {
        SlotError::Parse(e.to_string())
    }
}
