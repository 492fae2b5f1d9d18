use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] uuid::Error),
}
