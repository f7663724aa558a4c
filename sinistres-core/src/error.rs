use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
