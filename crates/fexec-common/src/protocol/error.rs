use thiserror::Error;

#[derive(Error, Debug)]
pub enum FexecError {
    /// The handler module or function could not be resolved.
    #[error("Load error: {0}")]
    Load(String),

    /// The handler was resolved but failed while running.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Writing to or reading from a peer failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single forwarding attempt to one fallback node failed.
    #[error("Fallback delivery to {address} failed: {reason}")]
    FallbackDelivery { address: String, reason: String },

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for FexecError {
    fn from(err: std::net::AddrParseError) -> Self {
        FexecError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FexecError>;
