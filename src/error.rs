//! Error types for marga-nav

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// marga-nav error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration serialization error
    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// JSON decode error (dataset, wire messages)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver not connected
    #[error("GPS receiver not connected")]
    NotConnected,

    /// Receiver already connected
    #[error("GPS receiver already connected")]
    AlreadyConnected,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
