use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetabrokerError {
    #[error("Upstream catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed catalog archive: {0}")]
    MalformedArchive(String),

    #[error("Catalog parse error: {0}")]
    ParseError(String),

    #[error("No catalog data available: {0}")]
    NoDataAvailable(String),

    #[error("{broker}: query failed: {message}")]
    BrokerQueryFailed { broker: String, message: String },

    #[error("{broker}: unavailable for this object: {reason}")]
    BrokerUnavailableForObject { broker: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

pub type Result<T> = std::result::Result<T, MetabrokerError>;
