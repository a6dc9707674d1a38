use thiserror::Error;

/// Main error type for the trading agent
#[derive(Error, Debug)]
pub enum GambitError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Broker errors
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    // Data provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // LLM errors
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM response parse failure: {0}")]
    LlmParse(String),

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using GambitError
pub type Result<T> = std::result::Result<T, GambitError>;
