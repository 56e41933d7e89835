//! Error taxonomy for the client

use thiserror::Error;

/// Errors surfaced by the Gemini web client
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Session cookies are missing, expired, or were rejected by the server
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The web endpoint answered with an unexpected status or envelope
    #[error("API error: {0}")]
    Api(String),

    /// The account hit the usage limit for the requested model
    #[error("usage limit exceeded for model '{0}'")]
    UsageLimitExceeded(String),

    /// The selected model is no longer served or its header value is stale
    #[error("model '{0}' is unavailable or invalid")]
    ModelInvalid(String),

    /// The client IP is temporarily blocked by the service
    #[error("IP temporarily blocked, try a different network or wait")]
    TemporarilyBlocked,

    /// An image generation prompt produced no images
    #[error("image generation failed: {0}")]
    ImageGeneration(String),

    /// The response payload did not match the shape the parser expects
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The caller passed arguments the client cannot act on
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport-level failure, including timeouts
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeminiError {
    /// Whether retrying the same request later can reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            GeminiError::Network(e) => e.is_timeout() || e.is_connect(),
            GeminiError::TemporarilyBlocked | GeminiError::UsageLimitExceeded(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeminiError>;
