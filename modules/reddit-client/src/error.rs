use std::time::Duration;

use creatorsignal_common::HarvestError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RedditError>;

const ORIGIN: &str = "reddit";

#[derive(Debug, Error)]
pub enum RedditError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Token exchange failed (status {status:?}): {message}")]
    Auth { status: Option<u16>, message: String },

    #[error("Still unauthorized after re-authenticating: {0}")]
    Unauthorized(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
}

impl From<reqwest::Error> for RedditError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RedditError::Timeout(err.to_string())
        } else if err.is_decode() {
            RedditError::Parse(err.to_string())
        } else {
            RedditError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RedditError {
    fn from(err: serde_json::Error) -> Self {
        RedditError::Parse(err.to_string())
    }
}

impl From<RedditError> for HarvestError {
    fn from(err: RedditError) -> Self {
        match err {
            RedditError::Auth { status, message } => HarvestError::Authentication { status, message },
            RedditError::Unauthorized(message) => HarvestError::ExternalService {
                origin: ORIGIN.to_string(),
                status: Some(401),
                message,
            },
            RedditError::RateLimited { retry_after } => HarvestError::RateLimited {
                origin: ORIGIN.to_string(),
                retry_after,
            },
            RedditError::Timeout(message) => HarvestError::Timeout {
                origin: ORIGIN.to_string(),
                message,
            },
            RedditError::Api { status, message } => HarvestError::ExternalService {
                origin: ORIGIN.to_string(),
                status: Some(status),
                message,
            },
            other => HarvestError::ExternalService {
                origin: ORIGIN.to_string(),
                status: None,
                message: other.to_string(),
            },
        }
    }
}
