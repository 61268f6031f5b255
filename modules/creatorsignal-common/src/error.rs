use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Every failure the harvesting core can report. `Clone` so a single in-flight
/// harvest can hand the same outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarvestError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited by {origin}")]
    RateLimited {
        origin: String,
        retry_after: Option<Duration>,
    },

    #[error("External service error from {origin} (status {status:?}): {message}")]
    ExternalService {
        origin: String,
        status: Option<u16>,
        message: String,
    },

    /// An upstream call exceeded its bounded wait.
    #[error("Timed out waiting for {origin}: {message}")]
    Timeout { origin: String, message: String },

    #[error("Authentication failed (status {status:?}): {message}")]
    Authentication { status: Option<u16>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    pub fn external(origin: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        HarvestError::ExternalService {
            origin: origin.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Backoff hint carried by a 429, if the upstream sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HarvestError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HarvestError::Validation(_) => "validation",
            HarvestError::RateLimited { .. } => "rate_limited",
            HarvestError::ExternalService { .. } => "external_service",
            HarvestError::Timeout { .. } => "timeout",
            HarvestError::Authentication { .. } => "authentication",
            HarvestError::Config(_) => "config",
        }
    }

    /// Structured description handed to the routing layer.
    pub fn payload(&self) -> ErrorPayload {
        let status = match self {
            HarvestError::ExternalService { status, .. }
            | HarvestError::Authentication { status, .. } => *status,
            HarvestError::RateLimited { .. } => Some(429),
            _ => None,
        };
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
            status,
            retry_after_secs: self.retry_after().map(|d| d.as_secs()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_payload_carries_retry_after() {
        let err = HarvestError::RateLimited {
            origin: "reddit".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        let payload = err.payload();
        assert_eq!(payload.kind, "rate_limited");
        assert_eq!(payload.status, Some(429));
        assert_eq!(payload.retry_after_secs, Some(7));
    }

    #[test]
    fn external_payload_passes_status_through() {
        let err = HarvestError::external("serper", Some(503), "unavailable");
        let payload = err.payload();
        assert_eq!(payload.kind, "external_service");
        assert_eq!(payload.status, Some(503));
        assert!(payload.message.contains("serper"));
    }

    #[test]
    fn timeout_payload_has_its_own_kind() {
        let err = HarvestError::Timeout {
            origin: "reddit".into(),
            message: "operation timed out".into(),
        };
        let payload = err.payload();
        assert_eq!(payload.kind, "timeout");
        assert_eq!(payload.status, None);
    }

    #[test]
    fn validation_payload_omits_status() {
        let json = serde_json::to_value(HarvestError::Validation("bad".into()).payload()).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["kind"], "validation");
    }
}
