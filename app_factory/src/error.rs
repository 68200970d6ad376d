//! Structured API errors: every remote failure is tagged with an [`ErrorKind`]
//! where it happens, so retry and abort decisions never parse message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to an [`ApiError`] at the point of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing, malformed or rejected credentials.
    Authentication,
    /// Token is valid but lacks a required OAuth scope.
    InsufficientScope,
    /// The caller may not touch this resource.
    Permission,
    /// Provider throttled the request (429, or 403 with an exhausted quota).
    RateLimited,
    /// Input rejected locally or by the provider (bad email, package id, ...).
    Validation,
    /// Repository, build or file does not exist.
    NotFound,
    /// Resource already exists or the supplied SHA is stale.
    Conflict,
    /// Transport failure before a response arrived.
    Network,
    /// Provider returned a 5xx.
    Server,
    /// Any other non-success response.
    Api,
    /// Local persistence failed.
    Storage,
    /// The operation was skipped because the run was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Whether another attempt of the same call can reasonably succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorKind::Authentication
                | ErrorKind::InsufficientScope
                | ErrorKind::Permission
                | ErrorKind::Validation
                | ErrorKind::NotFound
                | ErrorKind::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::InsufficientScope => "insufficient_scope",
            ErrorKind::Permission => "permission",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::Api => "api",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call against GitHub, Codemagic or the Amazon Appstore.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP status when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Classify a non-success HTTP response.
    ///
    /// `rate_limit_remaining` is the provider's remaining-quota header, when sent.
    pub fn from_response(status: u16, rate_limit_remaining: Option<&str>, body: &str) -> Self {
        let message = extract_message(body);
        let kind = match status {
            401 => ErrorKind::Authentication,
            403 if rate_limit_remaining == Some("0") => ErrorKind::RateLimited,
            403 if message.to_lowercase().contains("rate limit") => ErrorKind::RateLimited,
            403 => ErrorKind::Permission,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            422 if message.to_lowercase().contains("email") => ErrorKind::Validation,
            422 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Api,
        };
        Self::new(kind, message).with_status(status)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ApiError::from_response(status.as_u16(), None, &e.to_string()),
            None => ApiError::network(e.to_string()),
        }
    }
}

/// Pull the `message` field out of a JSON error body, falling back to the raw text.
///
/// GitHub puts the specific reason in `errors[].message`; those are appended.
fn extract_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let Some(message) = value
        .get("message")
        .or_else(|| value.get("error_description"))
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
    else {
        return body.trim().to_string();
    };

    let details: Vec<&str> = value
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect()
        })
        .unwrap_or_default();
    if details.is_empty() {
        message.to_string()
    } else {
        format!("{message} ({})", details.join("; "))
    }
}
