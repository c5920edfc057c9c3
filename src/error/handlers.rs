//! Standardized error handling patterns for registry responses

use crate::error::{BlobRole, PullError};
use reqwest::StatusCode;

/// Longest response body carried inside an error message.
const MAX_BODY_CHARS: usize = 2048;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle token endpoint failures
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> PullError {
        let error_msg = match status.as_u16() {
            400 => format!("Invalid token request parameters: {}", error_text),
            401 => format!("Token endpoint rejected anonymous access: {}", error_text),
            403 => format!("Access denied by token endpoint: {}", error_text),
            404 => "Authentication endpoint not found".to_string(),
            429 => format!("Rate limited by token endpoint: {}", error_text),
            _ => format!("Token request failed (status {}): {}", status, error_text),
        };

        PullError::Auth(error_msg)
    }

    /// Handle manifest endpoint failures, keeping the raw body for diagnostics
    pub fn handle_manifest_error(status: StatusCode, error_text: &str) -> PullError {
        PullError::Manifest {
            status: status.as_u16(),
            body: truncate_body(error_text),
        }
    }

    /// Handle blob endpoint failures
    pub fn handle_blob_error(role: BlobRole, status: StatusCode, error_text: &str) -> PullError {
        let reason = match status.as_u16() {
            401 => format!("unauthorized: {}", error_text),
            403 => format!("forbidden: {}", error_text),
            404 => format!("blob not found: {}", error_text),
            429 => format!("rate limited: {}", error_text),
            500..=599 => format!("registry server error: {}", error_text),
            _ => error_text.to_string(),
        };

        PullError::Blob {
            role,
            status: Some(status.as_u16()),
            reason: truncate_body(&reason),
        }
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> PullError {
        PullError::Network(Self::describe(error, context))
    }

    /// Transport failure while fetching a blob
    pub fn handle_blob_transport_error(error: &reqwest::Error, role: BlobRole) -> PullError {
        PullError::Blob {
            role,
            status: error.status().map(|s| s.as_u16()),
            reason: Self::describe(error, "blob download"),
        }
    }

    fn describe(error: &reqwest::Error, context: &str) -> String {
        if error.is_timeout() {
            format!("{} timed out: {}", context, error)
        } else if error.is_connect() {
            format!("Connection error during {}: {}", context, error)
        } else if error.to_string().contains("dns") {
            format!("DNS resolution error for {}: {}", context, error)
        } else if error.to_string().contains("certificate") {
            format!("TLS certificate error during {}: {}", context, error)
        } else {
            format!("{} network error: {}", context, error)
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_error_keeps_status_and_body() {
        let err = HttpErrorHandler::handle_manifest_error(
            StatusCode::UNAUTHORIZED,
            r#"{"errors":[{"code":"UNAUTHORIZED"}]}"#,
        );
        match err {
            PullError::Manifest { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("UNAUTHORIZED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_blob_error_is_tagged_with_role() {
        let err = HttpErrorHandler::handle_blob_error(
            BlobRole::Layer(4),
            StatusCode::NOT_FOUND,
            "BLOB_UNKNOWN",
        );
        assert_eq!(
            err.to_string(),
            "Failed to download layer 5 blob (status 404): blob not found: BLOB_UNKNOWN"
        );
    }

    #[test]
    fn test_auth_error_mentions_status() {
        let err = HttpErrorHandler::handle_auth_error(StatusCode::BAD_GATEWAY, "upstream");
        assert!(matches!(err, PullError::Auth(ref msg) if msg.contains("502")));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(MAX_BODY_CHARS + 10);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.len(), MAX_BODY_CHARS + 3);
        assert!(truncated.ends_with("..."));
    }
}
