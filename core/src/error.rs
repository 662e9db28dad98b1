//! Error types for the envelope client.
//!
//! # Design
//! The three protocol failures stay distinct: a transport failure (non-200 or
//! network error) carries no server payload, a malformed envelope names the
//! URL that produced it, and an application error carries the server's
//! `errors` object. The remaining variants are local failures raised before
//! or after the exchange.
//!
//! `Transport` keeps only the status code. Callers of the server have never
//! received error detail for non-200 responses, so the body is not surfaced.

use serde_json::Value;
use thiserror::Error;

/// Errors returned by `RequestExecutor` and `UploadManager`.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Non-200 status, or the exchange failed before a status was received.
    #[error("{}", transport_message(.status))]
    Transport { status: Option<u16> },

    /// Status 200, but the body is not an object carrying a `success` key.
    #[error("Invalid response on \"{url}\" request")]
    MalformedEnvelope { url: String },

    /// The server answered `success: false`. Holds its `errors` payload, or an
    /// empty object when none was sent.
    #[error("server rejected the request: {0}")]
    Application(Value),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The envelope's `data` could not be deserialized into the requested type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The multipart form could not be assembled.
    #[error("invalid upload form: {0}")]
    InvalidForm(String),

    /// The underlying HTTP client could not be built from the options.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Reading an upload file from disk failed.
    #[error("io error: {0}")]
    Io(String),

    /// `upload` was called while another upload on the same manager is active.
    #[error("an upload is already in progress")]
    UploadInProgress,

    /// The exchange was cancelled before it completed.
    #[error("request aborted")]
    Aborted,
}

fn transport_message(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!("request failed with HTTP {status}"),
        None => "request failed before a response was received".to_string(),
    }
}

/// Discriminator for `ApiError`, for callers that only need the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    MalformedEnvelope,
    Application,
    Local,
    Aborted,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::MalformedEnvelope { .. } => ErrorKind::MalformedEnvelope,
            ApiError::Application(_) => ErrorKind::Application,
            ApiError::Aborted => ErrorKind::Aborted,
            ApiError::Serialization(_)
            | ApiError::Deserialization(_)
            | ApiError::InvalidForm(_)
            | ApiError::Client(_)
            | ApiError::Io(_)
            | ApiError::UploadInProgress => ErrorKind::Local,
        }
    }

    /// The server's `errors` payload, if this is an application error.
    pub fn application_errors(&self) -> Option<&Value> {
        match self {
            ApiError::Application(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_message_names_url() {
        let err = ApiError::MalformedEnvelope {
            url: "/foo/bar?x=1".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid response on \"/foo/bar?x=1\" request");
        assert_eq!(err.kind(), ErrorKind::MalformedEnvelope);
    }

    #[test]
    fn transport_message_with_and_without_status() {
        assert_eq!(
            ApiError::Transport { status: Some(500) }.to_string(),
            "request failed with HTTP 500"
        );
        assert_eq!(
            ApiError::Transport { status: None }.to_string(),
            "request failed before a response was received"
        );
    }

    #[test]
    fn application_errors_only_for_application_variant() {
        let err = ApiError::Application(json!({"field": "bad"}));
        assert_eq!(err.application_errors(), Some(&json!({"field": "bad"})));
        assert!(ApiError::Aborted.application_errors().is_none());
    }

    #[test]
    fn local_failures_share_a_kind() {
        assert_eq!(ApiError::UploadInProgress.kind(), ErrorKind::Local);
        assert_eq!(ApiError::Io("x".into()).kind(), ErrorKind::Local);
    }
}
