//! Failure kinds for upstream status aggregation

use hyper::StatusCode;
use thiserror::Error;

/// Errors from fetching or combining upstream monitoring data.
///
/// The aggregation is all-or-nothing: any of these collapses the whole
/// `/api/status` response to the single error sentinel, never a partial
/// object.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Failed to build the outbound request
    #[error("failed to build upstream request: {0}")]
    Request(String),

    /// Transport-level failure (connect, reset, protocol)
    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    /// Upstream answered with a non-success status
    #[error("upstream returned HTTP {0}")]
    Status(StatusCode),

    /// Failed while reading the response body
    #[error("failed to read upstream body: {0}")]
    Body(#[from] hyper::Error),

    /// Response body was not valid JSON
    #[error("upstream returned malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The request exceeded the configured timeout ceiling
    #[error("upstream request timed out after {0}s")]
    Timeout(u64),

    /// The status page has no public groups to read monitors from
    #[error("upstream status page has no public groups")]
    EmptyGroupList,

    /// A required key was absent from an upstream payload
    #[error("upstream payload is missing `{0}`")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_the_ceiling() {
        let err = UpstreamError::Timeout(10);
        assert_eq!(err.to_string(), "upstream request timed out after 10s");
    }

    #[test]
    fn test_status_message() {
        let err = UpstreamError::Status(StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "upstream returned HTTP 502 Bad Gateway");
    }

    #[test]
    fn test_missing_field_names_the_key() {
        let err = UpstreamError::MissingField("heartbeatList");
        assert_eq!(
            err.to_string(),
            "upstream payload is missing `heartbeatList`"
        );
    }

    #[test]
    fn test_json_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: UpstreamError = parse_err.into();
        assert!(matches!(err, UpstreamError::Json(_)));
    }
}
