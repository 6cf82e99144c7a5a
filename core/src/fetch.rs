//! Outcome of a single asynchronous request.
//!
//! A [`FetchResult`] is created `Pending` when a request starts and is replaced
//! (never mutated) by a `Success` or `Error` value once the request settles.
//! A new logical request produces a new value via [`FetchResult::into_pending`].
//!
//! The variants make the lifecycle invariants structural:
//!
//! - `Success` always carries data and never an error
//! - `Error` always carries a [`TransportError`]
//! - `Pending` never carries an error; it may hold the previous success data
//!   (`stale`) so callers that opted into stale-while-revalidate can avoid
//!   flicker

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a [`FetchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchState {
    /// Request in flight
    Pending,
    /// Request settled with data
    Success,
    /// Request settled with a transport error
    Error,
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Whether a transport failure happened at the HTTP or the network level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// The server answered with a non-success status
    Http,
    /// No usable response (DNS, refused connection, timeout, broken body)
    Network,
}

/// A failed request at the network/HTTP layer.
///
/// Distinct from [`ValidationError`](crate::schema::ValidationError), which
/// describes a successful response whose body has the wrong shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportError {
    /// HTTP or network failure
    pub kind: TransportErrorKind,
    /// HTTP status code, when a response was received
    pub status: Option<u16>,
    /// Status text or a description of the network failure
    pub status_text: String,
    /// The URL the request was sent to
    pub url: String,
    /// Structured error body returned by the server, if any
    pub payload: Option<Value>,
}

impl TransportError {
    /// Create an HTTP-level error from a received response.
    #[must_use]
    pub fn http(
        status: u16,
        status_text: impl Into<String>,
        url: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            kind: TransportErrorKind::Http,
            status: Some(status),
            status_text: status_text.into(),
            url: url.into(),
            payload,
        }
    }

    /// Create a network-level error (no response was received).
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            status: None,
            status_text: message.into(),
            url: url.into(),
            payload: None,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Network failures, `408`, `429` and `5xx` are retryable; every other
    /// status is a definitive answer from the server.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match (self.kind, self.status) {
            (TransportErrorKind::Network, _) => true,
            (TransportErrorKind::Http, Some(status)) => {
                status == 408 || status == 429 || status >= 500
            },
            (TransportErrorKind::Http, None) => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} {} ({})", status, self.status_text, self.url),
            None => write!(f, "request to {} failed: {}", self.url, self.status_text),
        }
    }
}

impl std::error::Error for TransportError {}

/// Response metadata returned alongside every repository result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// HTTP status code
    pub status: u16,
    /// Whether the status is in the 2xx range
    pub ok: bool,
    /// Canonical reason phrase for the status
    pub status_text: String,
    /// The URL the response came from
    pub url: String,
    /// Response headers (lower-cased names)
    pub headers: BTreeMap<String, String>,
}

impl ResponseMeta {
    /// Create metadata for a status, deriving `ok` from the status range.
    #[must_use]
    pub fn new(status: u16, status_text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            status,
            ok: (200..300).contains(&status),
            status_text: status_text.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }
}

/// The `{ response, result }` pair returned by a repository call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Status, headers and URL
    pub response: ResponseMeta,
    /// Parsed JSON body (the error payload when `response.ok` is false)
    pub result: Value,
}

impl ApiResponse {
    /// Create a response pair.
    #[must_use]
    pub const fn new(response: ResponseMeta, result: Value) -> Self {
        Self { response, result }
    }

    /// Split into the success body or an HTTP transport error.
    ///
    /// A `null` error body is treated as no payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the status is not 2xx.
    pub fn into_result(self) -> Result<Value, TransportError> {
        let Self { response, result } = self;
        if response.ok {
            return Ok(result);
        }

        let payload = if result.is_null() { None } else { Some(result) };
        Err(TransportError::http(
            response.status,
            response.status_text,
            response.url,
            payload,
        ))
    }
}

/// Outcome of one asynchronous data request at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    /// Request in flight; `stale` holds the previous success data, if retained
    Pending {
        /// Previous success data kept for stale-while-revalidate
        stale: Option<T>,
    },
    /// Request settled successfully
    Success(T),
    /// Request failed at the transport level
    Error {
        /// The transport failure
        error: TransportError,
        /// Previous success data kept for stale-while-revalidate
        stale: Option<T>,
    },
}

impl<T> Default for FetchResult<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> FetchResult<T> {
    /// A fresh pending result without stale data.
    #[must_use]
    pub const fn pending() -> Self {
        Self::Pending { stale: None }
    }

    /// A failed result without stale data.
    #[must_use]
    pub const fn failed(error: TransportError) -> Self {
        Self::Error { error, stale: None }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> FetchState {
        match self {
            Self::Pending { .. } => FetchState::Pending,
            Self::Success(_) => FetchState::Success,
            Self::Error { .. } => FetchState::Error,
        }
    }

    /// Check if the request is still in flight
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Check if the request settled successfully
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Check if the request failed
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Data of a successful request. Stale data is never returned here.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    /// The most recent data available: success data, or retained stale data.
    #[must_use]
    pub const fn latest(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Pending { stale } | Self::Error { stale, .. } => stale.as_ref(),
        }
    }

    /// The transport error of a failed request.
    #[must_use]
    pub const fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Start a new logical request for the same source.
    ///
    /// When `keep_previous` is true, the most recent data survives as stale
    /// data; otherwise the pending result starts empty.
    #[must_use]
    pub fn into_pending(self, keep_previous: bool) -> Self {
        if !keep_previous {
            return Self::pending();
        }
        match self {
            Self::Success(data) => Self::Pending { stale: Some(data) },
            Self::Pending { stale } | Self::Error { stale, .. } => Self::Pending { stale },
        }
    }

    /// Drop any retained stale data.
    #[must_use]
    pub fn without_stale(self) -> Self {
        match self {
            Self::Pending { .. } => Self::pending(),
            Self::Error { error, .. } => Self::failed(error),
            success @ Self::Success(_) => success,
        }
    }

    /// Transform the carried data (success and stale alike).
    pub fn map<U, F>(self, f: F) -> FetchResult<U>
    where
        F: Fn(T) -> U,
    {
        match self {
            Self::Pending { stale } => FetchResult::Pending {
                stale: stale.map(&f),
            },
            Self::Success(data) => FetchResult::Success(f(data)),
            Self::Error { error, stale } => FetchResult::Error {
                error,
                stale: stale.map(&f),
            },
        }
    }
}

impl<T> From<Result<T, TransportError>> for FetchResult<T> {
    fn from(result: Result<T, TransportError>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(error) => Self::failed(error),
        }
    }
}

impl From<ApiResponse> for FetchResult<Value> {
    fn from(api: ApiResponse) -> Self {
        api.into_result().into()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn not_found() -> TransportError {
        TransportError::http(404, "Not Found", "/api/genres/9", None)
    }

    #[test]
    fn test_ok_response_becomes_success() {
        let api = ApiResponse::new(
            ResponseMeta::new(200, "OK", "/api/genres"),
            json!([{ "name": "Action" }]),
        );

        let result = FetchResult::from(api);

        assert_eq!(result.state(), FetchState::Success);
        assert_eq!(result.data(), Some(&json!([{ "name": "Action" }])));
        assert!(result.error().is_none());
    }

    #[test]
    fn test_failed_response_carries_status_url_and_payload() {
        let api = ApiResponse::new(
            ResponseMeta::new(422, "Unprocessable Entity", "/api/genres"),
            json!({ "message": "name taken" }),
        );

        let result = FetchResult::from(api);
        let error = result.error().cloned().expect("error result");

        assert_eq!(result.state(), FetchState::Error);
        assert_eq!(error.kind, TransportErrorKind::Http);
        assert_eq!(error.status, Some(422));
        assert_eq!(error.url, "/api/genres");
        assert_eq!(error.payload, Some(json!({ "message": "name taken" })));
        assert!(result.data().is_none());
    }

    #[test]
    fn test_null_error_body_has_no_payload() {
        let api = ApiResponse::new(ResponseMeta::new(500, "Internal Server Error", "/x"), Value::Null);

        let result = FetchResult::from(api);

        assert_eq!(result.error().and_then(|e| e.payload.clone()), None);
    }

    #[test]
    fn test_into_pending_keeps_previous_only_when_asked() {
        let success = FetchResult::Success(1);

        assert_eq!(success.clone().into_pending(false), FetchResult::pending());
        assert_eq!(
            success.into_pending(true),
            FetchResult::Pending { stale: Some(1) }
        );
    }

    #[test]
    fn test_latest_prefers_success_then_stale() {
        let stale: FetchResult<i32> = FetchResult::Error {
            error: not_found(),
            stale: Some(7),
        };

        assert_eq!(stale.latest(), Some(&7));
        assert_eq!(stale.data(), None);
        assert_eq!(stale.without_stale().latest(), None);
    }

    #[test]
    fn test_map_transforms_success_and_stale() {
        let pending = FetchResult::Pending { stale: Some(2) }.map(|n| n * 10);
        assert_eq!(pending.latest(), Some(&20));

        let success = FetchResult::Success("a").map(str::len);
        assert_eq!(success.data(), Some(&1));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransportError::network("/x", "connection refused").is_retryable());
        assert!(TransportError::http(503, "Service Unavailable", "/x", None).is_retryable());
        assert!(TransportError::http(429, "Too Many Requests", "/x", None).is_retryable());
        assert!(!not_found().is_retryable());
    }

    #[test]
    fn test_error_display_mentions_status_and_url() {
        assert_eq!(not_found().to_string(), "404 Not Found (/api/genres/9)");
        assert_eq!(
            TransportError::network("/api", "timed out").to_string(),
            "request to /api failed: timed out"
        );
    }
}
