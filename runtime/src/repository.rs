//! HTTP data sources.
//!
//! A [`Repository`] turns an [`ApiRequest`] into an [`ApiResponse`]. Only
//! failures to obtain a response at all are errors here; a 404 or 500 comes
//! back as a response with `ok == false` and is turned into a transport error
//! by [`FetchResult`]'s conversion.

use crate::config::HttpConfig;
use crate::error::ConfigError;
use crate::session::SessionContext;
use marquee_core::{ApiResponse, FetchResult, ResponseMeta, TransportError};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read
    Get,
    /// Create
    Post,
    /// Replace
    Put,
    /// Remove
    Delete,
}

impl Method {
    const fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A request relative to the repository's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path below the base URL, e.g. `/movies/7`
    pub path: String,
    /// Query string pairs, in order
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    /// A `PUT` request with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    /// A `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }

    /// Append a query pair.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Append every non-null member of a serializable record as query pairs.
    ///
    /// Strings are used verbatim, other values in their JSON form. Records
    /// that do not serialize to an object add nothing.
    #[must_use]
    pub fn with_query_params<P: Serialize + ?Sized>(mut self, params: &P) -> Self {
        if let Ok(Value::Object(members)) = serde_json::to_value(params) {
            for (name, value) in members {
                match value {
                    Value::Null => {},
                    Value::String(text) => self.query.push((name, text)),
                    other => self.query.push((name, other.to_string())),
                }
            }
        }
        self
    }
}

/// A source of API responses.
///
/// Implementations must be cheap to share; the query client holds one behind
/// an `Arc` and calls it from spawned tasks.
pub trait Repository: Send + Sync {
    /// Perform a request.
    ///
    /// Non-2xx responses are returned as `Ok` with `response.ok == false`.
    ///
    /// # Errors
    ///
    /// Returns a network [`TransportError`] when no response was received.
    fn send(&self, request: &ApiRequest) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;

    /// Perform a request and convert the outcome into a [`FetchResult`].
    fn fetch(&self, request: &ApiRequest) -> impl Future<Output = FetchResult<Value>> + Send {
        async move {
            match self.send(request).await {
                Ok(response) => response.into(),
                Err(error) => FetchResult::failed(error),
            }
        }
    }
}

/// [`Repository`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRepository {
    client: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl HttpRepository {
    /// Create a repository for the configured base URL.
    ///
    /// The bearer token, when present, is read from `session` on every request.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig, session: SessionContext) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Absolute URL for a request path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Repository for HttpRepository {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(&request.path);

        let mut builder = self
            .client
            .request(request.method.as_reqwest(), &url)
            .query(&request.query);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(method = %request.method, url = %url, error = %e, "Request failed");
            TransportError::network(url.clone(), e.to_string())
        })?;

        let status = response.status();
        let mut meta = ResponseMeta::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            response.url().as_str(),
        );
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                meta = meta.with_header(name.as_str(), value);
            }
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::network(url.clone(), e.to_string()))?;

        tracing::debug!(method = %request.method, url = %url, status = status.as_u16(), "Response received");
        Ok(ApiResponse::new(meta, parse_body(text)))
    }
}

/// Empty bodies become `null`; bodies that are not JSON are kept as a string.
fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Filters<'a> {
        title: Option<&'a str>,
        page: u32,
    }

    #[test]
    fn test_query_params_skip_nulls() {
        let request = ApiRequest::get("/movies").with_query_params(&Filters { title: None, page: 2 });
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);

        let request = ApiRequest::get("/movies").with_query_params(&Filters {
            title: Some("Alien"),
            page: 1,
        });
        assert!(request.query.contains(&("title".to_string(), "Alien".to_string())));
    }

    #[test]
    fn test_parse_body_variants() {
        assert_eq!(parse_body(String::new()), Value::Null);
        assert_eq!(parse_body("  ".into()), Value::Null);
        assert_eq!(parse_body(r#"{"id":1}"#.into()), json!({ "id": 1 }));
        assert_eq!(parse_body("Bad Gateway".into()), json!("Bad Gateway"));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = HttpConfig::new("http://localhost:8080/api/").unwrap();
        let repository = HttpRepository::new(&config, SessionContext::new()).unwrap();

        assert_eq!(repository.url("/movies/7"), "http://localhost:8080/api/movies/7");
        assert_eq!(repository.url("genres"), "http://localhost:8080/api/genres");
    }
}
