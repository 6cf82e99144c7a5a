//! Scripted repository for deterministic query-client tests
//!
//! - [`ScriptedRepository`]: per-path responses, call counts and recorded requests
//! - [`Gate`]: holds requests to a path pending until the test releases them

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use marquee_core::{ApiResponse, ResponseMeta, TransportError};
use marquee_runtime::{ApiRequest, Repository};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// What a scripted path answers.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    /// An HTTP response
    Reply {
        /// Status code
        status: u16,
        /// JSON body
        body: Value,
    },
    /// No response at all
    NetworkError(String),
}

impl ScriptedResponse {
    /// `200 OK` with `body`.
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self::Reply { status: 200, body }
    }

    /// Any status with `body`.
    #[must_use]
    pub const fn status(status: u16, body: Value) -> Self {
        Self::Reply { status, body }
    }

    /// A network failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError(message.into())
    }
}

/// Releases requests held at a gated path.
///
/// Each [`release`](Self::release) lets one waiting (or future) request
/// through; [`open`](Self::open) lets every request through from then on.
#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    /// Let one request through.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    /// Let every current and future request through.
    pub fn open(&self) {
        self.permits.close();
    }

    async fn pass(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    routes: HashMap<String, VecDeque<ScriptedResponse>>,
    gates: HashMap<String, Gate>,
    calls: HashMap<String, usize>,
    requests: Vec<ApiRequest>,
}

/// In-memory [`Repository`] answering from a script.
///
/// Responses queued for a path are used in order; the last one repeats.
/// Unscripted paths answer `404 Not Found`. Clones share the script, so a
/// test can keep one clone for assertions and hand another to the client.
///
/// # Example
///
/// ```
/// use marquee_runtime::{ApiRequest, Repository};
/// use marquee_testing::{ScriptedRepository, ScriptedResponse};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let repository = ScriptedRepository::new()
///     .on("/genres", ScriptedResponse::ok(json!([{ "id": 1, "name": "Rock" }])));
///
/// let result = repository.fetch(&ApiRequest::get("/genres")).await;
/// assert!(result.is_success());
/// assert_eq!(repository.calls("/genres"), 1);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedRepository {
    script: Arc<Mutex<Script>>,
    latency: Option<Duration>,
}

impl ScriptedRepository {
    /// Create an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `path`.
    #[must_use]
    pub fn on(self, path: impl Into<String>, response: ScriptedResponse) -> Self {
        self.push(path, response);
        self
    }

    /// Queue a response for `path` on an existing repository.
    pub fn push(&self, path: impl Into<String>, response: ScriptedResponse) {
        self.script
            .lock()
            .unwrap()
            .routes
            .entry(path.into())
            .or_default()
            .push_back(response);
    }

    /// Replace every queued response for `path`.
    pub fn replace(&self, path: impl Into<String>, response: ScriptedResponse) {
        self.script
            .lock()
            .unwrap()
            .routes
            .insert(path.into(), VecDeque::from([response]));
    }

    /// Delay every response.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Hold requests to `path` until the returned gate releases them.
    #[must_use]
    pub fn gate(&self, path: impl Into<String>) -> Gate {
        let gate = Gate {
            permits: Arc::new(Semaphore::new(0)),
        };
        self.script
            .lock()
            .unwrap()
            .gates
            .insert(path.into(), gate.clone());
        gate
    }

    /// Number of requests made to `path`.
    #[must_use]
    pub fn calls(&self, path: &str) -> usize {
        self.script.lock().unwrap().calls.get(path).copied().unwrap_or(0)
    }

    /// Number of requests made to any path.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.script.lock().unwrap().calls.values().sum()
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    fn next_response(&self, path: &str) -> Option<ScriptedResponse> {
        let mut script = self.script.lock().unwrap();
        let queue = script.routes.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Repository for ScriptedRepository {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let gate = {
            let mut script = self.script.lock().unwrap();
            *script.calls.entry(request.path.clone()).or_default() += 1;
            script.requests.push(request.clone());
            script.gates.get(&request.path).cloned()
        };

        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self.next_response(&request.path).unwrap_or_else(|| {
            ScriptedResponse::status(404, json!({ "message": format!("no script for {}", request.path) }))
        });

        match response {
            ScriptedResponse::Reply { status, body } => Ok(ApiResponse::new(
                ResponseMeta::new(status, reason(status), request.path.clone()),
                body,
            )),
            ScriptedResponse::NetworkError(message) => Err(TransportError::network(request.path.clone(), message)),
        }
    }
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
