//! Purpose: Contract between the session layer and the transport agent it owns.
//! Exports: `Transport`, `Agent`, `PendingOp`, HTTP request/response types, capability surfaces.
//! Role: Seam for swapping the wire implementation (REST transport, in-memory fakes in tests).
//! Invariants: `resolve_collection_id` completes at most once and never after a successful cancel.
//! Invariants: Surfaces are cheap clones over one shared agent; none of them hold locks.
use super::auth::NegotiatedAuth;
use super::config::SessionConfig;
use super::connspec::ConnectionSpec;
use super::error::Error;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type CollectionIdCallback = Box<dyn FnOnce(Result<u32, Error>) + Send + 'static>;

/// Builds a live agent from a connection spec and negotiated credentials.
pub trait Transport: Send + Sync {
    fn connect(
        &self,
        spec: &ConnectionSpec,
        auth: &NegotiatedAuth,
        config: &SessionConfig,
    ) -> Result<Arc<dyn Agent>, Error>;
}

pub trait Agent: Send + Sync {
    fn has_collections_support(&self) -> bool;

    /// Starts an identifier lookup; `on_complete` runs at most once.
    fn resolve_collection_id(
        &self,
        scope: &str,
        collection: &str,
        on_complete: CollectionIdCallback,
    ) -> Box<dyn PendingOp>;

    fn cached_collection_id(&self, scope: &str, collection: &str) -> Option<u32>;

    fn do_http_request(&self, request: HttpRequest) -> Result<HttpResponse, Error>;

    fn diagnostics(&self) -> DiagnosticsReport;

    fn close(&self) -> Result<(), Error>;
}

/// Handle to an in-flight asynchronous operation.
pub trait PendingOp: Send {
    /// Returns true if the operation was stopped before producing a result.
    fn cancel(&self) -> bool;
}

/// A pending op that already completed; it can no longer be cancelled.
pub struct CompletedOp;

impl PendingOp for CompletedOp {
    fn cancel(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Management,
    Views,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub service: ServiceType,
    pub method: HttpMethod,
    /// Unencoded path segments; the agent is responsible for escaping.
    pub segments: Vec<String>,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<&'static str>,
    pub deadline: Option<Instant>,
}

impl HttpRequest {
    pub fn new<I, S>(service: ServiceType, method: HttpMethod, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service,
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            body: None,
            content_type: None,
            deadline: None,
        }
    }

    pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self.content_type = Some("application/json");
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Connected,
    Idle,
    Failed,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EndpointDiagnostics {
    pub service: ServiceType,
    pub remote: String,
    pub state: EndpointState,
    #[serde(rename = "last_activity_us", serialize_with = "serialize_micros")]
    pub last_activity: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub id: String,
    pub endpoints: Vec<EndpointDiagnostics>,
}

fn serialize_micros<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(duration) => serializer.serialize_some(&(duration.as_micros() as u64)),
        None => serializer.serialize_none(),
    }
}

/// Key-value capability view: collection addressing.
#[derive(Clone)]
pub struct KvSurface {
    agent: Arc<dyn Agent>,
}

impl KvSurface {
    pub(crate) fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn has_collections_support(&self) -> bool {
        self.agent.has_collections_support()
    }

    pub fn resolve_collection_id(
        &self,
        scope: &str,
        collection: &str,
        on_complete: CollectionIdCallback,
    ) -> Box<dyn PendingOp> {
        self.agent
            .resolve_collection_id(scope, collection, on_complete)
    }

    pub fn cached_collection_id(&self, scope: &str, collection: &str) -> Option<u32> {
        self.agent.cached_collection_id(scope, collection)
    }
}

/// Management/views capability view.
#[derive(Clone)]
pub struct HttpSurface {
    agent: Arc<dyn Agent>,
}

impl HttpSurface {
    pub(crate) fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn do_http_request(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.agent.do_http_request(request)
    }
}

#[derive(Clone)]
pub struct DiagnosticsSurface {
    agent: Arc<dyn Agent>,
}

impl DiagnosticsSurface {
    pub(crate) fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub fn diagnostics(&self) -> DiagnosticsReport {
        self.agent.diagnostics()
    }
}
