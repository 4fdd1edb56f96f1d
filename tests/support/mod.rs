//! Purpose: In-memory cluster used by integration tests in place of the REST transport.
//! Exports: `FakeCluster`, `FakeTransport`, `cluster_with`.
//! Role: Stores design documents by physical name and collection ids by address.
//! Invariants: Request shapes mirror the management/views endpoints the REST agent targets.
#![allow(dead_code)]

use couchlink::api::{Authenticator, Cluster, ClusterOptions, ConnectionSpec};
use couchlink::core::agent::{
    Agent, CollectionIdCallback, CompletedOp, DiagnosticsReport, EndpointDiagnostics,
    EndpointState, HttpMethod, HttpRequest, HttpResponse, PendingOp, ServiceType, Transport,
};
use couchlink::core::auth::NegotiatedAuth;
use couchlink::core::config::SessionConfig;
use couchlink::core::error::{Error, ErrorKind};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeCluster {
    pub design_docs: Mutex<BTreeMap<String, Value>>,
    pub collections: Mutex<HashMap<(String, String), u32>>,
    pub requests: Mutex<Vec<(HttpMethod, String)>>,
    pub connects: AtomicUsize,
    pub lookups: AtomicUsize,
    pub fail_upsert: AtomicBool,
    pub fail_drop: AtomicBool,
    pub hang_lookups: AtomicBool,
    pub without_collections: AtomicBool,
    pub fail_connect: AtomicBool,
    pub fail_close: AtomicBool,
    pub connect_delay: Mutex<Option<Duration>>,
    parked: Mutex<Vec<CollectionIdCallback>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store(&self, physical: &str, doc: Value) {
        self.design_docs
            .lock()
            .expect("lock")
            .insert(physical.to_string(), doc);
    }

    pub fn stored(&self, physical: &str) -> Option<Value> {
        self.design_docs.lock().expect("lock").get(physical).cloned()
    }

    pub fn add_collection(&self, scope: &str, collection: &str, id: u32) {
        self.collections
            .lock()
            .expect("lock")
            .insert((scope.to_string(), collection.to_string()), id);
    }

    pub fn request_log(&self) -> Vec<(HttpMethod, String)> {
        self.requests.lock().expect("lock").clone()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        match (request.service, request.method, segments.as_slice()) {
            (ServiceType::Views, HttpMethod::Get, [_, "_design", name]) => {
                match self.stored(name) {
                    Some(doc) => HttpResponse::new(200, doc.to_string()),
                    None => HttpResponse::new(404, r#"{"error":"not_found","reason":"missing"}"#),
                }
            }
            (ServiceType::Views, HttpMethod::Put, [_, "_design", name]) => {
                if self.fail_upsert.load(Ordering::SeqCst) {
                    return HttpResponse::new(500, r#"{"error":"internal"}"#);
                }
                let body = request.body.as_deref().unwrap_or_default();
                match serde_json::from_slice::<Value>(body) {
                    Ok(doc) => {
                        self.store(name, doc);
                        HttpResponse::new(201, r#"{"ok":true}"#)
                    }
                    Err(_) => HttpResponse::new(400, r#"{"error":"bad_request"}"#),
                }
            }
            (ServiceType::Views, HttpMethod::Delete, [_, "_design", name]) => {
                if self.fail_drop.load(Ordering::SeqCst) {
                    return HttpResponse::new(500, r#"{"error":"internal"}"#);
                }
                match self.design_docs.lock().expect("lock").remove(*name) {
                    Some(_) => HttpResponse::new(200, r#"{"ok":true}"#),
                    None => HttpResponse::new(404, r#"{"error":"not_found"}"#),
                }
            }
            (ServiceType::Management, HttpMethod::Get, ["pools", "default", "buckets", _, "ddocs"]) => {
                let rows: Vec<Value> = self
                    .design_docs
                    .lock()
                    .expect("lock")
                    .iter()
                    .map(|(name, doc)| {
                        json!({ "doc": { "meta": { "id": format!("_design/{name}") }, "json": doc } })
                    })
                    .collect();
                HttpResponse::new(200, json!({ "rows": rows }).to_string())
            }
            _ => HttpResponse::new(400, r#"{"error":"unexpected request"}"#),
        }
    }
}

pub struct FakeTransport {
    pub cluster: Arc<FakeCluster>,
}

impl Transport for FakeTransport {
    fn connect(
        &self,
        spec: &ConnectionSpec,
        _auth: &NegotiatedAuth,
        _config: &SessionConfig,
    ) -> Result<Arc<dyn Agent>, Error> {
        self.cluster.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = *self.cluster.connect_delay.lock().expect("lock") {
            std::thread::sleep(delay);
        }
        if self.cluster.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Transport)
                .with_message("connection refused")
                .with_operation("bootstrap"));
        }
        Ok(Arc::new(FakeAgent {
            cluster: Arc::clone(&self.cluster),
            bucket: spec.bucket.clone().unwrap_or_default(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeAgent {
    cluster: Arc<FakeCluster>,
    bucket: String,
    closed: AtomicBool,
}

struct HangingOp;

impl PendingOp for HangingOp {
    fn cancel(&self) -> bool {
        true
    }
}

impl Agent for FakeAgent {
    fn has_collections_support(&self) -> bool {
        !self.cluster.without_collections.load(Ordering::SeqCst)
    }

    fn resolve_collection_id(
        &self,
        scope: &str,
        collection: &str,
        on_complete: CollectionIdCallback,
    ) -> Box<dyn PendingOp> {
        self.cluster.lookups.fetch_add(1, Ordering::SeqCst);
        if self.cluster.hang_lookups.load(Ordering::SeqCst) {
            self.cluster.parked.lock().expect("lock").push(on_complete);
            return Box::new(HangingOp);
        }
        let id = self.cached_collection_id(scope, collection);
        on_complete(id.ok_or_else(|| {
            Error::new(ErrorKind::CollectionNotFound)
                .with_message(format!("collection {scope}.{collection} not found"))
        }));
        Box::new(CompletedOp)
    }

    fn cached_collection_id(&self, scope: &str, collection: &str) -> Option<u32> {
        self.cluster
            .collections
            .lock()
            .expect("lock")
            .get(&(scope.to_string(), collection.to_string()))
            .copied()
    }

    fn do_http_request(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::NotConnected));
        }
        self.cluster
            .requests
            .lock()
            .expect("lock")
            .push((request.method, request.path()));
        Ok(self.cluster.handle(&request))
    }

    fn diagnostics(&self) -> DiagnosticsReport {
        let state = if self.closed.load(Ordering::SeqCst) {
            EndpointState::Closed
        } else {
            EndpointState::Connected
        };
        DiagnosticsReport {
            id: format!("fake/{}", self.bucket),
            endpoints: vec![EndpointDiagnostics {
                service: ServiceType::Views,
                remote: "fake:8092".to_string(),
                state,
                last_activity: None,
            }],
        }
    }

    fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        if self.cluster.fail_close.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Transport).with_message("socket reset on close"));
        }
        Ok(())
    }
}

pub fn cluster_with(fake: &Arc<FakeCluster>, options: ClusterOptions) -> Cluster {
    Cluster::with_transport(
        ConnectionSpec::parse("couchbase://fake.local").expect("connstr"),
        Some(Authenticator::password("admin", "secret")),
        options,
        Arc::new(FakeTransport {
            cluster: Arc::clone(fake),
        }),
    )
}
