//! Purpose: HTTP-only transport agent over ureq for the management and views services.
//! Exports: `RestTransport`, `RestAgent`.
//! Role: Default `Transport`; resolves collection ids through the collections manifest endpoint.
//! Invariants: Non-2xx responses are returned as `HttpResponse`; callers own status interpretation.
//! Invariants: A manifest lookup is cancellable only until its request is dispatched.
//! Invariants: Client-certificate auth always pins roots from `cacertpath`.
#![allow(clippy::result_large_err)]

use super::agent::{
    Agent, CollectionIdCallback, CompletedOp, DiagnosticsReport, EndpointDiagnostics,
    EndpointState, HttpMethod, HttpRequest, HttpResponse, PendingOp, ServiceType, Transport,
};
use super::auth::NegotiatedAuth;
use super::config::{SessionConfig, Timeouts};
use super::connspec::ConnectionSpec;
use super::error::{Error, ErrorKind};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const LOOKUP_PENDING: u8 = 0;
const LOOKUP_DISPATCHED: u8 = 1;
const LOOKUP_CANCELLED: u8 = 2;

#[derive(Clone, Debug)]
pub struct RestTransport {
    user_agent: String,
}

impl RestTransport {
    pub fn new() -> Self {
        Self {
            user_agent: format!("couchlink/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for RestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for RestTransport {
    fn connect(
        &self,
        spec: &ConnectionSpec,
        auth: &NegotiatedAuth,
        config: &SessionConfig,
    ) -> Result<Arc<dyn Agent>, Error> {
        let agent = RestAgent::build(spec, auth, config, &self.user_agent)?;
        agent.bootstrap()?;
        Ok(Arc::new(agent))
    }
}

#[derive(Clone)]
pub struct RestAgent {
    inner: Arc<RestAgentInner>,
}

struct RestAgentInner {
    id: String,
    bucket: String,
    http: ureq::Agent,
    authorization: Option<String>,
    endpoints: Vec<Endpoint>,
    cursor: AtomicUsize,
    timeouts: Timeouts,
    connect_timeout: Duration,
    collections: AtomicBool,
    closed: AtomicBool,
    collection_ids: Mutex<HashMap<(String, String), u32>>,
    activity: Mutex<HashMap<(usize, ServiceType), Activity>>,
}

#[derive(Clone, Debug)]
struct Endpoint {
    mgmt: Url,
    views: Url,
}

#[derive(Clone, Copy, Debug)]
struct Activity {
    at: Instant,
    ok: bool,
}

#[derive(Deserialize)]
struct BucketConfig {
    #[serde(rename = "bucketCapabilities", default)]
    capabilities: Vec<String>,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    scopes: Vec<ManifestScope>,
}

#[derive(Deserialize)]
struct ManifestScope {
    name: String,
    #[serde(default)]
    collections: Vec<ManifestCollection>,
}

#[derive(Deserialize)]
struct ManifestCollection {
    name: String,
    uid: String,
}

struct ManifestLookup {
    state: Arc<AtomicU8>,
}

impl PendingOp for ManifestLookup {
    fn cancel(&self) -> bool {
        self.state
            .compare_exchange(
                LOOKUP_PENDING,
                LOOKUP_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl RestAgent {
    fn build(
        spec: &ConnectionSpec,
        auth: &NegotiatedAuth,
        config: &SessionConfig,
        user_agent: &str,
    ) -> Result<Self, Error> {
        let bucket = spec.bucket.clone().ok_or_else(|| {
            Error::new(ErrorKind::Configuration).with_message("connection spec has no bucket")
        })?;
        let connect_timeout = spec.connect_timeout.unwrap_or(config.timeouts.connect);

        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .user_agent(user_agent);
        if let Some(tls_config) = build_tls_config(spec, auth)? {
            builder = builder.tls_config(tls_config);
        }

        let authorization = match auth {
            NegotiatedAuth::Password { username, password } => Some(format!(
                "Basic {}",
                BASE64.encode(format!("{username}:{password}"))
            )),
            NegotiatedAuth::ClientCertificate { .. } => None,
        };

        let endpoints = spec
            .seeds
            .iter()
            .map(|seed| {
                Ok(Endpoint {
                    mgmt: endpoint_url(spec.use_tls, &seed.host, spec.mgmt_port(seed))?,
                    views: endpoint_url(spec.use_tls, &seed.host, spec.views_port())?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let hash = config.hash();
        Ok(Self {
            inner: Arc::new(RestAgentInner {
                id: format!("{bucket}/{}", &hash[..12]),
                bucket,
                http: builder.build(),
                authorization,
                endpoints,
                cursor: AtomicUsize::new(0),
                timeouts: config.timeouts,
                connect_timeout,
                collections: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                collection_ids: Mutex::new(HashMap::new()),
                activity: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Loads the bucket config from the first seed that answers.
    fn bootstrap(&self) -> Result<(), Error> {
        let inner = &self.inner;
        let deadline = Instant::now().checked_add(inner.connect_timeout);
        let segments = ["pools", "default", "buckets", inner.bucket.as_str()];
        let mut last_err = None;

        for index in 0..inner.endpoints.len() {
            let request = HttpRequest::new(ServiceType::Management, HttpMethod::Get, segments)
                .with_deadline(deadline);
            let response = match inner.send_to(index, &request) {
                Ok(response) => response,
                Err(err) => {
                    debug!(endpoint = index, error = %err, "seed did not answer");
                    last_err = Some(err);
                    continue;
                }
            };
            match response.status {
                200 => {
                    let config: BucketConfig = decode_json(&response.body, "bootstrap")?;
                    let collections = config.capabilities.iter().any(|cap| cap == "collections");
                    inner.collections.store(collections, Ordering::Release);
                    inner.cursor.store(index, Ordering::Relaxed);
                    debug!(bucket = %inner.bucket, collections, "bootstrap complete");
                    return Ok(());
                }
                401 | 403 => {
                    return Err(Error::new(ErrorKind::Authentication)
                        .with_message("cluster rejected the credentials")
                        .with_operation("bootstrap")
                        .with_status(response.status));
                }
                404 => {
                    return Err(Error::new(ErrorKind::Configuration)
                        .with_message(format!("bucket {:?} not found", inner.bucket))
                        .with_operation("bootstrap")
                        .with_status(404));
                }
                status => {
                    last_err = Some(
                        Error::new(ErrorKind::Transport)
                            .with_message("unexpected bootstrap status")
                            .with_operation("bootstrap")
                            .with_status(status)
                            .with_body(response.body_text()),
                    );
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::new(ErrorKind::Configuration).with_message("no seed addresses to bootstrap from")
        }))
    }
}

impl Agent for RestAgent {
    fn has_collections_support(&self) -> bool {
        self.inner.collections.load(Ordering::Acquire)
    }

    fn resolve_collection_id(
        &self,
        scope: &str,
        collection: &str,
        on_complete: CollectionIdCallback,
    ) -> Box<dyn PendingOp> {
        if let Some(id) = self.cached_collection_id(scope, collection) {
            on_complete(Ok(id));
            return Box::new(CompletedOp);
        }

        let state = Arc::new(AtomicU8::new(LOOKUP_PENDING));
        let lookup = ManifestLookup {
            state: Arc::clone(&state),
        };
        let inner = Arc::clone(&self.inner);
        let scope = scope.to_string();
        let collection = collection.to_string();
        let spawned = std::thread::Builder::new()
            .name("couchlink-manifest".to_string())
            .spawn(move || {
                if state
                    .compare_exchange(
                        LOOKUP_PENDING,
                        LOOKUP_DISPATCHED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_err()
                {
                    return;
                }
                on_complete(inner.fetch_collection_id(&scope, &collection));
            });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn collection lookup");
        }
        Box::new(lookup)
    }

    fn cached_collection_id(&self, scope: &str, collection: &str) -> Option<u32> {
        self.inner
            .collection_ids
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&(scope.to_string(), collection.to_string()))
            .copied()
    }

    fn do_http_request(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let index = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % self.inner.endpoints.len();
        self.inner.send_to(index, &request)
    }

    fn diagnostics(&self) -> DiagnosticsReport {
        let inner = &self.inner;
        let closed = inner.closed.load(Ordering::Acquire);
        let activity = inner
            .activity
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut endpoints = Vec::with_capacity(inner.endpoints.len() * 2);
        for (index, endpoint) in inner.endpoints.iter().enumerate() {
            for (service, url) in [
                (ServiceType::Management, &endpoint.mgmt),
                (ServiceType::Views, &endpoint.views),
            ] {
                let seen = activity.get(&(index, service));
                let state = match (closed, seen) {
                    (true, _) => EndpointState::Closed,
                    (false, Some(activity)) if activity.ok => EndpointState::Connected,
                    (false, Some(_)) => EndpointState::Failed,
                    (false, None) => EndpointState::Idle,
                };
                endpoints.push(EndpointDiagnostics {
                    service,
                    remote: remote_label(url),
                    state,
                    last_activity: seen.map(|activity| activity.at.elapsed()),
                });
            }
        }
        DiagnosticsReport {
            id: inner.id.clone(),
            endpoints,
        }
    }

    fn close(&self) -> Result<(), Error> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::new(ErrorKind::NotConnected).with_message("agent already closed"));
        }
        debug!(agent = %self.inner.id, "agent closed");
        Ok(())
    }
}

impl RestAgentInner {
    fn send_to(&self, index: usize, request: &HttpRequest) -> Result<HttpResponse, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::new(ErrorKind::NotConnected).with_message("agent closed"));
        }
        let endpoint = &self.endpoints[index];
        let (base, default_timeout) = match request.service {
            ServiceType::Management => (&endpoint.mgmt, self.timeouts.management),
            ServiceType::Views => (&endpoint.views, self.timeouts.view),
        };
        let timeout = match request.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(Error::new(ErrorKind::Timeout)
                        .with_message("deadline exceeded before dispatch"));
                }
                remaining
            }
            None => default_timeout,
        };

        let url = build_url(base, &request.segments)?;
        debug!(method = %request.method, url = %url, "http request");
        let mut call = self
            .http
            .request(request.method.as_str(), url.as_str())
            .timeout(timeout)
            .set("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            call = call.set("Authorization", authorization);
        }
        let result = match &request.body {
            Some(body) => call
                .set("Content-Type", request.content_type.unwrap_or("application/json"))
                .send_bytes(body),
            None => call.call(),
        };

        let outcome = match result {
            Ok(response) => read_response(response),
            Err(ureq::Error::Status(_, response)) => read_response(response),
            Err(ureq::Error::Transport(err)) => {
                let timed_out = request
                    .deadline
                    .is_some_and(|deadline| Instant::now() >= deadline);
                let kind = if timed_out {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Transport
                };
                Err(Error::new(kind)
                    .with_message(format!("{} {} failed", request.method, remote_label(base)))
                    .with_source(err))
            }
        };
        self.record(index, request.service, outcome.is_ok());
        outcome
    }

    fn fetch_collection_id(&self, scope: &str, collection: &str) -> Result<u32, Error> {
        let request = HttpRequest::new(
            ServiceType::Management,
            HttpMethod::Get,
            ["pools", "default", "buckets", self.bucket.as_str(), "scopes"],
        )
        .with_deadline(Instant::now().checked_add(self.timeouts.management));
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        let response = self
            .send_to(index, &request)
            .map_err(|err| err.with_operation("resolve_collection"))?;
        if response.status != 200 {
            return Err(Error::new(ErrorKind::Transport)
                .with_message("failed to load collections manifest")
                .with_operation("resolve_collection")
                .with_status(response.status)
                .with_body(response.body_text()));
        }
        let manifest: Manifest = decode_json(&response.body, "resolve_collection")?;

        let mut ids = self
            .collection_ids
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        for manifest_scope in &manifest.scopes {
            for entry in &manifest_scope.collections {
                match u32::from_str_radix(&entry.uid, 16) {
                    Ok(id) => {
                        ids.insert((manifest_scope.name.clone(), entry.name.clone()), id);
                    }
                    Err(_) => warn!(uid = %entry.uid, "skipping collection with invalid uid"),
                }
            }
        }
        ids.get(&(scope.to_string(), collection.to_string()))
            .copied()
            .ok_or_else(|| {
                Error::new(ErrorKind::CollectionNotFound)
                    .with_message(format!("collection {scope}.{collection} not found"))
                    .with_operation("resolve_collection")
            })
    }

    fn record(&self, index: usize, service: ServiceType, ok: bool) {
        self.activity
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(
                (index, service),
                Activity {
                    at: Instant::now(),
                    ok,
                },
            );
    }
}

fn build_tls_config(
    spec: &ConnectionSpec,
    auth: &NegotiatedAuth,
) -> Result<Option<Arc<ureq::rustls::ClientConfig>>, Error> {
    if !spec.use_tls {
        return Ok(None);
    }
    let roots = match &spec.tls.ca_cert {
        Some(path) => Some(load_root_store(path)?),
        None => None,
    };

    let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
    let config = match (auth, roots) {
        (NegotiatedAuth::ClientCertificate { cert, key }, Some(roots)) => {
            let chain = load_certs(cert)?;
            let key = load_private_key(key)?;
            ureq::rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_client_auth_cert(chain, key)
                .map_err(|err| {
                    Error::new(ErrorKind::Configuration)
                        .with_message("client certificate and key do not match")
                        .with_source(err)
                })?
        }
        (NegotiatedAuth::ClientCertificate { .. }, None) => {
            return Err(Error::new(ErrorKind::Configuration)
                .with_message("client certificate authentication requires cacertpath")
                .with_hint("Add cacertpath=<cluster CA bundle> to the connection string."));
        }
        (NegotiatedAuth::Password { .. }, Some(roots)) => ureq::rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
        (NegotiatedAuth::Password { .. }, None) => return Ok(None),
    };
    Ok(Some(Arc::new(config)))
}

fn load_root_store(path: &Path) -> Result<ureq::rustls::RootCertStore, Error> {
    let certs = load_certs(path)?;
    let mut root_store = ureq::rustls::RootCertStore::empty();
    let (added, _) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(tls_file_error("CA file contains no parsable certificates", path));
    }
    Ok(root_store)
}

fn load_certs(
    path: &Path,
) -> Result<Vec<ureq::rustls::pki_types::CertificateDer<'static>>, Error> {
    let bytes = read_tls_file(path)?;
    let certs = rustls_pemfile::certs(&mut Cursor::new(bytes))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| tls_file_error("failed to parse certificate file", path).with_source(err))?;
    if certs.is_empty() {
        return Err(tls_file_error("certificate file contains no certificates", path));
    }
    Ok(certs)
}

fn load_private_key(
    path: &Path,
) -> Result<ureq::rustls::pki_types::PrivateKeyDer<'static>, Error> {
    let bytes = read_tls_file(path)?;
    rustls_pemfile::private_key(&mut Cursor::new(bytes))
        .map_err(|err| tls_file_error("failed to parse private key file", path).with_source(err))?
        .ok_or_else(|| tls_file_error("key file contains no private key", path))
}

fn read_tls_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path)
        .map_err(|err| tls_file_error("failed to read TLS file", path).with_source(err))
}

fn tls_file_error(message: &str, path: &Path) -> Error {
    Error::new(ErrorKind::Configuration).with_message(format!("{message}: {}", path.display()))
}

fn endpoint_url(use_tls: bool, host: &str, port: u16) -> Result<Url, Error> {
    let scheme = if use_tls { "https" } else { "http" };
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    Url::parse(&format!("{scheme}://{host}:{port}/")).map_err(|err| {
        Error::new(ErrorKind::Configuration)
            .with_message(format!("invalid seed host {host:?}"))
            .with_source(err)
    })
}

fn build_url(base_url: &Url, segments: &[String]) -> Result<Url, Error> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Internal).with_message("endpoint url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn remote_label(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => url.to_string(),
    }
}

fn read_response(response: ureq::Response) -> Result<HttpResponse, Error> {
    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to read response body")
                .with_status(status)
                .with_source(err)
        })?;
    Ok(HttpResponse { status, body })
}

fn decode_json<T>(body: &[u8], operation: &'static str) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("invalid response json")
            .with_operation(operation)
            .with_source(err)
    })
}

#[cfg(test)]
mod tests {
    use super::{
        ManifestLookup, RestAgent, build_tls_config, build_url, endpoint_url, remote_label,
        LOOKUP_DISPATCHED, LOOKUP_PENDING,
    };
    use crate::core::agent::{Agent, EndpointState, HttpMethod, HttpRequest, PendingOp, ServiceType};
    use crate::core::auth::NegotiatedAuth;
    use crate::core::config::{BucketOptions, ClusterOptions, SessionConfig};
    use crate::core::connspec::ConnectionSpec;
    use crate::core::error::ErrorKind;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU8;
    use std::time::{Duration, Instant};

    fn password() -> NegotiatedAuth {
        NegotiatedAuth::Password {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new("travel", &ClusterOptions::default(), BucketOptions::default())
    }

    fn agent(connstr: &str) -> RestAgent {
        let spec = ConnectionSpec::parse(connstr)
            .expect("spec")
            .with_bucket("travel");
        RestAgent::build(&spec, &password(), &config(), "couchlink-test").expect("agent")
    }

    #[test]
    fn build_url_escapes_segments() {
        let base = endpoint_url(false, "localhost", 8092).expect("url");
        let url = build_url(
            &base,
            &["travel".to_string(), "_design".to_string(), "dev_a b".to_string()],
        )
        .expect("url");
        assert_eq!(url.as_str(), "http://localhost:8092/travel/_design/dev_a%20b");
    }

    #[test]
    fn endpoint_url_brackets_ipv6() {
        let url = endpoint_url(true, "::1", 18091).expect("url");
        assert_eq!(url.as_str(), "https://[::1]:18091/");
        assert_eq!(remote_label(&url), "[::1]:18091");
    }

    #[test]
    fn manifest_lookup_cancels_only_before_dispatch() {
        let pending = ManifestLookup {
            state: Arc::new(AtomicU8::new(LOOKUP_PENDING)),
        };
        assert!(pending.cancel());
        assert!(!pending.cancel());

        let dispatched = ManifestLookup {
            state: Arc::new(AtomicU8::new(LOOKUP_DISPATCHED)),
        };
        assert!(!dispatched.cancel());
    }

    #[test]
    fn build_requires_bucket() {
        let spec = ConnectionSpec::parse("couchbase://localhost").expect("spec");
        let err = RestAgent::build(&spec, &password(), &config(), "ua").err().expect("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn diagnostics_list_every_endpoint_idle() {
        let agent = agent("couchbase://10.0.0.1,10.0.0.2");
        let report = agent.diagnostics();
        assert!(report.id.starts_with("travel/"));
        assert_eq!(report.endpoints.len(), 4);
        assert!(
            report
                .endpoints
                .iter()
                .all(|endpoint| endpoint.state == EndpointState::Idle)
        );
        assert_eq!(report.endpoints[0].remote, "10.0.0.1:8091");
        assert_eq!(report.endpoints[1].remote, "10.0.0.1:8092");
    }

    #[test]
    fn closed_agent_rejects_requests() {
        let agent = agent("couchbase://localhost");
        agent.close().expect("close");
        assert_eq!(agent.close().expect_err("err").kind(), ErrorKind::NotConnected);
        let request = HttpRequest::new(ServiceType::Views, HttpMethod::Get, ["travel"]);
        let err = agent.do_http_request(request).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert!(
            agent
                .diagnostics()
                .endpoints
                .iter()
                .all(|endpoint| endpoint.state == EndpointState::Closed)
        );
    }

    #[test]
    fn expired_deadline_fails_before_dispatch() {
        let agent = agent("couchbase://localhost");
        let request = HttpRequest::new(ServiceType::Views, HttpMethod::Get, ["travel"])
            .with_deadline(Some(Instant::now() - Duration::from_millis(1)));
        let err = agent.do_http_request(request).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn plain_scheme_needs_no_tls_config() {
        let spec = ConnectionSpec::parse("couchbase://localhost").expect("spec");
        assert!(build_tls_config(&spec, &password()).expect("tls").is_none());
    }

    #[test]
    fn client_certificate_requires_ca() {
        let spec = ConnectionSpec::parse("couchbases://localhost?certpath=/c.pem&keypath=/c.key")
            .expect("spec");
        let auth = NegotiatedAuth::ClientCertificate {
            cert: PathBuf::from("/c.pem"),
            key: PathBuf::from("/c.key"),
        };
        let err = build_tls_config(&spec, &auth).err().expect("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().unwrap_or_default().contains("cacertpath"));
    }

    #[test]
    fn missing_ca_file_is_configuration_error() {
        let spec = ConnectionSpec::parse("couchbases://localhost?cacertpath=/nonexistent/ca.pem")
            .expect("spec");
        let err = build_tls_config(&spec, &password()).err().expect("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn empty_ca_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, "not a certificate\n").expect("write");
        let spec = ConnectionSpec::parse(&format!("couchbases://localhost?cacertpath={}", ca.display()))
            .expect("spec");
        let err = build_tls_config(&spec, &password()).err().expect("err");
        assert!(err.message().unwrap_or_default().contains("no certificates"));
    }

    #[test]
    fn client_certificate_config_loads_generated_pair() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).expect("cert");
        let cert_path = dir.path().join("client.pem");
        let key_path = dir.path().join("client.key");
        std::fs::write(&cert_path, cert.serialize_pem().expect("pem")).expect("write cert");
        std::fs::write(&key_path, cert.serialize_private_key_pem()).expect("write key");

        let spec = ConnectionSpec::parse(&format!(
            "couchbases://localhost?certpath={}&keypath={}&cacertpath={}",
            cert_path.display(),
            key_path.display(),
            cert_path.display()
        ))
        .expect("spec");
        let auth = NegotiatedAuth::ClientCertificate {
            cert: cert_path.clone(),
            key: key_path.clone(),
        };
        let tls = build_tls_config(&spec, &auth).expect("tls");
        assert!(tls.is_some());
    }
}
