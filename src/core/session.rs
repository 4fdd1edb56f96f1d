//! Purpose: Per-bucket client session: one bootstrap attempt, capability surfaces, collection resolution.
//! Exports: `ClientSession`, `DEFAULT_SCOPE`, `DEFAULT_COLLECTION`, `DEFAULT_COLLECTION_ID`.
//! Role: Owns the transport agent; everything above talks to the cluster through it.
//! Invariants: State is Empty, Connected, Failed or Closed; never a half-built agent.
//! Invariants: A failed bootstrap is terminal; callers keep receiving the same error.
//! Invariants: The bootstrap lock is held only by `connect`; surfaces clone an `Arc` and release it.
use super::agent::{Agent, DiagnosticsSurface, HttpSurface, KvSurface, Transport};
use super::auth::{Authenticator, negotiate};
use super::config::SessionConfig;
use super::connspec::ConnectionSpec;
use super::context::OpContext;
use super::error::{Error, ErrorKind};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub const DEFAULT_SCOPE: &str = "_default";
pub const DEFAULT_COLLECTION: &str = "_default";
pub const DEFAULT_COLLECTION_ID: u32 = 0;

enum SessionState {
    Empty,
    Connected(Arc<dyn Agent>),
    Failed(Error),
    Closed,
}

pub struct ClientSession {
    config: SessionConfig,
    hash: String,
    spec: ConnectionSpec,
    authenticator: Option<Authenticator>,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("bucket", &self.config.bucket)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

impl ClientSession {
    pub fn new(
        spec: ConnectionSpec,
        authenticator: Option<Authenticator>,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let hash = config.hash();
        Self {
            config,
            hash,
            spec,
            authenticator,
            transport,
            state: Mutex::new(SessionState::Empty),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn bucket_name(&self) -> &str {
        &self.config.bucket
    }

    /// Runs the single bootstrap attempt, or reports the outcome of the one already made.
    pub fn connect(&self) -> Result<(), Error> {
        let mut state = self.lock_state();
        match &*state {
            SessionState::Connected(_) => return Ok(()),
            SessionState::Failed(err) => return Err(err.clone()),
            SessionState::Closed => return Err(closed_error()),
            SessionState::Empty => {}
        }

        match self.bootstrap() {
            Ok(agent) => {
                debug!(bucket = %self.config.bucket, hash = %self.hash, "session connected");
                *state = SessionState::Connected(agent);
                Ok(())
            }
            Err(err) => {
                warn!(bucket = %self.config.bucket, error = %err, "session bootstrap failed");
                *state = SessionState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn bootstrap(&self) -> Result<Arc<dyn Agent>, Error> {
        let tls = self.spec.use_tls.then_some(&self.spec.tls);
        let auth = negotiate(tls, self.authenticator.as_ref())?;
        let spec = self.spec.with_bucket(self.config.bucket.clone());
        self.transport
            .connect(&spec, &auth, &self.config)
            .map_err(|err| match err.operation() {
                Some(_) => err,
                None => err.with_operation("connect"),
            })
    }

    pub fn kv_surface(&self) -> Result<KvSurface, Error> {
        self.agent().map(KvSurface::new)
    }

    pub fn http_surface(&self) -> Result<HttpSurface, Error> {
        self.agent().map(HttpSurface::new)
    }

    pub fn diagnostics_surface(&self) -> Result<DiagnosticsSurface, Error> {
        self.agent().map(DiagnosticsSurface::new)
    }

    /// Resolves `scope.collection` to its numeric identifier.
    ///
    /// The default collection never touches the network. Otherwise the lookup
    /// races the context: a lookup that can still be cancelled yields a
    /// timeout/cancellation error, one that cannot is awaited for its real result.
    pub async fn resolve_collection(
        &self,
        ctx: &OpContext,
        scope: &str,
        collection: &str,
    ) -> Result<u32, Error> {
        if scope == DEFAULT_SCOPE && collection == DEFAULT_COLLECTION {
            return Ok(DEFAULT_COLLECTION_ID);
        }

        let agent = self.agent()?;
        if !agent.has_collections_support() {
            return Err(Error::new(ErrorKind::Unsupported)
                .with_message("collections are not supported by the server")
                .with_operation("resolve_collection"));
        }
        ctx.check("resolve_collection")?;

        let (tx, mut rx) = oneshot::channel();
        let op = agent.resolve_collection_id(
            scope,
            collection,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        tokio::select! {
            biased;
            result = &mut rx => flatten_lookup(result),
            reason = ctx.done() => {
                if op.cancel() {
                    debug!(scope, collection, ?reason, "collection lookup cancelled");
                    Err(reason.into_error("resolve_collection"))
                } else {
                    debug!(scope, collection, ?reason, "collection lookup past cancel point, draining");
                    flatten_lookup(rx.await)
                }
            }
        }
    }

    pub fn close(&self) -> Result<(), Error> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Connected(agent) => agent.close(),
            SessionState::Failed(err) => {
                *state = SessionState::Failed(err);
                Err(not_connected_error())
            }
            SessionState::Empty => {
                *state = SessionState::Empty;
                Err(not_connected_error())
            }
            SessionState::Closed => Err(closed_error()),
        }
    }

    fn agent(&self) -> Result<Arc<dyn Agent>, Error> {
        match &*self.lock_state() {
            SessionState::Connected(agent) => Ok(Arc::clone(agent)),
            SessionState::Failed(err) => Err(err.clone()),
            SessionState::Empty => Err(not_connected_error()),
            SessionState::Closed => Err(closed_error()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

fn flatten_lookup(
    result: Result<Result<u32, Error>, oneshot::error::RecvError>,
) -> Result<u32, Error> {
    match result {
        Ok(outcome) => outcome.map_err(|err| match err.operation() {
            Some(_) => err,
            None => err.with_operation("resolve_collection"),
        }),
        Err(_) => Err(Error::new(ErrorKind::Internal)
            .with_message("collection lookup ended without a result")
            .with_operation("resolve_collection")),
    }
}

fn not_connected_error() -> Error {
    Error::new(ErrorKind::NotConnected)
        .with_message("cluster not yet connected")
        .with_hint("Call connect() before using the session.")
}

fn closed_error() -> Error {
    Error::new(ErrorKind::NotConnected).with_message("session closed")
}
