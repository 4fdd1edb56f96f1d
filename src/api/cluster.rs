//! Purpose: Cluster, bucket, scope and collection handles over pooled client sessions.
//! Exports: `Cluster`, `Bucket`, `Scope`, `Collection`, `CollectionAddress`, `SessionPool`.
//! Role: Entry point for library users; maps bucket + options to a reusable `ClientSession`.
//! Invariants: Sessions are keyed by `SessionConfig::hash`; equal configs share one session.
//! Invariants: The pool lock is never held while a session connects.
//! Invariants: A session whose bootstrap failed stays failed until explicitly evicted.
#![allow(clippy::result_large_err)]

use super::view_index::ViewIndexManager;
use crate::core::agent::{DiagnosticsReport, Transport};
use crate::core::auth::Authenticator;
use crate::core::config::{BucketOptions, ClusterOptions, SessionConfig};
use crate::core::connspec::ConnectionSpec;
use crate::core::context::OpContext;
use crate::core::error::{Error, ErrorKind};
use crate::core::rest::RestTransport;
use crate::core::session::{
    ClientSession, DEFAULT_COLLECTION, DEFAULT_COLLECTION_ID, DEFAULT_SCOPE,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Default)]
pub struct SessionPool {
    sessions: Mutex<HashMap<String, Arc<ClientSession>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<Arc<ClientSession>> {
        self.lock().get(hash).cloned()
    }

    pub fn get_or_insert_with<F>(&self, hash: &str, make: F) -> Arc<ClientSession>
    where
        F: FnOnce() -> ClientSession,
    {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get(hash) {
            return Arc::clone(session);
        }
        let session = Arc::new(make());
        sessions.insert(hash.to_string(), Arc::clone(&session));
        session
    }

    pub fn remove(&self, hash: &str) -> Option<Arc<ClientSession>> {
        self.lock().remove(hash)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Closes every connected session; sessions that never connected are skipped.
    pub fn close_all(&self) -> Result<(), Error> {
        let drained: Vec<_> = self.lock().drain().map(|(_, session)| session).collect();
        let mut first_err = None;
        for session in drained {
            match session.close() {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotConnected => {}
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ClientSession>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

pub struct Cluster {
    spec: ConnectionSpec,
    authenticator: Option<Authenticator>,
    options: ClusterOptions,
    transport: Arc<dyn Transport>,
    sessions: SessionPool,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("spec", &self.spec)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// Parses the connection string; no network I/O happens until a bucket is opened.
    pub fn new(
        connstr: &str,
        authenticator: Authenticator,
        options: ClusterOptions,
    ) -> Result<Self, Error> {
        let spec = ConnectionSpec::parse(connstr)?;
        Ok(Self::with_transport(
            spec,
            Some(authenticator),
            options,
            Arc::new(RestTransport::new()),
        ))
    }

    pub fn with_transport(
        spec: ConnectionSpec,
        authenticator: Option<Authenticator>,
        options: ClusterOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            spec,
            authenticator,
            options,
            transport,
            sessions: SessionPool::new(),
        }
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    /// Opens (or reuses) the session for `name` and connects it.
    pub fn bucket(&self, name: &str, opts: BucketOptions) -> Result<Bucket, Error> {
        let config = SessionConfig::new(name, &self.options, opts);
        let hash = config.hash();
        let session = self.sessions.get_or_insert_with(&hash, || {
            debug!(bucket = name, hash = %hash, "creating session");
            ClientSession::new(
                self.spec.clone(),
                self.authenticator.clone(),
                config,
                Arc::clone(&self.transport),
            )
        });
        session.connect()?;
        Ok(Bucket {
            session,
            management_timeout: self.options.timeouts.management,
        })
    }

    /// Drops the pooled session for `name` so the next `bucket` call bootstraps afresh.
    pub fn evict_bucket(&self, name: &str, opts: BucketOptions) -> bool {
        let hash = SessionConfig::new(name, &self.options, opts).hash();
        match self.sessions.remove(&hash) {
            Some(session) => {
                match session.close() {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotConnected => {}
                    Err(err) => {
                        warn!(bucket = name, error = %err, "evicted session did not close cleanly");
                    }
                }
                true
            }
            None => false,
        }
    }

    pub fn close(&self) -> Result<(), Error> {
        self.sessions.close_all()
    }
}

#[derive(Clone, Debug)]
pub struct Bucket {
    session: Arc<ClientSession>,
    management_timeout: Duration,
}

impl Bucket {
    pub fn name(&self) -> &str {
        self.session.bucket_name()
    }

    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    pub fn scope(&self, name: impl Into<String>) -> Scope {
        Scope {
            bucket: self.clone(),
            name: name.into(),
        }
    }

    pub fn default_scope(&self) -> Scope {
        self.scope(DEFAULT_SCOPE)
    }

    pub fn collection(&self, scope: impl Into<String>, collection: impl Into<String>) -> Collection {
        self.scope(scope).collection(collection)
    }

    pub fn default_collection(&self) -> Collection {
        self.default_scope().collection(DEFAULT_COLLECTION)
    }

    pub fn view_indexes(&self) -> Result<ViewIndexManager, Error> {
        let http = self.session.http_surface()?;
        Ok(ViewIndexManager::new(
            self.name(),
            http,
            self.management_timeout,
        ))
    }

    pub fn diagnostics(&self) -> Result<DiagnosticsReport, Error> {
        Ok(self.session.diagnostics_surface()?.diagnostics())
    }
}

#[derive(Clone, Debug)]
pub struct Scope {
    bucket: Bucket,
    name: String,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            session: Arc::clone(&self.bucket.session),
            address: CollectionAddress::new(self.name.clone(), name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionAddress {
    pub scope: String,
    pub collection: String,
}

impl CollectionAddress {
    pub fn new(scope: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            collection: collection.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.scope == DEFAULT_SCOPE && self.collection == DEFAULT_COLLECTION
    }
}

impl fmt::Display for CollectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope, self.collection)
    }
}

#[derive(Clone, Debug)]
pub struct Collection {
    session: Arc<ClientSession>,
    address: CollectionAddress,
}

impl Collection {
    pub fn address(&self) -> &CollectionAddress {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.address.collection
    }

    pub fn scope_name(&self) -> &str {
        &self.address.scope
    }

    /// Resolves the collection identifier so binary operations can target it.
    pub async fn open(&self, ctx: &OpContext) -> Result<u32, Error> {
        self.session
            .resolve_collection(ctx, &self.address.scope, &self.address.collection)
            .await
    }

    /// Identifier already known to the agent, without a lookup.
    pub fn cached_id(&self) -> Option<u32> {
        if self.address.is_default() {
            return Some(DEFAULT_COLLECTION_ID);
        }
        let kv = self.session.kv_surface().ok()?;
        kv.cached_collection_id(&self.address.scope, &self.address.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionAddress, SessionPool};
    use crate::core::agent::{Agent, Transport};
    use crate::core::auth::{Authenticator, NegotiatedAuth};
    use crate::core::config::{BucketOptions, ClusterOptions, SessionConfig};
    use crate::core::connspec::ConnectionSpec;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::session::ClientSession;
    use std::sync::Arc;

    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn connect(
            &self,
            _spec: &ConnectionSpec,
            _auth: &NegotiatedAuth,
            _config: &SessionConfig,
        ) -> Result<Arc<dyn Agent>, Error> {
            Err(Error::new(ErrorKind::Transport).with_message("refused"))
        }
    }

    fn session(bucket: &str) -> ClientSession {
        ClientSession::new(
            ConnectionSpec::parse("couchbase://localhost").expect("spec"),
            Some(Authenticator::password("admin", "secret")),
            SessionConfig::new(bucket, &ClusterOptions::default(), BucketOptions::default()),
            Arc::new(RefusingTransport),
        )
    }

    #[test]
    fn pool_reuses_session_for_same_hash() {
        let pool = SessionPool::new();
        let first = pool.get_or_insert_with("abc", || session("travel"));
        let second = pool.get_or_insert_with("abc", || session("other"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.bucket_name(), "travel");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn pool_remove_and_close_all() {
        let pool = SessionPool::new();
        pool.get_or_insert_with("a", || session("a"));
        pool.get_or_insert_with("b", || session("b"));
        assert!(pool.remove("a").is_some());
        assert!(pool.get("a").is_none());
        pool.close_all().expect("close");
        assert!(pool.is_empty());
    }

    #[test]
    fn default_address_is_sentinel() {
        assert!(CollectionAddress::new("_default", "_default").is_default());
        assert!(!CollectionAddress::new("_default", "hotels").is_default());
        assert_eq!(
            CollectionAddress::new("inventory", "hotels").to_string(),
            "inventory.hotels"
        );
    }
}
