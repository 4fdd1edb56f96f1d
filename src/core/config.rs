//! Purpose: Hold the immutable per-session configuration and its deterministic fingerprint.
//! Exports: `ClusterOptions`, `BucketOptions`, `SessionConfig`.
//! Role: Input to session bootstrap and key for session reuse in `SessionPool`.
//! Invariants: `SessionConfig::hash` covers exactly bucket name, mutation tokens and timeouts.
//! Invariants: Field order in the fingerprint is fixed; changing it invalidates cached sessions.
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KV_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_VIEW_TIMEOUT: Duration = Duration::from_secs(75);
pub const DEFAULT_MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(75);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(75);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timeouts {
    pub connect: Duration,
    pub kv: Duration,
    pub view: Duration,
    pub management: Duration,
    pub query: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            kv: DEFAULT_KV_TIMEOUT,
            view: DEFAULT_VIEW_TIMEOUT,
            management: DEFAULT_MANAGEMENT_TIMEOUT,
            query: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterOptions {
    pub timeouts: Timeouts,
}

impl ClusterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    pub fn with_kv_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.kv = timeout;
        self
    }

    pub fn with_view_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.view = timeout;
        self
    }

    pub fn with_management_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.management = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.query = timeout;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketOptions {
    pub disable_mutation_tokens: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub bucket: String,
    pub use_mutation_tokens: bool,
    pub timeouts: Timeouts,
}

impl SessionConfig {
    pub fn new(bucket: impl Into<String>, cluster: &ClusterOptions, bucket_opts: BucketOptions) -> Self {
        Self {
            bucket: bucket.into(),
            use_mutation_tokens: !bucket_opts.disable_mutation_tokens,
            timeouts: cluster.timeouts,
        }
    }

    /// Hex SHA-256 over the fields that make two sessions interchangeable.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.bucket.len() as u64).to_be_bytes());
        hasher.update(self.bucket.as_bytes());
        hasher.update([u8::from(self.use_mutation_tokens)]);
        for timeout in [
            self.timeouts.connect,
            self.timeouts.kv,
            self.timeouts.view,
            self.timeouts.management,
            self.timeouts.query,
        ] {
            hasher.update(timeout.as_nanos().to_be_bytes());
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}
