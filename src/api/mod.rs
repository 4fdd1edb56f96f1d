//! Purpose: Define the stable public Rust API boundary for couchlink.
//! Exports: Cluster handles, view index management, and the core types they expose.
//! Role: Public, additive-only surface used by the CLI and library callers.
//! Invariants: Transport internals stay behind the `Agent` contract and capability surfaces.

mod cluster;
mod view_index;

pub use crate::core::agent::{
    Agent, DiagnosticsReport, DiagnosticsSurface, EndpointDiagnostics, EndpointState, HttpSurface,
    KvSurface, Transport,
};
pub use crate::core::auth::{Authenticator, TlsMaterial};
pub use crate::core::config::{BucketOptions, ClusterOptions, SessionConfig, Timeouts};
pub use crate::core::connspec::ConnectionSpec;
pub use crate::core::context::OpContext;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::namespace::DesignDocumentNamespace;
pub use crate::core::rest::RestTransport;
pub use crate::core::session::ClientSession;
pub use cluster::{Bucket, Cluster, Collection, CollectionAddress, Scope, SessionPool};
pub use view_index::{DesignDocument, View, ViewIndexManager, ViewOptions};
