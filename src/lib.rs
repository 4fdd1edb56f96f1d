//! Purpose: Client session layer for a clustered document database plus design-document management.
//! Exports: `core` (session bootstrap, transport contract, errors) and `api` (cluster handles, view indexes).
//! Role: Library backing the `couchlink` admin CLI; `api` is the stable surface.
//! Invariants: Misconfiguration is reported before any network I/O.
//! Invariants: No operation retries silently; retry policy belongs to the caller.
pub mod api;
pub mod core;
