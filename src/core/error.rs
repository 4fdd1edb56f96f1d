//! Purpose: Single error type shared by session bootstrap, transport and index management.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Kind-first classification with optional operation/status/body context.
//! Invariants: Errors are `Clone` so a terminal bootstrap error can be handed out repeatedly.
//! Invariants: Kinds are stable; context fields are additive and never change the kind.
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Configuration,
    NotConnected,
    Unsupported,
    Timeout,
    Cancelled,
    Authentication,
    CollectionNotFound,
    IndexNotFound,
    Index,
    PublishSourceMissing,
    PublishUpsertFailed,
    PublishCleanupFailed,
    Transport,
    Decode,
    Internal,
}

impl ErrorKind {
    /// True for kinds a caller can retry with a fresh deadline.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::Cancelled
                | ErrorKind::Transport
                | ErrorKind::PublishUpsertFailed
        )
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    operation: Option<&'static str>,
    status: Option<u16>,
    body: Option<String>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            operation: None,
            status: None,
            body: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn operation(&self) -> Option<&'static str> {
        self.operation
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// True when the management service reported the index as absent.
    pub fn is_index_missing(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::IndexNotFound | ErrorKind::PublishSourceMissing
        )
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Re-classifies an error while keeping the original as its source.
    pub fn wrap(kind: ErrorKind, inner: Error) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            operation: inner.operation,
            status: inner.status,
            body: None,
            source: Some(Arc::new(inner)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(operation) = self.operation {
            write!(f, " (op: {operation})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(body) = &self.body {
            if !body.is_empty() {
                write!(f, " (body: {body})")?;
            }
        }
        if self.message.is_none() {
            if let Some(source) = &self.source {
                write!(f, ": {source}")?;
            }
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Configuration => 2,
        ErrorKind::IndexNotFound | ErrorKind::CollectionNotFound => 3,
        ErrorKind::PublishSourceMissing => 4,
        ErrorKind::Timeout | ErrorKind::Cancelled => 5,
        ErrorKind::Authentication => 6,
        ErrorKind::NotConnected | ErrorKind::Unsupported => 7,
        ErrorKind::Transport => 8,
        ErrorKind::Index | ErrorKind::Decode => 9,
        ErrorKind::PublishUpsertFailed => 10,
        ErrorKind::PublishCleanupFailed => 11,
    }
}
