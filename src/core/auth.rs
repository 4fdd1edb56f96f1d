//! Purpose: Decide which authentication mode a connection uses before any I/O happens.
//! Exports: `Authenticator`, `TlsMaterial`, `NegotiatedAuth`, `negotiate`.
//! Role: Pure validation step run by `ClientSession::connect` ahead of transport creation.
//! Invariants: Client certificates and the certificate authenticator are always paired.
//! Invariants: Misconfiguration surfaces as `ErrorKind::Configuration` and never reaches the network.
use super::error::{Error, ErrorKind};
use std::fmt;
use std::path::PathBuf;

pub(crate) const MIXED_AUTH_MESSAGE: &str =
    "mixed authentication: certificate and authenticator must be paired";

/// Caller-supplied credentials. Exactly one kind is active.
#[derive(Clone, PartialEq, Eq)]
pub enum Authenticator {
    Password { username: String, password: String },
    Certificate,
}

impl Authenticator {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn certificate() -> Self {
        Self::Certificate
    }

    fn is_certificate(&self) -> bool {
        matches!(self, Authenticator::Certificate)
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Authenticator::Certificate => f.write_str("Certificate"),
        }
    }
}

/// TLS files resolved from the connection string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TlsMaterial {
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl TlsMaterial {
    pub fn has_client_certificate(&self) -> bool {
        self.client_cert.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.ca_cert.is_none() && self.client_cert.is_none() && self.client_key.is_none()
    }
}

/// Outcome of negotiation, consumed by the transport.
#[derive(Clone, PartialEq, Eq)]
pub enum NegotiatedAuth {
    Password { username: String, password: String },
    ClientCertificate { cert: PathBuf, key: PathBuf },
}

impl fmt::Debug for NegotiatedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiatedAuth::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            NegotiatedAuth::ClientCertificate { cert, key } => f
                .debug_struct("ClientCertificate")
                .field("cert", cert)
                .field("key", key)
                .finish(),
        }
    }
}

pub fn negotiate(
    tls: Option<&TlsMaterial>,
    authenticator: Option<&Authenticator>,
) -> Result<NegotiatedAuth, Error> {
    let client_cert = tls.and_then(|tls| tls.client_cert.clone());
    let client_key = tls.and_then(|tls| tls.client_key.clone());
    let wants_certificate = authenticator.is_some_and(Authenticator::is_certificate);

    if client_cert.is_some() != wants_certificate {
        return Err(Error::new(ErrorKind::Configuration)
            .with_message(MIXED_AUTH_MESSAGE)
            .with_hint("Use a certificate authenticator together with certpath/keypath, or neither."));
    }

    match authenticator {
        Some(Authenticator::Password { username, password }) => Ok(NegotiatedAuth::Password {
            username: username.clone(),
            password: password.clone(),
        }),
        Some(Authenticator::Certificate) => match (client_cert, client_key) {
            (Some(cert), Some(key)) => Ok(NegotiatedAuth::ClientCertificate { cert, key }),
            _ => Err(Error::new(ErrorKind::Configuration)
                .with_message("client certificate requires a private key")
                .with_hint("Set keypath alongside certpath.")),
        },
        None => Err(Error::new(ErrorKind::Configuration)
            .with_message("no authenticator configured")
            .with_hint("Supply a password or certificate authenticator.")),
    }
}
