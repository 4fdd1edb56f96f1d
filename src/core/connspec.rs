//! Purpose: Parse connection strings into the immutable `ConnectionSpec` a session bootstraps from.
//! Exports: `ConnectionSpec`, `SeedAddress`, service port constants.
//! Role: First configuration step; all failures are `ErrorKind::Configuration`.
//! Invariants: Grammar is `couchbase[s]://host[:port][,host[:port]...][/bucket][?key=value&...]`.
//! Invariants: TLS material is only accepted on the TLS scheme.
use super::auth::TlsMaterial;
use super::error::{Error, ErrorKind};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const MGMT_PORT: u16 = 8091;
pub const MGMT_TLS_PORT: u16 = 18091;
pub const VIEWS_PORT: u16 = 8092;
pub const VIEWS_TLS_PORT: u16 = 18092;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SeedAddress {
    pub host: String,
    /// Explicit management port; `None` uses the scheme default.
    pub port: Option<u16>,
}

impl fmt::Display for SeedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => write!(f, "{host}:{port}"),
            None => f.write_str(&host),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub seeds: Vec<SeedAddress>,
    pub use_tls: bool,
    pub bucket: Option<String>,
    pub tls: TlsMaterial,
    pub connect_timeout: Option<Duration>,
}

impl ConnectionSpec {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let (scheme, rest) = raw.split_once("://").ok_or_else(|| {
            config_error("connection string is missing a scheme")
                .with_hint("Use couchbase://host or couchbases://host.")
        })?;
        let use_tls = match scheme {
            "couchbase" => false,
            "couchbases" => true,
            other => {
                return Err(config_error(format!("unsupported scheme {other:?}"))
                    .with_hint("Use couchbase:// or couchbases://."));
            }
        };

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let (hosts, bucket) = match location.split_once('/') {
            Some((hosts, bucket)) if !bucket.is_empty() => (hosts, Some(bucket.to_string())),
            Some((hosts, _)) => (hosts, None),
            None => (location, None),
        };

        let seeds = hosts
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| parse_seed(entry.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if seeds.is_empty() {
            return Err(config_error("connection string has no hosts"));
        }

        let mut spec = ConnectionSpec {
            seeds,
            use_tls,
            bucket,
            tls: TlsMaterial::default(),
            connect_timeout: None,
        };
        if let Some(query) = query {
            spec.apply_query(query)?;
        }
        if !spec.use_tls && !spec.tls.is_empty() {
            return Err(config_error("TLS material requires the couchbases:// scheme"));
        }
        Ok(spec)
    }

    /// Returns a copy bound to `bucket`.
    pub fn with_bucket(&self, bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..self.clone()
        }
    }

    pub fn mgmt_port(&self, seed: &SeedAddress) -> u16 {
        seed.port
            .unwrap_or(if self.use_tls { MGMT_TLS_PORT } else { MGMT_PORT })
    }

    pub fn views_port(&self) -> u16 {
        if self.use_tls { VIEWS_TLS_PORT } else { VIEWS_PORT }
    }

    fn apply_query(&mut self, query: &str) -> Result<(), Error> {
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| config_error(format!("option {pair:?} is missing a value")))?;
            match key {
                "certpath" => self.tls.client_cert = Some(PathBuf::from(value)),
                "keypath" => self.tls.client_key = Some(PathBuf::from(value)),
                "cacertpath" => self.tls.ca_cert = Some(PathBuf::from(value)),
                "connect_timeout" => {
                    let millis = value.parse::<u64>().map_err(|err| {
                        config_error("connect_timeout must be a number of milliseconds")
                            .with_source(err)
                    })?;
                    self.connect_timeout = Some(Duration::from_millis(millis));
                }
                other => warn!(option = %other, "ignoring unknown connection string option"),
            }
        }
        Ok(())
    }
}

fn parse_seed(entry: &str) -> Result<SeedAddress, Error> {
    if let Some(stripped) = entry.strip_prefix('[') {
        let (host, tail) = stripped
            .split_once(']')
            .ok_or_else(|| config_error(format!("unterminated IPv6 host {entry:?}")))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(parse_port(port)?),
            None if tail.is_empty() => None,
            None => return Err(config_error(format!("invalid host {entry:?}"))),
        };
        return Ok(SeedAddress {
            host: host.to_string(),
            port,
        });
    }
    match entry.split_once(':') {
        Some((host, port)) if !host.is_empty() => Ok(SeedAddress {
            host: host.to_string(),
            port: Some(parse_port(port)?),
        }),
        Some(_) => Err(config_error(format!("invalid host {entry:?}"))),
        None => Ok(SeedAddress {
            host: entry.to_string(),
            port: None,
        }),
    }
}

fn parse_port(raw: &str) -> Result<u16, Error> {
    raw.parse::<u16>()
        .map_err(|err| config_error(format!("invalid port {raw:?}")).with_source(err))
}

fn config_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Configuration).with_message(message)
}
