//! Purpose: Manage design documents (view indexes) for one bucket over the HTTP surface.
//! Exports: `ViewIndexManager`, `DesignDocument`, `View`, `ViewOptions`.
//! Role: Stateless request/response wrapper; publish is get(dev) → upsert(prod) → drop(dev).
//! Invariants: Documents handed to callers always carry the logical (marker-free) name.
//! Invariants: Publish never drops the development copy before the production upsert succeeded,
//!             and never rolls back a successful upsert.
//! Invariants: One round trip per call; no retries.
#![allow(clippy::result_large_err)]

use crate::core::agent::{HttpMethod, HttpRequest, HttpResponse, HttpSurface, ServiceType};
use crate::core::context::OpContext;
use crate::core::error::{Error, ErrorKind};
use crate::core::namespace::{
    DesignDocumentNamespace, logical_name, namespace_of, physical_name, storage_id_to_physical,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

impl View {
    pub fn map_only(map: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            reduce: None,
        }
    }

    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }

    pub fn has_reduce(&self) -> bool {
        self.reduce.as_deref().is_some_and(|reduce| !reduce.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDocument {
    #[serde(skip)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub views: BTreeMap<String, View>,
}

impl DesignDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            views: BTreeMap::new(),
        }
    }

    pub fn with_view(mut self, name: impl Into<String>, view: View) -> Self {
        self.views.insert(name.into(), view);
        self
    }
}

/// Per-call deadline and cancellation.
#[derive(Clone, Debug, Default)]
pub struct ViewOptions {
    pub timeout: Option<Duration>,
    pub context: Option<OpContext>,
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_context(mut self, context: OpContext) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Deserialize)]
struct DesignDocumentList {
    #[serde(default)]
    rows: Vec<DesignDocumentRow>,
}

#[derive(Deserialize)]
struct DesignDocumentRow {
    doc: DesignDocumentRowDoc,
}

#[derive(Deserialize)]
struct DesignDocumentRowDoc {
    meta: DesignDocumentMeta,
    #[serde(default)]
    json: DesignDocument,
}

#[derive(Deserialize)]
struct DesignDocumentMeta {
    id: String,
}

#[derive(Clone)]
pub struct ViewIndexManager {
    bucket: String,
    http: HttpSurface,
    default_timeout: Duration,
}

impl ViewIndexManager {
    pub fn new(bucket: impl Into<String>, http: HttpSurface, default_timeout: Duration) -> Self {
        Self {
            bucket: bucket.into(),
            http,
            default_timeout,
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    pub fn get_design_document(
        &self,
        name: &str,
        namespace: DesignDocumentNamespace,
        opts: &ViewOptions,
    ) -> Result<DesignDocument, Error> {
        self.get_with(&self.context(opts), name, namespace)
    }

    pub fn get_all_design_documents(
        &self,
        namespace: DesignDocumentNamespace,
        opts: &ViewOptions,
    ) -> Result<Vec<DesignDocument>, Error> {
        const OP: &str = "get_all_design_documents";
        let ctx = self.context(opts);
        let request = HttpRequest::new(
            ServiceType::Management,
            HttpMethod::Get,
            ["pools", "default", "buckets", self.bucket.as_str(), "ddocs"],
        );
        let response = self.send(&ctx, OP, request)?;
        if response.status != 200 {
            return Err(index_error(OP, &response));
        }

        let list: DesignDocumentList = decode_json(&response.body, OP)?;
        let docs = list
            .rows
            .into_iter()
            .filter_map(|row| {
                let physical = storage_id_to_physical(&row.doc.meta.id);
                if namespace_of(physical) != namespace {
                    return None;
                }
                let mut doc = row.doc.json;
                doc.name = logical_name(physical);
                Some(doc)
            })
            .collect();
        Ok(docs)
    }

    pub fn upsert_design_document(
        &self,
        doc: &DesignDocument,
        namespace: DesignDocumentNamespace,
        opts: &ViewOptions,
    ) -> Result<(), Error> {
        self.upsert_with(&self.context(opts), doc, namespace)
    }

    pub fn drop_design_document(
        &self,
        name: &str,
        namespace: DesignDocumentNamespace,
        opts: &ViewOptions,
    ) -> Result<(), Error> {
        self.drop_with(&self.context(opts), name, namespace)
    }

    /// Promotes the development copy of `name` to production, then removes the development copy.
    ///
    /// The three steps share one deadline. A `PublishCleanupFailed` error means the
    /// production copy is live and the development copy survived; retrying the drop
    /// or keeping the orphan is the caller's decision.
    pub fn publish_design_document(&self, name: &str, opts: &ViewOptions) -> Result<(), Error> {
        const OP: &str = "publish_design_document";
        let ctx = self.context(opts);

        let source = match self.get_with(&ctx, name, DesignDocumentNamespace::Development) {
            Ok(doc) => doc,
            Err(err) if err.kind() == ErrorKind::IndexNotFound => {
                return Err(Error::wrap(ErrorKind::PublishSourceMissing, err)
                    .with_message(format!("development design document {name:?} does not exist"))
                    .with_operation(OP));
            }
            Err(err) => return Err(err),
        };

        self.upsert_with(&ctx, &source, DesignDocumentNamespace::Production)
            .map_err(|err| {
                Error::wrap(ErrorKind::PublishUpsertFailed, err)
                    .with_message(format!(
                        "failed to create production design document {name:?}"
                    ))
                    .with_operation(OP)
            })?;

        if let Err(err) = self.drop_with(&ctx, &source.name, DesignDocumentNamespace::Development) {
            warn!(
                bucket = %self.bucket,
                name = %source.name,
                error = %err,
                "design document published but development copy was not dropped"
            );
            return Err(Error::wrap(ErrorKind::PublishCleanupFailed, err)
                .with_message(format!(
                    "design document {name:?} published but the development copy could not be dropped"
                ))
                .with_hint("Retry drop_design_document(name, Development) or keep the orphan.")
                .with_operation(OP));
        }

        debug!(bucket = %self.bucket, name = %source.name, "design document published");
        Ok(())
    }

    fn get_with(
        &self,
        ctx: &OpContext,
        name: &str,
        namespace: DesignDocumentNamespace,
    ) -> Result<DesignDocument, Error> {
        const OP: &str = "get_design_document";
        let physical = physical_name(name, namespace);
        let request = HttpRequest::new(
            ServiceType::Views,
            HttpMethod::Get,
            [self.bucket.as_str(), "_design", physical.as_str()],
        );
        let response = self.send(ctx, OP, request)?;
        match response.status {
            200 => {
                let mut doc: DesignDocument = decode_json(&response.body, OP)?;
                doc.name = logical_name(&physical);
                Ok(doc)
            }
            404 => Err(not_found_error(OP, &physical, &response)),
            _ => Err(index_error(OP, &response)),
        }
    }

    fn upsert_with(
        &self,
        ctx: &OpContext,
        doc: &DesignDocument,
        namespace: DesignDocumentNamespace,
    ) -> Result<(), Error> {
        const OP: &str = "upsert_design_document";
        let body = serde_json::to_vec(doc).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode design document")
                .with_operation(OP)
                .with_source(err)
        })?;
        let physical = physical_name(&doc.name, namespace);
        let request = HttpRequest::new(
            ServiceType::Views,
            HttpMethod::Put,
            [self.bucket.as_str(), "_design", physical.as_str()],
        )
        .with_json_body(body);
        let response = self.send(ctx, OP, request)?;
        match response.status {
            201 => Ok(()),
            _ => Err(index_error(OP, &response)),
        }
    }

    fn drop_with(
        &self,
        ctx: &OpContext,
        name: &str,
        namespace: DesignDocumentNamespace,
    ) -> Result<(), Error> {
        const OP: &str = "drop_design_document";
        let physical = physical_name(name, namespace);
        let request = HttpRequest::new(
            ServiceType::Views,
            HttpMethod::Delete,
            [self.bucket.as_str(), "_design", physical.as_str()],
        );
        let response = self.send(ctx, OP, request)?;
        match response.status {
            200 => Ok(()),
            404 => Err(not_found_error(OP, &physical, &response)),
            _ => Err(index_error(OP, &response)),
        }
    }

    fn context(&self, opts: &ViewOptions) -> OpContext {
        opts.context
            .clone()
            .unwrap_or_default()
            .with_timeout(opts.timeout.unwrap_or(self.default_timeout))
    }

    fn send(
        &self,
        ctx: &OpContext,
        operation: &'static str,
        request: HttpRequest,
    ) -> Result<HttpResponse, Error> {
        ctx.check(operation)?;
        debug!(operation, path = %request.path(), "view index request");
        self.http
            .do_http_request(request.with_deadline(ctx.deadline()))
            .map_err(|err| match err.operation() {
                Some(_) => err,
                None => err.with_operation(operation),
            })
    }
}

fn not_found_error(operation: &'static str, physical: &str, response: &HttpResponse) -> Error {
    Error::new(ErrorKind::IndexNotFound)
        .with_message(format!("design document {physical:?} not found"))
        .with_operation(operation)
        .with_status(response.status)
        .with_body(response.body_text())
}

fn index_error(operation: &'static str, response: &HttpResponse) -> Error {
    Error::new(ErrorKind::Index)
        .with_message("unexpected management response")
        .with_operation(operation)
        .with_status(response.status)
        .with_body(response.body_text())
}

fn decode_json<T>(body: &[u8], operation: &'static str) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("invalid design document json")
            .with_operation(operation)
            .with_source(err)
    })
}
