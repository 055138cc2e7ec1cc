/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::transport
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Vocabulary shared by the catalog client and whatever
    performs network I/O: queued requests, their typed
    responses and the async transport contract.

  Security / Safety Notes:
    No I/O here. Implementations own authentication.

  Dependencies:
    tokio::sync::mpsc for out-of-band progress delivery.

  Operational Scope:
    The client queues TransportRequest values; the service
    (or a test) executes them and completes them by id.

  Revision History:
    2026-09-17 COD  Defined transport boundary.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Typed results instead of key/value payloads
    - Transport failures are values, never panics
============================================================*/

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use tokio::sync::mpsc::UnboundedSender;

use crate::downloads::DownloadOutcome;
use crate::error::TransportError;
use crate::package::UpdateHint;
use crate::payload::{ProductDetail, ProductPage};

/// Correlates a queued request with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    ListIds {
        offset: u32,
        limit: u32,
        search_text: String,
    },
    Detail {
        id: String,
    },
    UpdateCheck {
        ids: Vec<String>,
    },
    Download {
        id: String,
    },
    AbortDownload {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResponse {
    ListIds(Result<ProductPage, TransportError>),
    Detail(Result<ProductDetail, TransportError>),
    UpdateCheck(Result<HashMap<String, UpdateHint>, TransportError>),
    Download(DownloadOutcome),
    AbortAcknowledged,
}

/// Progress report delivered outside the request/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub package_id: String,
    pub message: String,
    pub bytes: u64,
    pub total: u64,
}

/// Handed to a download so it can report progress while it runs.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    package_id: String,
    tx: Option<UnboundedSender<ProgressReport>>,
}

impl ProgressSink {
    pub fn new(package_id: impl Into<String>, tx: UnboundedSender<ProgressReport>) -> Self {
        Self {
            package_id: package_id.into(),
            tx: Some(tx),
        }
    }

    /// Sink that discards every report.
    pub fn detached(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            tx: None,
        }
    }

    pub fn report(&self, message: &str, bytes: u64, total: u64) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the service shut down; nothing to tell.
            let _ = tx.send(ProgressReport {
                package_id: self.package_id.clone(),
                message: message.to_string(),
                bytes,
                total,
            });
        }
    }
}

/// Network side of the catalog. Every call fails fast; retry policy is the
/// implementation's business.
pub trait CatalogTransport: Send + Sync + 'static {
    fn list_ids(
        &self,
        offset: u32,
        limit: u32,
        search_text: &str,
    ) -> impl Future<Output = Result<ProductPage, TransportError>> + Send;

    fn detail(&self, id: &str) -> impl Future<Output = Result<ProductDetail, TransportError>> + Send;

    fn bulk_update_check(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<HashMap<String, UpdateHint>, TransportError>> + Send;

    /// Called synchronously before a download task is spawned, so an abort
    /// issued while the task is still queued finds something to flag.
    fn prepare_download(&self, _id: &str) {}

    fn download(&self, id: &str, progress: ProgressSink) -> impl Future<Output = DownloadOutcome> + Send;

    fn abort_download(&self, id: &str) -> impl Future<Output = ()> + Send;
}

/// Execute one queued request against `transport`.
pub async fn perform<T: CatalogTransport>(
    transport: &T,
    request: TransportRequest,
    progress: ProgressSink,
) -> TransportResponse {
    match request {
        TransportRequest::ListIds {
            offset,
            limit,
            search_text,
        } => TransportResponse::ListIds(transport.list_ids(offset, limit, &search_text).await),
        TransportRequest::Detail { id } => TransportResponse::Detail(transport.detail(&id).await),
        TransportRequest::UpdateCheck { ids } => {
            TransportResponse::UpdateCheck(transport.bulk_update_check(&ids).await)
        }
        TransportRequest::Download { id } => {
            TransportResponse::Download(transport.download(&id, progress).await)
        }
        TransportRequest::AbortDownload { id } => {
            transport.abort_download(&id).await;
            TransportResponse::AbortAcknowledged
        }
    }
}
