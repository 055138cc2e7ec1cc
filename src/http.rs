/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::http
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Talk to the Syn-Store catalog over HTTPS: product pages,
    product detail, bulk update checks and package downloads.

  Security / Safety Notes:
    Sends the session token as a bearer header. Downloads are
    written only beneath the configured download directory.

  Dependencies:
    reqwest for HTTP, serde_json for payloads, urlencoding for
    query composition, tokio for file output.

  Operational Scope:
    Executes the TransportRequest values queued by the catalog
    client on behalf of CatalogService.

  Revision History:
    2026-09-21 COD  Implemented catalog HTTP transport.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Fail fast; every failure becomes a TransportError value
    - Structured response parsing with explicit error paths
    - Abort observed between chunks, partial files removed
============================================================*/

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use urlencoding::encode;

use crate::config::SyncConfig;
use crate::downloads::{DownloadOutcome, DownloadState};
use crate::error::{Result, SyncError, TransportError};
use crate::logger::Logger;
use crate::package::UpdateHint;
use crate::payload::{check_error, decode_detail, decode_page, decode_update_check, ProductDetail, ProductPage};
use crate::transport::{CatalogTransport, ProgressSink};

/// Extension of downloaded package archives.
pub const PACKAGE_EXTENSION: &str = "pkg";

/// Abort signal shared between a running download and abort requests.
struct Transfer {
    aborted: AtomicBool,
    finished: watch::Sender<bool>,
}

impl Transfer {
    fn new() -> Self {
        Self {
            aborted: AtomicBool::new(false),
            finished: watch::Sender::new(false),
        }
    }

    fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }
}

/// Catalog transport backed by the Syn-Store HTTP API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    download_dir: PathBuf,
    transfers: Mutex<HashMap<String, Arc<Transfer>>>,
    logger: Arc<Logger>,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig, logger: Arc<Logger>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.catalog.timeout))
            .user_agent(concat!("Syn-Store/", env!("CARGO_PKG_VERSION"), " (linux)"))
            .build()
            .map_err(|err| SyncError::Network(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.catalog.base_url.trim_end_matches('/').to_string(),
            token: config.token().map(str::to_string),
            download_dir: config.download_dir(),
            transfers: Mutex::new(HashMap::new()),
            logger,
        })
    }

    /// Archive location for `id` beneath the download directory.
    pub fn archive_path(&self, id: &str) -> PathBuf {
        self.download_dir
            .join(format!("{}.{PACKAGE_EXTENSION}", encode(id)))
    }

    fn list_url(&self, offset: u32, limit: u32, search_text: &str) -> String {
        let mut url = format!("{}/products?offset={offset}&limit={limit}", self.base_url);
        if !search_text.is_empty() {
            url.push_str("&q=");
            url.push_str(&encode(search_text));
        }
        url
    }

    fn product_url(&self, id: &str) -> String {
        format!("{}/products/{}", self.base_url, encode(id))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json(&self, url: &str, builder: RequestBuilder) -> std::result::Result<Value, TransportError> {
        self.logger.debug("HTTP", format!("Requesting {url}"));
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|err| TransportError::new(format!("Request to {url} failed: {err}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::new(format!("Failed to read response from {url}: {err}")))?;

        if !status.is_success() {
            // Prefer the catalog's own message when the error body carries one.
            if let Ok(value) = serde_json::from_str::<Value>(&body) {
                check_error(&value)?;
            }
            return Err(TransportError::new(format!(
                "Request to {url} failed with status {status}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|err| TransportError::new(format!("Invalid JSON from {url}: {err}")))
    }

    /// Store a fresh transfer for `id`, replacing any earlier one.
    fn register_transfer(&self, id: &str) -> Arc<Transfer> {
        let transfer = Arc::new(Transfer::new());
        if let Ok(mut transfers) = self.transfers.lock() {
            transfers.insert(id.to_string(), Arc::clone(&transfer));
        }
        transfer
    }

    /// Transfer registered by `prepare_download`, or a new one.
    fn claim_transfer(&self, id: &str) -> Arc<Transfer> {
        match self.active_transfer(id) {
            Some(transfer) => transfer,
            None => self.register_transfer(id),
        }
    }

    fn release_transfer(&self, id: &str, transfer: &Arc<Transfer>) {
        if let Ok(mut transfers) = self.transfers.lock() {
            if transfers.get(id).is_some_and(|current| Arc::ptr_eq(current, transfer)) {
                transfers.remove(id);
            }
        }
        transfer.finished.send_replace(true);
    }

    fn active_transfer(&self, id: &str) -> Option<Arc<Transfer>> {
        self.transfers
            .lock()
            .ok()
            .and_then(|transfers| transfers.get(id).cloned())
            .filter(|transfer| !transfer.is_finished())
    }

    async fn stream_archive(
        &self,
        id: &str,
        progress: &ProgressSink,
        transfer: &Transfer,
    ) -> std::result::Result<DownloadOutcome, TransportError> {
        progress.report("connecting", 0, 0);
        let url = format!("{}/download", self.product_url(id));
        let mut response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|err| TransportError::new(format!("Download request to {url} failed: {err}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::new(format!(
                "Download of {id} failed with status {status}"
            )));
        }

        let total = response.content_length().unwrap_or(0);
        let path = self.archive_path(id);
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|err| {
                TransportError::new(format!(
                    "Failed to create download directory {}: {err}",
                    self.download_dir.display()
                ))
            })?;
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|err| TransportError::new(format!("Failed to create {}: {err}", path.display())))?;

        let mut received = 0_u64;
        loop {
            if transfer.aborted.load(Ordering::SeqCst) {
                drop(file);
                discard_partial(&path).await;
                self.logger.info("HTTP", format!("Download of {id} aborted at {received} bytes"));
                return Ok(DownloadOutcome {
                    state: DownloadState::Aborted,
                    error_message: None,
                });
            }

            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    drop(file);
                    discard_partial(&path).await;
                    return Err(TransportError::new(format!("Download of {id} interrupted: {err}")));
                }
            };
            if let Err(err) = file.write_all(&chunk).await {
                drop(file);
                discard_partial(&path).await;
                return Err(TransportError::new(format!("Failed to write {}: {err}", path.display())));
            }
            received += chunk.len() as u64;
            progress.report("downloading", received, total.max(received));
        }

        file.flush()
            .await
            .map_err(|err| TransportError::new(format!("Failed to flush {}: {err}", path.display())))?;
        self.logger.info(
            "HTTP",
            format!("Downloaded {id} ({received} bytes) to {}", path.display()),
        );
        Ok(DownloadOutcome::completed())
    }
}

/// Releases a transfer even when the download future is dropped or panics.
struct ReleaseOnDrop<'a> {
    transport: &'a HttpTransport,
    id: &'a str,
    transfer: &'a Arc<Transfer>,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.transport.release_transfer(self.id, self.transfer);
    }
}

async fn discard_partial(path: &Path) {
    // Best effort; a leftover partial is overwritten by the next attempt.
    let _ = tokio::fs::remove_file(path).await;
}

impl CatalogTransport for HttpTransport {
    async fn list_ids(
        &self,
        offset: u32,
        limit: u32,
        search_text: &str,
    ) -> std::result::Result<ProductPage, TransportError> {
        let url = self.list_url(offset, limit, search_text);
        let value = self.send_json(&url, self.client.get(&url)).await?;
        decode_page(value)
    }

    async fn detail(&self, id: &str) -> std::result::Result<ProductDetail, TransportError> {
        let url = self.product_url(id);
        let value = self.send_json(&url, self.client.get(&url)).await?;
        decode_detail(value)
    }

    async fn bulk_update_check(
        &self,
        ids: &[String],
    ) -> std::result::Result<HashMap<String, UpdateHint>, TransportError> {
        let url = format!("{}/updates", self.base_url);
        let body = json!({ "ids": ids });
        let value = self
            .send_json(&url, self.client.post(&url).json(&body))
            .await?;
        decode_update_check(value)
    }

    fn prepare_download(&self, id: &str) {
        self.register_transfer(id);
    }

    async fn download(&self, id: &str, progress: ProgressSink) -> DownloadOutcome {
        let transfer = self.claim_transfer(id);
        let _release = ReleaseOnDrop {
            transport: self,
            id,
            transfer: &transfer,
        };
        if transfer.aborted.load(Ordering::SeqCst) {
            self.logger.info("HTTP", format!("Download of {id} aborted before it started"));
            return DownloadOutcome {
                state: DownloadState::Aborted,
                error_message: None,
            };
        }
        match self.stream_archive(id, &progress, &transfer).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.logger.warn("HTTP", err.to_string());
                DownloadOutcome::failed(err.message)
            }
        }
    }

    /// Flag the running transfer and wait until it has stopped, so no
    /// progress for it is reported after this returns.
    async fn abort_download(&self, id: &str) {
        let Some(transfer) = self.active_transfer(id) else {
            self.logger.debug("HTTP", format!("No running download of {id} to abort"));
            return;
        };
        transfer.aborted.store(true, Ordering::SeqCst);
        let mut finished = transfer.finished.subscribe();
        // Err only when the sender is gone, which also means finished.
        let _ = finished.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        let mut config = SyncConfig::default();
        config.catalog.base_url = "https://catalog.test/api/".into();
        config.paths.download_dir = Some(PathBuf::from("/tmp/storesync-downloads"));
        HttpTransport::new(&config, Arc::new(Logger::silent())).unwrap()
    }

    #[test]
    fn list_url_encodes_search_text() {
        let transport = transport();
        assert_eq!(
            transport.list_url(25, 25, "terrain & water"),
            "https://catalog.test/api/products?offset=25&limit=25&q=terrain%20%26%20water"
        );
        assert_eq!(
            transport.list_url(0, 10, ""),
            "https://catalog.test/api/products?offset=0&limit=10"
        );
    }

    #[test]
    fn archive_path_stays_in_download_dir() {
        let transport = transport();
        let path = transport.archive_path("../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("/tmp/storesync-downloads")));
        assert_eq!(transport.archive_path("42"), PathBuf::from("/tmp/storesync-downloads/42.pkg"));
    }

    #[tokio::test]
    async fn abort_without_transfer_returns_immediately() {
        let transport = transport();
        transport.abort_download("missing").await;
        assert!(transport.active_transfer("missing").is_none());
    }

    #[tokio::test]
    async fn abort_waits_for_transfer_release() {
        let transport = Arc::new(transport());
        let transfer = transport.register_transfer("7");

        let aborter = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.abort_download("7").await })
        };
        while !transfer.aborted.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        assert!(!aborter.is_finished());
        transport.release_transfer("7", &transfer);

        aborter.await.unwrap();
        assert!(transport.active_transfer("7").is_none());
    }

    #[tokio::test]
    async fn every_concurrent_abort_returns_on_release() {
        let transport = Arc::new(transport());
        let transfer = transport.register_transfer("7");

        let aborters: Vec<_> = (0..2)
            .map(|_| {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move { transport.abort_download("7").await })
            })
            .collect();
        while transfer.finished.receiver_count() < 2 {
            tokio::task::yield_now().await;
        }
        transport.release_transfer("7", &transfer);

        for aborter in aborters {
            tokio::time::timeout(Duration::from_secs(2), aborter)
                .await
                .expect("abort did not return after release")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn abort_after_release_returns_immediately() {
        let transport = transport();
        let transfer = transport.register_transfer("7");
        transport.release_transfer("7", &transfer);

        tokio::time::timeout(Duration::from_secs(2), transport.abort_download("7"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn abort_before_transfer_starts_is_seen_by_download() {
        let transport = Arc::new(transport());
        transport.prepare_download("7");

        let aborter = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.abort_download("7").await })
        };
        let prepared = transport.active_transfer("7").unwrap();
        while !prepared.aborted.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        // The download picks up the prepared transfer and sees the abort.
        let claimed = transport.claim_transfer("7");
        assert!(Arc::ptr_eq(&claimed, &prepared));
        assert!(claimed.aborted.load(Ordering::SeqCst));
        assert!(!aborter.is_finished());

        transport.release_transfer("7", &claimed);
        aborter.await.unwrap();
    }

    #[tokio::test]
    async fn download_aborted_while_queued_never_connects() {
        let transport = Arc::new(transport());
        transport.prepare_download("7");
        transport.active_transfer("7").unwrap().aborted.store(true, Ordering::SeqCst);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = transport.download("7", ProgressSink::new("7", tx)).await;

        assert_eq!(outcome.state, DownloadState::Aborted);
        assert!(rx.try_recv().is_err());
        assert!(transport.active_transfer("7").is_none());
    }
}
