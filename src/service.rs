/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::service
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Drive a CatalogClient against an async CatalogTransport:
    execute queued requests on tokio tasks and feed their
    results and progress back into the client.

  Security / Safety Notes:
    Only this task touches the client; transport tasks talk
    back through channels.

  Dependencies:
    tokio for tasks, channels and select.

  Operational Scope:
    Used by the storesync binary and by integration-style tests
    with scripted transports.

  Revision History:
    2026-09-21 COD  Authored tokio service loop.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Single logical thread for all client state
    - Task failures mapped to typed responses, never hangs
============================================================*/

use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::client::CatalogClient;
use crate::downloads::DownloadOutcome;
use crate::error::TransportError;
use crate::logger::Logger;
use crate::transport::{perform, CatalogTransport, ProgressReport, ProgressSink, RequestId, TransportRequest, TransportResponse};

type Completion = (RequestId, TransportResponse);

pub struct CatalogService<T: CatalogTransport> {
    client: CatalogClient,
    transport: Arc<T>,
    logger: Arc<Logger>,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: UnboundedReceiver<Completion>,
    progress_tx: UnboundedSender<ProgressReport>,
    progress_rx: UnboundedReceiver<ProgressReport>,
}

impl<T: CatalogTransport> CatalogService<T> {
    pub fn new(client: CatalogClient, transport: Arc<T>, logger: Arc<Logger>) -> Self {
        let (completions_tx, completions_rx) = unbounded_channel();
        let (progress_tx, progress_rx) = unbounded_channel();
        Self {
            client,
            transport,
            logger,
            completions_tx,
            completions_rx,
            progress_tx,
            progress_rx,
        }
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut CatalogClient {
        &mut self.client
    }

    pub fn into_client(self) -> CatalogClient {
        self.client
    }

    /// Pump requests, progress and completions until nothing is in flight.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.dispatch();
            if self.client.in_flight() == 0 {
                // Reports sent by tasks that already finished.
                while let Ok(report) = self.progress_rx.try_recv() {
                    self.apply_progress(report);
                }
                if self.client.in_flight() == 0 {
                    break;
                }
                continue;
            }

            tokio::select! {
                // Progress first: a transfer's reports precede its completion.
                biased;
                Some(report) = self.progress_rx.recv() => self.apply_progress(report),
                Some((id, response)) = self.completions_rx.recv() => {
                    self.client.complete(id, response);
                }
            }
        }
    }

    fn apply_progress(&mut self, report: ProgressReport) {
        self.client
            .on_download_progress(&report.package_id, &report.message, report.bytes, report.total);
    }

    fn dispatch(&mut self) {
        for (id, request) in self.client.take_requests() {
            self.logger
                .debug("DISPATCH", format!("Request {id}: {request:?}"));
            let sink = match &request {
                TransportRequest::Download { id } => {
                    self.transport.prepare_download(id);
                    ProgressSink::new(id.clone(), self.progress_tx.clone())
                }
                _ => ProgressSink::detached(String::new()),
            };
            let transport = Arc::clone(&self.transport);
            let tx = self.completions_tx.clone();
            let logger = Arc::clone(&self.logger);

            tokio::spawn(async move {
                let fallback = request.clone();
                let task = tokio::spawn(async move { perform(&*transport, request, sink).await });
                let response = match task.await {
                    Ok(response) => response,
                    Err(err) => {
                        logger.error("DISPATCH", format!("Transport task for {id} failed: {err}"));
                        failure_response(&fallback, format!("Transport task failed: {err}"))
                    }
                };
                // Receiver gone means the service was dropped.
                let _ = tx.send((id, response));
            });
        }
    }
}

/// Response reporting `request` as failed with `message`.
fn failure_response(request: &TransportRequest, message: String) -> TransportResponse {
    match request {
        TransportRequest::ListIds { .. } => TransportResponse::ListIds(Err(TransportError::new(message))),
        TransportRequest::Detail { .. } => TransportResponse::Detail(Err(TransportError::new(message))),
        TransportRequest::UpdateCheck { .. } => {
            TransportResponse::UpdateCheck(Err(TransportError::new(message)))
        }
        TransportRequest::Download { .. } => TransportResponse::Download(DownloadOutcome::failed(message)),
        TransportRequest::AbortDownload { .. } => TransportResponse::AbortAcknowledged,
    }
}
