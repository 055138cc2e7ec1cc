/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::client
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Orchestrate catalog list/detail/update-check calls and the
    download lifecycle, merging remote answers with the local
    inventory and the cached update hints.

  Security / Safety Notes:
    Every remote operation is gated on the session. Failures
    resolve into events; nothing is thrown to the caller.

  Dependencies:
    None beyond crate modules; I/O is delegated through the
    queued TransportRequest values.

  Operational Scope:
    Single logical thread: commands and completions are applied
    one at a time by the owner (CatalogService or a test).

  Revision History:
    2026-09-18 COD  Authored catalog client core.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-free public surface; errors become events
    - Deduplicated work and bracketed batches
    - Structured logging following Synavera cadence
============================================================*/

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::downloads::{catalog_id, BeginDownload, DownloadOutcome, DownloadProgress};
use crate::error::{OperationError, TransportError};
use crate::events::{CatalogEvent, EventBus};
use crate::inventory::{LocalInventory, LocalPackage};
use crate::logger::Logger;
use crate::package::{Package, PackageState, UpdateHint, VersionInfo};
use crate::payload::{ProductDetail, ProductPage};
use crate::reconcile::{reconcile, scan_local_versions};
use crate::session::Session;
use crate::store::{Snapshot, StateStore};
use crate::transport::{RequestId, TransportRequest, TransportResponse};


/// Installed packages keyed by their sidecar id.
type LocalIndex = HashMap<String, LocalPackage>;

/// Parameters of one catalog page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub offset: u32,
    pub limit: u32,
    pub search_text: String,
    pub fetch_details: bool,
}

impl ListQuery {
    pub fn page(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit,
            search_text: String::new(),
            fetch_details: true,
        }
    }
}

/// Work to resume once the update hints are refreshed.
enum AfterHints {
    Fetch { id: String, local: LocalIndex },
    List { query: ListQuery, local: LocalIndex },
}

/// Continuation for an issued request.
enum Pending {
    HintRefresh { then: AfterHints },
    List { local: LocalIndex, fetch_details: bool },
    Detail { batch: u64, id: String },
    Download { id: String, attempt: u64 },
    Abort { id: String, attempt: u64 },
    AbortDetached { id: String },
}

impl Pending {
    fn label(&self) -> &'static str {
        match self {
            Pending::HintRefresh { .. } => "update-check",
            Pending::List { .. } => "list",
            Pending::Detail { .. } => "detail",
            Pending::Download { .. } => "download",
            Pending::Abort { .. } | Pending::AbortDetached { .. } => "abort",
        }
    }
}

/// Countdown shared by the detail fetches of one batch.
struct DetailBatch {
    remaining: usize,
    local: LocalIndex,
}

pub struct CatalogClient {
    store: StateStore,
    events: EventBus,
    session: Arc<dyn Session>,
    inventory: Arc<dyn LocalInventory>,
    logger: Arc<Logger>,
    outbox: VecDeque<(RequestId, TransportRequest)>,
    pending: HashMap<RequestId, Pending>,
    batches: HashMap<u64, DetailBatch>,
    aborting: HashSet<String>,
    next_request: u64,
    next_batch: u64,
    progress_registered: bool,
}

impl CatalogClient {
    pub fn new(
        session: Arc<dyn Session>,
        inventory: Arc<dyn LocalInventory>,
        events: EventBus,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            store: StateStore::default(),
            events,
            session,
            inventory,
            logger,
            outbox: VecDeque::new(),
            pending: HashMap::new(),
            batches: HashMap::new(),
            aborting: HashSet::new(),
            next_request: 0,
            next_batch: 0,
            progress_registered: false,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Start listening to session changes and, when logged in, to download
    /// progress.
    pub fn setup(&mut self) {
        if self.store.setup_done {
            self.logger.debug("SETUP", "Client already set up; resyncing session");
        }
        self.store.setup_done = true;
        self.progress_registered = self.session.is_logged_in();
        self.logger.info(
            "SETUP",
            format!("Catalog client ready (logged_in={})", self.progress_registered),
        );
    }

    /// Stop listening to every collaborator.
    pub fn clear(&mut self) {
        if !self.store.setup_done {
            self.logger.debug("CLEAR", "Clear called before setup");
        }
        self.store.setup_done = false;
        self.progress_registered = false;
    }

    /// Forget update hints and fetched ids for a new session.
    pub fn reset(&mut self) {
        self.store.reset();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.store.restore(snapshot);
    }

    pub fn on_login_state_changed(&mut self, logged_in: bool) {
        if !self.store.setup_done {
            self.logger.debug("SESSION", "Login change ignored; client not set up");
            return;
        }
        self.progress_registered = logged_in;
        if logged_in {
            self.logger.info("SESSION", "Logged in; progress delegate registered");
        } else {
            self.logger.info("SESSION", "Logged out; aborting active downloads");
            self.abort_all_downloads();
        }
    }

    pub fn fetch(&mut self, id: &str) {
        if !self.require_session() {
            return;
        }

        let local = self.local_index();
        if local.contains_key(id) {
            self.refresh_update_hints(
                vec![id.to_string()],
                AfterHints::Fetch {
                    id: id.to_string(),
                    local,
                },
            );
        } else {
            self.fetch_internal(id, local);
        }
    }

    pub fn list(&mut self, query: ListQuery) {
        if !self.require_session() {
            return;
        }

        self.events.emit(CatalogEvent::ListStart);
        let local = self.local_index();
        if query.offset == 0 {
            let mut ids: Vec<String> = local.keys().cloned().collect();
            ids.sort();
            self.refresh_update_hints(ids, AfterHints::List { query, local });
        } else {
            self.list_internal(query, local);
        }
    }

    /// Fetch detail for `ids` without list or placeholder handling.
    pub fn fetch_details(&mut self, ids: &[String]) {
        if !self.require_session() {
            return;
        }
        let local = self.local_index();
        self.fetch_details_internal(ids.to_vec(), local);
    }

    /// Reconcile caller-held packages with a fresh inventory scan and emit
    /// one batch with the packages that changed.
    pub fn refresh(&mut self, packages: &mut [Package]) {
        if packages.is_empty() || !self.session.is_logged_in() {
            return;
        }

        let locals = scan_local_versions(&self.inventory.list_installed());
        let mut changed = Vec::new();
        for package in packages.iter_mut() {
            if reconcile(package, locals.get(package.id())) {
                self.record_hint(package);
                changed.push(package.clone());
            }
        }

        self.logger.debug(
            "REFRESH",
            format!("{} of {} packages changed", changed.len(), packages.len()),
        );
        if !changed.is_empty() {
            self.events.emit(CatalogEvent::PackagesChanged(changed));
        }
    }

    pub fn refresh_one(&mut self, package: &mut Package) {
        self.refresh(std::slice::from_mut(package));
    }

    pub fn download(&mut self, id: &str) {
        if !self.require_session() {
            return;
        }

        match self.store.downloads.begin(id) {
            BeginDownload::AlreadyRunning(progress) => {
                self.logger.debug("DOWNLOAD", format!("{id} already downloading"));
                self.events.emit(CatalogEvent::DownloadProgress(progress));
            }
            BeginDownload::Started(progress) => {
                let attempt = progress.attempt;
                let id = catalog_id(id).to_string();
                self.events.emit(CatalogEvent::DownloadProgress(progress));
                self.logger.info("DOWNLOAD", format!("Starting download of {id}"));
                self.issue(
                    TransportRequest::Download { id: id.clone() },
                    Pending::Download { id, attempt },
                );
            }
        }
    }

    /// Ask the transport to stop `id`. A second call while the first abort
    /// is unacknowledged does nothing.
    pub fn abort_download(&mut self, id: &str) {
        let attempt = match self.store.downloads.get(id) {
            Some(progress) if progress.state.is_transferring() => progress.attempt,
            _ => return,
        };
        let id = catalog_id(id).to_string();
        if !self.aborting.insert(id.clone()) {
            self.logger.debug("ABORT", format!("Abort of {id} already requested"));
            return;
        }
        self.logger.info("ABORT", format!("Aborting download of {id}"));
        self.issue(
            TransportRequest::AbortDownload { id: id.clone() },
            Pending::Abort { id, attempt },
        );
    }

    /// Out-of-band progress from the transport.
    pub fn on_download_progress(&mut self, id: &str, message: &str, bytes: u64, total: u64) {
        if !self.progress_registered {
            self.logger.debug(
                "PROGRESS",
                format!("Dropping progress for {id}; delegate not registered"),
            );
            return;
        }
        let progress = self.store.downloads.apply_progress(id, message, bytes, total);
        self.events.emit(CatalogEvent::DownloadProgress(progress));
    }

    /// Clear every record at once, then ask the transport to stop the ones
    /// that were still transferring.
    pub fn abort_all_downloads(&mut self) {
        let active = self.store.downloads.abort_all();
        self.aborting.clear();
        if !active.is_empty() {
            self.logger.info("ABORT", format!("Aborting {} downloads", active.len()));
        }
        for id in active {
            self.issue(
                TransportRequest::AbortDownload { id: id.clone() },
                Pending::AbortDetached { id },
            );
        }
    }

    pub fn is_any_download_in_progress(&self) -> bool {
        self.store.downloads.is_any_in_progress()
    }

    pub fn is_download_in_progress(&self, id: &str) -> bool {
        self.store.downloads.is_in_progress(id)
    }

    pub fn download_progress(&self, id: &str) -> Option<&DownloadProgress> {
        self.store.downloads.get(id)
    }

    /// Drain the requests queued since the last call.
    pub fn take_requests(&mut self) -> Vec<(RequestId, TransportRequest)> {
        self.outbox.drain(..).collect()
    }

    /// Number of issued requests still awaiting completion.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn complete(&mut self, request: RequestId, response: TransportResponse) {
        let Some(pending) = self.pending.remove(&request) else {
            self.logger.warn("COMPLETE", format!("Unknown request {request}; dropped"));
            return;
        };

        let label = pending.label();
        match (pending, response) {
            (Pending::HintRefresh { then }, TransportResponse::UpdateCheck(result)) => {
                self.apply_update_hints(result);
                self.resume(then);
            }
            (Pending::List { local, fetch_details }, TransportResponse::ListIds(result)) => {
                self.on_list_result(result, local, fetch_details);
            }
            (Pending::Detail { batch, id }, TransportResponse::Detail(result)) => {
                self.on_detail_result(batch, &id, result);
            }
            (Pending::Download { id, attempt }, TransportResponse::Download(outcome)) => {
                self.on_download_finished(&id, attempt, outcome);
            }
            (Pending::Abort { id, attempt }, TransportResponse::AbortAcknowledged) => {
                self.aborting.remove(&id);
                if let Some(progress) = self.store.downloads.confirm_abort(&id, attempt) {
                    self.events.emit(CatalogEvent::DownloadProgress(progress));
                }
            }
            (Pending::AbortDetached { id }, TransportResponse::AbortAcknowledged) => {
                self.logger.debug("ABORT", format!("Abort of {id} acknowledged"));
            }
            (pending, response) => {
                let message = format!("Request {request} expected a {label} response, got {response:?}");
                self.logger.error("COMPLETE", &message);
                self.fail_pending(pending, TransportError::new(message));
            }
        }
    }

    /// Resolve `pending` as if its request had failed with `err`, so batches
    /// and download records still reach their end.
    fn fail_pending(&mut self, pending: Pending, err: TransportError) {
        match pending {
            Pending::HintRefresh { then } => {
                self.apply_update_hints(Err(err));
                self.resume(then);
            }
            Pending::List { local, fetch_details } => {
                self.on_list_result(Err(err), local, fetch_details);
            }
            Pending::Detail { batch, id } => self.on_detail_result(batch, &id, Err(err)),
            Pending::Download { id, attempt } => {
                self.on_download_finished(&id, attempt, DownloadOutcome::failed(err.message));
            }
            Pending::Abort { id, .. } => {
                self.aborting.remove(&id);
            }
            Pending::AbortDetached { .. } => {}
        }
    }

    fn issue(&mut self, request: TransportRequest, pending: Pending) {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.pending.insert(id, pending);
        self.outbox.push_back((id, request));
    }

    fn require_session(&self) -> bool {
        if self.session.is_logged_in() {
            return true;
        }
        self.events
            .emit(CatalogEvent::OperationError(OperationError::NotAuthenticated));
        false
    }

    /// Index installed packages by id. Ids seen for the first time get an
    /// UpToDate hint so the next update-check covers them.
    fn local_index(&mut self) -> LocalIndex {
        let mut local = LocalIndex::new();
        for package in self.inventory.list_installed() {
            let Some(sidecar) = package.sidecar() else {
                continue;
            };
            self.store
                .update_hints
                .entry(sidecar.id.clone())
                .or_insert(UpdateHint::UpToDate);
            local.insert(sidecar.id, package);
        }
        local
    }

    /// Re-check `ids` currently believed UpToDate, then continue with `then`.
    fn refresh_update_hints(&mut self, ids: Vec<String>, then: AfterHints) {
        let stale: Vec<String> = ids
            .into_iter()
            .filter(|id| self.store.update_hints.get(id) == Some(&UpdateHint::UpToDate))
            .collect();

        if stale.is_empty() {
            self.resume(then);
        } else {
            self.logger
                .debug("HINTS", format!("Checking updates for {} packages", stale.len()));
            self.issue(
                TransportRequest::UpdateCheck { ids: stale },
                Pending::HintRefresh { then },
            );
        }
    }

    fn apply_update_hints(&mut self, result: Result<HashMap<String, UpdateHint>, TransportError>) {
        match result {
            Ok(hints) => self.store.update_hints.extend(hints),
            // Stale hints are still usable; continue with what we have.
            Err(err) => self
                .logger
                .warn("HINTS", format!("Update check failed: {err}")),
        }
    }

    fn resume(&mut self, then: AfterHints) {
        match then {
            AfterHints::Fetch { id, local } => self.fetch_internal(&id, local),
            AfterHints::List { query, local } => self.list_internal(query, local),
        }
    }

    fn fetch_internal(&mut self, id: &str, local: LocalIndex) {
        if !self.store.fetched.contains(id) {
            self.events
                .emit(CatalogEvent::PackagesChanged(vec![Package::placeholder(id)]));
        }
        self.fetch_details_internal(vec![id.to_string()], local);
        self.events.emit(CatalogEvent::ProductFetched(id.to_string()));
    }

    fn list_internal(&mut self, query: ListQuery, local: LocalIndex) {
        self.issue(
            TransportRequest::ListIds {
                offset: query.offset,
                limit: query.limit,
                search_text: query.search_text,
            },
            Pending::List {
                local,
                fetch_details: query.fetch_details,
            },
        );
    }

    fn on_list_result(
        &mut self,
        result: Result<ProductPage, TransportError>,
        local: LocalIndex,
        fetch_details: bool,
    ) {
        let mut page = match result {
            Ok(page) => page,
            Err(err) => {
                self.logger.warn("LIST", format!("Product list failed: {err}"));
                self.events.emit(CatalogEvent::ListFinish);
                self.events
                    .emit(CatalogEvent::OperationError(OperationError::Transport(err)));
                return;
            }
        };

        if !self.session.is_logged_in() {
            page.total = 0;
            page.ids.clear();
        }

        self.events.emit(CatalogEvent::ProductListFetched {
            page: page.clone(),
            fetch_details,
        });

        if page.ids.is_empty() {
            self.events.emit(CatalogEvent::ListFinish);
            return;
        }

        let placeholders: Vec<Package> = page
            .ids
            .iter()
            .filter(|id| !self.store.fetched.contains(*id))
            .map(Package::placeholder)
            .collect();
        if !placeholders.is_empty() {
            self.events.emit(CatalogEvent::PackagesChanged(placeholders));
        }

        self.events.emit(CatalogEvent::ListFinish);

        if fetch_details {
            self.fetch_details_internal(page.ids, local);
        }
    }

    fn fetch_details_internal(&mut self, ids: Vec<String>, local: LocalIndex) {
        if ids.is_empty() {
            return;
        }

        self.events.emit(CatalogEvent::FetchDetailsStart);

        let batch = self.next_batch;
        self.next_batch += 1;
        self.batches.insert(
            batch,
            DetailBatch {
                remaining: ids.len(),
                local,
            },
        );
        for id in ids {
            self.issue(
                TransportRequest::Detail { id: id.clone() },
                Pending::Detail { batch, id },
            );
        }
    }

    fn on_detail_result(
        &mut self,
        batch: u64,
        id: &str,
        result: Result<ProductDetail, TransportError>,
    ) {
        let local = self
            .batches
            .get(&batch)
            .and_then(|detail_batch| detail_batch.local.get(id))
            .cloned();
        let package = self.build_package(id, result, local.as_ref());
        self.events.emit(CatalogEvent::PackagesChanged(vec![package]));

        let finished = match self.batches.get_mut(&batch) {
            Some(detail_batch) => {
                detail_batch.remaining = detail_batch.remaining.saturating_sub(1);
                detail_batch.remaining == 0
            }
            None => false,
        };
        if finished {
            self.batches.remove(&batch);
            self.events.emit(CatalogEvent::FetchDetailsFinish);
        }
    }

    fn build_package(
        &mut self,
        id: &str,
        result: Result<ProductDetail, TransportError>,
        local: Option<&LocalPackage>,
    ) -> Package {
        let detail = match result {
            Ok(detail) => detail,
            Err(err) => {
                self.logger.warn("DETAIL", format!("Detail for {id} failed: {err}"));
                return Package::failed(id, err);
            }
        };

        let install_path = local.map(|l| l.install_path.as_str()).unwrap_or_default();
        let mut package = detail.into_package(id, install_path);
        if let Some(hint) = self.store.update_hints.get(id) {
            package.set_state((*hint).into());
        }

        if package.state() == PackageState::Outdated && !install_path.is_empty() {
            package.set_fetched_local_path("");
            if let Some(local) = local {
                // Lossy by intent: a bad sidecar still leaves the remote data.
                match installed_version(id, local) {
                    Ok(version) => package.set_local_version(version),
                    Err(err) => self.logger.warn("SIDECAR", err.to_string()),
                }
            }
            // Installed release is the latest one; the cached hint was stale.
            if package.local_version().is_none() && package.installed_version().is_some() {
                package.set_state(PackageState::UpToDate);
                self.record_hint(&package);
            }
        }

        if self.store.downloads.is_active(id) {
            package.set_state(PackageState::InProgress);
        }

        self.store.fetched.insert(id.to_string());
        package
    }

    fn on_download_finished(&mut self, id: &str, attempt: u64, outcome: DownloadOutcome) {
        match self.store.downloads.finish(id, attempt, outcome) {
            Some(progress) => {
                self.logger.info(
                    "DOWNLOAD",
                    format!("Download of {id} finished: {:?}", progress.state),
                );
                self.events.emit(CatalogEvent::DownloadProgress(progress));
            }
            None => self.logger.debug(
                "DOWNLOAD",
                format!("Ignoring result for superseded download of {id}"),
            ),
        }
    }

    fn record_hint(&mut self, package: &Package) {
        if let (Some(hint), Some(cached)) = (
            package.state().as_hint(),
            self.store.update_hints.get_mut(package.id()),
        ) {
            *cached = hint;
        }
    }
}

/// Installed release read from the sidecar of `local`.
fn installed_version(id: &str, local: &LocalPackage) -> Result<VersionInfo, OperationError> {
    let malformed = |reason: &str| OperationError::MalformedLocalMetadata {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    let sidecar = local.sidecar().ok_or_else(|| malformed("unparseable sidecar"))?;
    if sidecar.version.is_empty() {
        return Err(malformed("missing version"));
    }
    Ok(sidecar.version_info(&local.install_path))
}
