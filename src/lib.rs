/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Catalog synchronisation core: reconcile remote catalog
    entries with installed packages, track downloads and
    broadcast every change to subscribers.

  Security / Safety Notes:
    Remote work is gated on the session; local metadata is
    parsed leniently and never trusted for paths.

  Dependencies:
    See Cargo.toml; the core itself needs only serde, chrono
    and tokio channels.

  Operational Scope:
    Embedded by hosts through CatalogClient (sans-IO) or
    CatalogService (tokio + HttpTransport).

  Revision History:
    2026-09-14 COD  Split Syn-Store core into a library.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear module boundaries
    - Result-first error handling at the host edge
============================================================*/

pub mod client;
pub mod config;
pub mod downloads;
pub mod error;
pub mod events;
pub mod http;
pub mod inventory;
pub mod logger;
pub mod package;
pub mod payload;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{CatalogClient, ListQuery};
pub use config::SyncConfig;
pub use downloads::{DownloadProgress, DownloadState};
pub use error::{OperationError, Result, SyncError, TransportError};
pub use events::{CatalogEvent, EventBus, SubscriptionId};
pub use http::HttpTransport;
pub use inventory::{DirectoryInventory, LocalInventory, LocalPackage, MemoryInventory};
pub use logger::Logger;
pub use package::{Package, PackageState, UpdateHint, VersionInfo};
pub use service::CatalogService;
pub use session::{Session, SessionFlag};
pub use store::Snapshot;
pub use transport::{CatalogTransport, ProgressSink, RequestId, TransportRequest, TransportResponse};
