/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Syn-Store error types. Separates the cloneable
    operation errors delivered through events from host-level
    failures that carry exit semantics.

  Security / Safety Notes:
    Error contexts never embed session tokens; only ids,
    paths and remote messages are exposed.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    OperationError travels through the event bus; SyncError is
    returned by configuration, persistence and CLI plumbing.

  Revision History:
    2026-09-14 COD  Established shared error definitions.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No failure crosses the public operation boundary
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for Syn-Store host plumbing.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure reported by the catalog transport (network or payload decoding).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure surfaced to subscribers through the `OperationError` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("User not logged in")]
    NotAuthenticated,
    #[error("Transport: {0}")]
    Transport(#[from] TransportError),
    #[error("Malformed local metadata for {id}: {reason}")]
    MalformedLocalMetadata { id: String, reason: String },
}

/// Enumerates host-level error domains surfaced by Syn-Store.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Network: {0}")]
    Network(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyncError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SyncError::Config(_) => ExitCode::from(20),
            SyncError::Network(_) => ExitCode::from(30),
            SyncError::Serialization(_) => ExitCode::from(31),
            SyncError::Filesystem(_) => ExitCode::from(40),
            SyncError::Io(_) => ExitCode::from(41),
            SyncError::Runtime(_) => ExitCode::from(50),
            SyncError::Operation(OperationError::NotAuthenticated) => ExitCode::from(60),
            SyncError::Operation(_) => ExitCode::from(61),
        }
    }
}
