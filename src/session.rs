/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::session
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Session collaborator. Remote operations are gated on
    Session::is_logged_in; login transitions reach the client
    through CatalogClient::on_login_state_changed.

  Security / Safety Notes:
    Holds no credentials; only the logged-in verdict.

  Dependencies:
    None beyond std.

  Operational Scope:
    Implemented by hosts; SessionFlag covers the CLI and tests.

  Revision History:
    2026-09-15 COD  Defined session seam.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Narrow trait at the collaborator seam
============================================================*/

use std::sync::atomic::{AtomicBool, Ordering};

pub trait Session: Send + Sync {
    fn is_logged_in(&self) -> bool;
}

/// Shared login flag flipped by the host.
#[derive(Debug, Default)]
pub struct SessionFlag {
    logged_in: AtomicBool,
}

impl SessionFlag {
    pub fn new(logged_in: bool) -> Self {
        Self {
            logged_in: AtomicBool::new(logged_in),
        }
    }

    pub fn set(&self, logged_in: bool) {
        self.logged_in.store(logged_in, Ordering::SeqCst);
    }
}

impl Session for SessionFlag {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}
