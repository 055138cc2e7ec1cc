/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::store
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Hold the process-wide client state (downloads, update
    hints, fetched ids, setup flag) and flatten it into a
    snapshot that survives host restarts.

  Security / Safety Notes:
    Snapshots are written to operator-controlled paths and
    never contain session tokens.

  Dependencies:
    serde / serde_json for snapshot files, chrono for stamps.

  Operational Scope:
    Owned by CatalogClient; the host calls snapshot/restore at
    its own lifecycle points.

  Revision History:
    2026-09-17 COD  Introduced explicit snapshot boundary.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Restore replaces, never merges
    - Deterministic ordering for reproducible snapshots
============================================================*/

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::downloads::{DownloadManager, DownloadProgress};
use crate::error::{Result, SyncError};
use crate::package::UpdateHint;

#[derive(Debug, Default)]
pub struct StateStore {
    pub downloads: DownloadManager,
    pub update_hints: HashMap<String, UpdateHint>,
    pub fetched: HashSet<String>,
    pub setup_done: bool,
}

/// Flattened, serialisable form of [`StateStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub saved_at: String,
    #[serde(default)]
    pub downloads: Vec<DownloadProgress>,
    #[serde(default)]
    pub update_hints: Vec<(String, UpdateHint)>,
    #[serde(default)]
    pub fetched_ids: Vec<String>,
    #[serde(default)]
    pub setup_done: bool,
}

impl StateStore {
    pub fn snapshot(&self) -> Snapshot {
        let mut downloads: Vec<DownloadProgress> = self.downloads.records().cloned().collect();
        downloads.sort_by(|a, b| a.package_id.cmp(&b.package_id));

        let mut update_hints: Vec<(String, UpdateHint)> = self
            .update_hints
            .iter()
            .map(|(id, hint)| (id.clone(), *hint))
            .collect();
        update_hints.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fetched_ids: Vec<String> = self.fetched.iter().cloned().collect();
        fetched_ids.sort();

        Snapshot {
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            downloads,
            update_hints,
            fetched_ids,
            setup_done: self.setup_done,
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.downloads.replace_all(snapshot.downloads);
        self.update_hints = snapshot.update_hints.into_iter().collect();
        self.fetched = snapshot.fetched_ids.into_iter().collect();
        self.setup_done = snapshot.setup_done;
    }

    /// Session-scoped reset; downloads and the setup flag survive.
    pub fn reset(&mut self) {
        self.update_hints.clear();
        self.fetched.clear();
    }
}

impl Snapshot {
    /// Load a snapshot file; a missing file yields an empty snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).map_err(|err| {
            SyncError::Filesystem(format!(
                "Failed to open state file {}: {err}",
                path.display()
            ))
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            SyncError::Serialization(format!(
                "Failed to parse state file {}: {err}",
                path.display()
            ))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                SyncError::Filesystem(format!(
                    "Failed to create state directory {}: {err}",
                    parent.display()
                ))
            })?;
        }
        let file = File::create(path).map_err(|err| {
            SyncError::Filesystem(format!(
                "Failed to create state file {}: {err}",
                path.display()
            ))
        })?;
        serde_json::to_writer_pretty(file, self).map_err(|err| {
            SyncError::Serialization(format!(
                "Failed to write state file {}: {err}",
                path.display()
            ))
        })
    }
}
