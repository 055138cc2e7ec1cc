/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::inventory
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Enumerate packages already installed on disk together with
    their sidecar metadata.

  Security / Safety Notes:
    Read-only directory traversal limited to one level below
    the configured install root; symlinked sidecars are read
    like regular files.

  Dependencies:
    std::fs only.

  Operational Scope:
    Supplies the catalog client and the reconciler with local
    inventory data.

  Revision History:
    2026-09-15 COD  Crafted directory inventory scanner.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering of scan results
    - Unreadable entries are logged and skipped
============================================================*/

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::logger::Logger;
use crate::payload::LocalMetadata;

/// File name of the installed-package sidecar.
pub const SIDECAR_FILE: &str = "package.json";

/// A package present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    pub install_path: String,
    /// Raw sidecar content.
    pub metadata: String,
}

impl LocalPackage {
    pub fn new(install_path: impl Into<String>, metadata: impl Into<String>) -> Self {
        Self {
            install_path: install_path.into(),
            metadata: metadata.into(),
        }
    }

    pub fn sidecar(&self) -> Option<LocalMetadata> {
        LocalMetadata::parse(&self.metadata)
    }
}

/// Source of installed-package records.
pub trait LocalInventory: Send + Sync {
    fn list_installed(&self) -> Vec<LocalPackage>;
}

/// Scans `<root>/<package>/package.json`.
pub struct DirectoryInventory {
    root: PathBuf,
    logger: Arc<Logger>,
}

impl DirectoryInventory {
    pub fn new(root: impl Into<PathBuf>, logger: Arc<Logger>) -> Self {
        Self {
            root: root.into(),
            logger,
        }
    }
}

impl LocalInventory for DirectoryInventory {
    fn list_installed(&self) -> Vec<LocalPackage> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                self.logger.debug(
                    "INVENTORY",
                    format!("Install root {} not readable: {err}", self.root.display()),
                );
                return Vec::new();
            }
        };

        let mut packages = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let sidecar = path.join(SIDECAR_FILE);
            if !sidecar.is_file() {
                continue;
            }
            match std::fs::read_to_string(&sidecar) {
                Ok(metadata) => {
                    packages.push(LocalPackage::new(path.to_string_lossy(), metadata));
                }
                Err(err) => self.logger.warn(
                    "INVENTORY",
                    format!("Skipping unreadable sidecar {}: {err}", sidecar.display()),
                ),
            }
        }

        packages.sort_by(|a, b| a.install_path.cmp(&b.install_path));
        packages
    }
}

/// In-memory inventory whose contents the host replaces wholesale.
#[derive(Default)]
pub struct MemoryInventory {
    packages: Mutex<Vec<LocalPackage>>,
}

impl MemoryInventory {
    pub fn new(packages: Vec<LocalPackage>) -> Self {
        Self {
            packages: Mutex::new(packages),
        }
    }

    pub fn replace(&self, packages: Vec<LocalPackage>) {
        if let Ok(mut guard) = self.packages.lock() {
            *guard = packages;
        }
    }
}

impl LocalInventory for MemoryInventory {
    fn list_installed(&self) -> Vec<LocalPackage> {
        self.packages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_scan_reads_sidecars_in_order() {
        let root = tempfile::tempdir().unwrap();
        for (dir, id) in [("b-pack", "2"), ("a-pack", "1")] {
            let path = root.path().join(dir);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(
                path.join(SIDECAR_FILE),
                format!(r#"{{"id": "{id}", "version": "1.0"}}"#),
            )
            .unwrap();
        }
        std::fs::create_dir_all(root.path().join("no-sidecar")).unwrap();
        std::fs::write(root.path().join("stray.txt"), "x").unwrap();

        let inventory = DirectoryInventory::new(root.path(), Arc::new(Logger::silent()));
        let installed = inventory.list_installed();

        assert_eq!(installed.len(), 2);
        assert!(installed[0].install_path.ends_with("a-pack"));
        assert_eq!(installed[0].sidecar().unwrap().id, "1");
        assert_eq!(installed[1].sidecar().unwrap().id, "2");
    }

    #[test]
    fn missing_root_is_empty() {
        let inventory = DirectoryInventory::new("/nonexistent/storesync", Arc::new(Logger::silent()));
        assert!(inventory.list_installed().is_empty());
    }

    #[test]
    fn memory_inventory_replaces_contents() {
        let inventory = MemoryInventory::default();
        assert!(inventory.list_installed().is_empty());
        inventory.replace(vec![LocalPackage::new("/p", "{}")]);
        assert_eq!(inventory.list_installed().len(), 1);
    }
}
