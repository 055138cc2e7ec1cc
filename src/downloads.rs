/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::downloads
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Per-package download bookkeeping: the state machine, the
    dedup rule for concurrent requests and abort handling.

  Security / Safety Notes:
    Bookkeeping only; transfers are performed by the transport
    and this module never touches the filesystem.

  Dependencies:
    serde for snapshot persistence.

  Operational Scope:
    Owned by the state store and driven by the catalog client
    from commands and transport callbacks.

  Revision History:
    2026-09-16 COD  Implemented download state machine.
  ------------------------------------------------------------
  SSE Principles Observed:
    - One live transfer per package id
    - Stale callbacks cannot overwrite a newer attempt
============================================================*/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Keeps download keys apart from other progress registries.
pub const DOWNLOAD_KEY_PREFIX: &str = "content__";

/// Message set on a record when an abort is confirmed.
pub const ABORTED_MESSAGE: &str = "Download aborted";

pub fn download_key(package_id: &str) -> String {
    if package_id.starts_with(DOWNLOAD_KEY_PREFIX) {
        package_id.to_string()
    } else {
        format!("{DOWNLOAD_KEY_PREFIX}{package_id}")
    }
}

/// Catalog id for a possibly prefixed download key.
pub fn catalog_id(key: &str) -> &str {
    key.strip_prefix(DOWNLOAD_KEY_PREFIX).unwrap_or(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadState {
    Started,
    InProgress,
    Decrypting,
    Completed,
    Aborted,
    Error,
}

impl DownloadState {
    /// Map a transport progress message onto a state. Exact match only.
    pub fn from_message(message: &str) -> Self {
        match message {
            "ok" => DownloadState::Completed,
            "connecting" => DownloadState::Started,
            "downloading" => DownloadState::InProgress,
            "decrypt" => DownloadState::Decrypting,
            "aborted" => DownloadState::Aborted,
            _ => DownloadState::Error,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Aborted | DownloadState::Error
        )
    }

    /// Started or InProgress: the states an abort applies to.
    pub fn is_transferring(self) -> bool {
        matches!(self, DownloadState::Started | DownloadState::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub package_id: String,
    pub state: DownloadState,
    pub current: u64,
    pub total: u64,
    pub message: String,
    /// Distinguishes successive transfers of the same package.
    #[serde(default)]
    pub attempt: u64,
}

impl DownloadProgress {
    fn new(package_id: &str, state: DownloadState, attempt: u64) -> Self {
        Self {
            package_id: catalog_id(package_id).to_string(),
            state,
            current: 0,
            total: 0,
            message: String::new(),
            attempt,
        }
    }
}

/// Terminal result reported when a transport download call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub state: DownloadState,
    pub error_message: Option<String>,
}

impl DownloadOutcome {
    pub fn completed() -> Self {
        Self {
            state: DownloadState::Completed,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: DownloadState::Error,
            error_message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginDownload {
    /// A non-terminal record exists; nothing new was started.
    AlreadyRunning(DownloadProgress),
    /// A fresh record was stored; the caller issues the transfer.
    Started(DownloadProgress),
}

#[derive(Debug, Default)]
pub struct DownloadManager {
    records: HashMap<String, DownloadProgress>,
    next_attempt: u64,
}

impl DownloadManager {
    pub fn get(&self, package_id: &str) -> Option<&DownloadProgress> {
        self.records.get(&download_key(package_id))
    }

    pub fn begin(&mut self, package_id: &str) -> BeginDownload {
        let key = download_key(package_id);
        if let Some(existing) = self.records.get(&key) {
            if !existing.state.is_terminal() {
                return BeginDownload::AlreadyRunning(existing.clone());
            }
            self.records.remove(&key);
        }

        let progress = DownloadProgress::new(package_id, DownloadState::Started, self.bump_attempt());
        self.records.insert(key, progress.clone());
        BeginDownload::Started(progress)
    }

    /// Apply the transport's terminal report for `attempt`. Returns `None`
    /// when the record is gone or belongs to a newer attempt.
    pub fn finish(
        &mut self,
        package_id: &str,
        attempt: u64,
        outcome: DownloadOutcome,
    ) -> Option<DownloadProgress> {
        let progress = self
            .records
            .get_mut(&download_key(package_id))
            .filter(|progress| progress.attempt == attempt)?;
        progress.state = outcome.state;
        if outcome.state == DownloadState::Error {
            if let Some(message) = outcome.error_message {
                progress.message = message;
            }
        }
        Some(progress.clone())
    }

    pub fn can_abort(&self, package_id: &str) -> bool {
        self.get(package_id)
            .is_some_and(|progress| progress.state.is_transferring())
    }

    /// Finalise an acknowledged abort of `attempt` and drop the record.
    /// Returns `None` when the record is gone or belongs to a newer attempt.
    pub fn confirm_abort(&mut self, package_id: &str, attempt: u64) -> Option<DownloadProgress> {
        let key = download_key(package_id);
        if self.records.get(&key)?.attempt != attempt {
            return None;
        }
        let mut progress = self.records.remove(&key)?;
        progress.state = DownloadState::Aborted;
        progress.current = progress.total;
        progress.message = ABORTED_MESSAGE.to_string();
        Some(progress)
    }

    /// Record an out-of-band progress report, creating the record when the
    /// transfer was started outside this session.
    pub fn apply_progress(
        &mut self,
        package_id: &str,
        message: &str,
        bytes: u64,
        total: u64,
    ) -> DownloadProgress {
        let attempt = self.next_attempt;
        let mut created = false;
        let progress = self
            .records
            .entry(download_key(package_id))
            .or_insert_with(|| {
                created = true;
                let mut progress =
                    DownloadProgress::new(package_id, DownloadState::InProgress, attempt);
                progress.message = "downloading".to_string();
                progress
            });
        progress.current = bytes;
        progress.total = total;
        progress.message = message.to_string();
        progress.state = DownloadState::from_message(message);
        let snapshot = progress.clone();

        if created {
            self.next_attempt += 1;
        }
        snapshot
    }

    /// Drop every record; returns the ids that were still transferring.
    pub fn abort_all(&mut self) -> Vec<String> {
        let mut active: Vec<String> = self
            .records
            .values()
            .filter(|progress| progress.state.is_transferring())
            .map(|progress| progress.package_id.clone())
            .collect();
        active.sort();
        self.records.clear();
        active
    }

    pub fn is_any_in_progress(&self) -> bool {
        self.records
            .values()
            .any(|progress| progress.state.is_transferring())
    }

    pub fn is_in_progress(&self, package_id: &str) -> bool {
        self.get(package_id)
            .is_some_and(|progress| progress.state.is_transferring())
    }

    /// Record exists and has not reached a terminal state (decrypting counts).
    pub fn is_active(&self, package_id: &str) -> bool {
        self.get(package_id)
            .is_some_and(|progress| !progress.state.is_terminal())
    }

    pub fn records(&self) -> impl Iterator<Item = &DownloadProgress> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn replace_all(&mut self, records: Vec<DownloadProgress>) {
        self.next_attempt = records.iter().map(|p| p.attempt + 1).max().unwrap_or(0);
        self.records = records
            .into_iter()
            .map(|progress| (download_key(&progress.package_id), progress))
            .collect();
    }

    fn bump_attempt(&mut self) -> u64 {
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn message_table() {
        let cases = [
            ("ok", DownloadState::Completed),
            ("connecting", DownloadState::Started),
            ("downloading", DownloadState::InProgress),
            ("decrypt", DownloadState::Decrypting),
            ("aborted", DownloadState::Aborted),
            ("gibberish", DownloadState::Error),
            ("OK", DownloadState::Error),
        ];
        for (message, expected) in cases {
            let mut manager = DownloadManager::default();
            let progress = manager.apply_progress("9", message, 10, 20);
            assert_eq!(progress.state, expected, "message {message:?}");
            assert_eq!((progress.current, progress.total), (10, 20));
            assert_eq!(progress.message, message);
        }
    }

    #[test]
    fn key_prefix_is_applied_once() {
        assert_eq!(download_key("12"), "content__12");
        assert_eq!(download_key("content__12"), "content__12");
        assert_eq!(catalog_id("content__12"), "12");
        assert_eq!(catalog_id("12"), "12");
    }

    #[test]
    fn begin_dedups_non_terminal_records() {
        let mut manager = DownloadManager::default();
        let BeginDownload::Started(first) = manager.begin("1") else {
            panic!("expected a fresh record");
        };
        manager.apply_progress("1", "decrypt", 5, 5);
        match manager.begin("1") {
            BeginDownload::AlreadyRunning(progress) => {
                assert_eq!(progress.attempt, first.attempt);
                assert_eq!(progress.state, DownloadState::Decrypting);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn begin_replaces_terminal_record() {
        let mut manager = DownloadManager::default();
        manager.begin("1");
        manager.apply_progress("1", "ok", 5, 5);
        let BeginDownload::Started(progress) = manager.begin("1") else {
            panic!("terminal record should be superseded");
        };
        assert_eq!(progress.state, DownloadState::Started);
        assert_eq!(progress.current, 0);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn stale_finish_is_ignored() {
        let mut manager = DownloadManager::default();
        let BeginDownload::Started(old) = manager.begin("1") else {
            panic!()
        };
        manager.apply_progress("1", "broken pipe", 0, 0);
        manager.begin("1");

        assert!(manager.finish("1", old.attempt, DownloadOutcome::completed()).is_none());
        assert_eq!(manager.get("1").unwrap().state, DownloadState::Started);
    }

    #[test]
    fn finish_copies_error_message() {
        let mut manager = DownloadManager::default();
        let BeginDownload::Started(progress) = manager.begin("1") else {
            panic!()
        };
        let finished = manager
            .finish("1", progress.attempt, DownloadOutcome::failed("disk full"))
            .unwrap();
        assert_eq!(finished.state, DownloadState::Error);
        assert_eq!(finished.message, "disk full");
    }

    #[test]
    fn confirm_abort_completes_bar_and_removes() {
        let mut manager = DownloadManager::default();
        let BeginDownload::Started(started) = manager.begin("1") else {
            panic!("expected a fresh record");
        };
        manager.apply_progress("1", "downloading", 30, 100);
        assert!(manager.can_abort("1"));

        let aborted = manager.confirm_abort("1", started.attempt).unwrap();
        assert_eq!(aborted.state, DownloadState::Aborted);
        assert_eq!(aborted.current, 100);
        assert_eq!(aborted.message, ABORTED_MESSAGE);
        assert!(manager.get("1").is_none());
        assert!(!manager.can_abort("1"));
    }

    #[test]
    fn abort_acknowledged_for_superseded_attempt_is_ignored() {
        let mut manager = DownloadManager::default();
        let BeginDownload::Started(first) = manager.begin("1") else {
            panic!("expected a fresh record");
        };
        manager.finish("1", first.attempt, DownloadOutcome::failed("reset"));
        let BeginDownload::Started(second) = manager.begin("1") else {
            panic!("expected a fresh record");
        };

        assert!(manager.confirm_abort("1", first.attempt).is_none());
        assert_eq!(manager.get("1").map(|p| p.attempt), Some(second.attempt));
        assert_eq!(manager.get("1").map(|p| p.state), Some(DownloadState::Started));
    }

    #[test]
    fn decrypting_is_not_abortable() {
        let mut manager = DownloadManager::default();
        manager.apply_progress("1", "decrypt", 1, 1);
        assert!(!manager.can_abort("1"));
        assert!(!manager.is_in_progress("1"));
        assert!(manager.is_active("1"));
    }

    #[test]
    fn abort_all_collects_transferring_only() {
        let mut manager = DownloadManager::default();
        manager.begin("a");
        manager.apply_progress("b", "downloading", 1, 2);
        manager.apply_progress("c", "ok", 2, 2);
        assert!(manager.is_any_in_progress());

        assert_eq!(manager.abort_all(), vec!["a".to_string(), "b".to_string()]);
        assert!(manager.is_empty());
        assert!(!manager.is_any_in_progress());
    }

    #[test]
    fn restored_records_keep_attempts_unique() {
        let mut manager = DownloadManager::default();
        let mut restored = DownloadProgress::new("5", DownloadState::InProgress, 7);
        restored.total = 50;
        manager.replace_all(vec![restored]);

        assert!(manager.is_in_progress("content__5"));
        manager.apply_progress("6", "downloading", 0, 1);
        assert_eq!(manager.get("6").unwrap().attempt, 8);
    }
}
