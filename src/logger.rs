/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Provide structured, append-only logging for the catalog
    client, its transports and the storesync binary.

  Security / Safety Notes:
    Callers never pass session tokens to the logger; entries
    carry package ids, paths and remote messages only.

  Dependencies:
    chrono for UTC stamps, sha2 for session log digests.

  Operational Scope:
    Shared behind an Arc by the client, the HTTP transport and
    the directory inventory. Safe to call from tokio tasks.

  Revision History:
    2026-09-14 COD  Adopted Synavera logger for Syn-Store.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Graceful error propagation on I/O failures
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};

/// Structured log level for Syn-Store events.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Where stderr output goes for a given level.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Echo {
    /// Warnings and errors always, everything else when verbose.
    Stderr { verbose: bool },
    Off,
}

/// Shared logger that emits append-only entries in Synavera format.
pub struct Logger {
    file: Option<Mutex<BufWriter<File>>>,
    path: Option<PathBuf>,
    echo: Echo,
}

impl Logger {
    /// Build a logger that writes to stderr and optionally to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let file = match path {
            Some(ref file_path) => Some(Mutex::new(BufWriter::new(open_append(file_path)?))),
            None => None,
        };

        Ok(Self {
            file,
            path,
            echo: Echo::Stderr { verbose },
        })
    }

    /// Logger that drops every entry. Used when embedding the core in a host
    /// that owns its own diagnostics, and in tests.
    pub fn silent() -> Self {
        Self {
            file: None,
            path: None,
            echo: Echo::Off,
        }
    }

    /// Emit a log entry with the given level, code, and message.
    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        if self.echo == Echo::Off && self.file.is_none() {
            return;
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!(
            "{timestamp} [{}] [{}] {}",
            level.as_str(),
            code,
            message.as_ref()
        );

        if let Echo::Stderr { verbose } = self.echo {
            if verbose || level == LogLevel::Error || level == LogLevel::Warn {
                eprintln!("{payload}");
            }
        }

        if let Some(file) = &self.file {
            if let Ok(mut guard) = file.lock() {
                if writeln!(guard, "{payload}").is_err() || guard.flush().is_err() {
                    eprintln!(
                        "{timestamp} [{}] [LOGGER] Failed to write to log file",
                        LogLevel::Error.as_str()
                    );
                }
            }
        }
    }

    /// Convenience wrapper for `INFO` level events.
    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    /// Convenience wrapper for `WARN` level events.
    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    /// Convenience wrapper for `ERROR` level events.
    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Convenience wrapper for `DEBUG` level events.
    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    /// Return the path backing this logger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Compute and persist SHA-256 digest of the log file.
    pub fn finalize(&self) -> Result<()> {
        let Some(path) = self.path() else {
            return Ok(());
        };

        if let Some(file) = &self.file {
            if let Ok(mut guard) = file.lock() {
                guard.flush()?;
            }
        }

        let data = std::fs::read(path).map_err(|err| {
            SyncError::Filesystem(format!(
                "Failed to read log for hashing {}: {err}",
                path.display()
            ))
        })?;
        let digest = Sha256::digest(&data);

        let mut hash_os = path.as_os_str().to_os_string();
        hash_os.push(".hash");
        let hash_path = PathBuf::from(hash_os);
        let line = format!(
            "{:x}  {}\n",
            digest,
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        std::fs::write(&hash_path, line).map_err(|err| {
            SyncError::Filesystem(format!(
                "Failed to write hash file {}: {err}",
                hash_path.display()
            ))
        })
    }
}

fn open_append(file_path: &Path) -> Result<File> {
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            SyncError::Filesystem(format!(
                "Failed to create log directory {}: {err}",
                parent.display()
            ))
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .map_err(|err| {
            SyncError::Filesystem(format!(
                "Failed to open log file {}: {err}",
                file_path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_writes_digest_next_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("session.log");
        let logger = Logger::new(Some(log_path.clone()), false).unwrap();
        logger.info("INIT", "hello");
        logger.debug("DETAIL", "quiet on stderr, kept in file");
        logger.finalize().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("[INFO] [INIT] hello"));
        assert!(contents.contains("[DEBUG] [DETAIL]"));

        let hash = std::fs::read_to_string(dir.path().join("logs").join("session.log.hash")).unwrap();
        assert!(hash.trim_end().ends_with("  session.log"));
        assert_eq!(hash.split_whitespace().next().unwrap().len(), 64);
    }

    #[test]
    fn silent_logger_has_no_path() {
        let logger = Logger::silent();
        logger.error("X", "dropped");
        assert!(logger.path().is_none());
        logger.finalize().unwrap();
    }
}
