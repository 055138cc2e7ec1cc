/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load operator configuration for the catalog endpoint, the
    session token and the on-disk locations Syn-Store uses.

  Security / Safety Notes:
    The session token may come from the file or from the
    STORESYNC_TOKEN environment variable; it is never logged.

  Dependencies:
    toml + serde for parsing, dirs for default locations.

  Operational Scope:
    Read once at startup by the storesync binary.

  Revision History:
    2026-09-20 COD  Authored configuration loader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit defaults for every field
    - Validation before any network activity
============================================================*/

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SyncError};

/// Environment variable overriding `[session] token`.
pub const TOKEN_ENV: &str = "STORESYNC_TOKEN";

const APP_DIR: &str = "storesync";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub catalog: CatalogConfig,
    pub session: SessionConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub page_size: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://catalog.synavera.local/api/v1".into(),
            timeout: 30,
            page_size: 25,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub install_root: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl SyncConfig {
    /// Load from `path` when given (it must exist), else from the user config
    /// directory when a file is present, else defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(SyncError::Config(format!(
                        "Config file {} does not exist",
                        path.display()
                    )));
                }
                Self::load_file(path)?
            }
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.session.token = Some(token);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            SyncError::Config(format!("Failed to read config {}: {err}", path.display()))
        })?;
        Self::parse(&raw)
            .map_err(|err| SyncError::Config(format!("{}: {err}", path.display())))
    }

    fn parse(raw: &str) -> std::result::Result<Self, String> {
        toml::from_str(raw).map_err(|err| format!("invalid TOML: {err}"))
    }

    fn validate(&self) -> Result<()> {
        if self.catalog.base_url.trim().is_empty() {
            return Err(SyncError::Config("catalog.base_url must not be empty".into()));
        }
        if self.catalog.timeout == 0 {
            return Err(SyncError::Config("catalog.timeout must be at least 1".into()));
        }
        if self.catalog.page_size == 0 {
            return Err(SyncError::Config("catalog.page_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn token(&self) -> Option<&str> {
        self.session
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    pub fn install_root(&self) -> PathBuf {
        self.paths
            .install_root
            .clone()
            .unwrap_or_else(|| data_dir().join("packages"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.paths
            .download_dir
            .clone()
            .unwrap_or_else(|| cache_dir().join("downloads"))
    }

    pub fn state_file(&self) -> PathBuf {
        self.paths
            .state_file
            .clone()
            .unwrap_or_else(|| data_dir().join("state.json"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("logs"))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = SyncConfig::parse(
            r#"
            [catalog]
            page_size = 50

            [paths]
            install_root = "/srv/packages"
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog.page_size, 50);
        assert_eq!(config.catalog.timeout, 30);
        assert_eq!(config.install_root(), PathBuf::from("/srv/packages"));
        assert!(config.state_file().ends_with("storesync/state.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = SyncConfig::parse("[catalog]\npage_size = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(SyncConfig::parse("[catalog\n").is_err());
    }

    #[test]
    fn explicit_missing_path_fails() {
        let err = SyncConfig::load_from_optional_path(Some(Path::new("/nonexistent/storesync.toml")))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[catalog]\nbase_url = \"http://localhost:9000\"\n").unwrap();

        let config = SyncConfig::load_from_optional_path(Some(&path)).unwrap();
        assert_eq!(config.catalog.base_url, "http://localhost:9000");
    }

    #[test]
    fn blank_token_counts_as_absent() {
        let mut config = SyncConfig::default();
        config.session.token = Some("  ".into());
        assert_eq!(config.token(), None);
    }
}
