/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::package
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Shared structures describing catalog packages, their
    version records and the state verdicts derived from them.

  Security / Safety Notes:
    Pure data container; no I/O performed in this module.

  Dependencies:
    serde for the version and hint types stored in snapshots.

  Operational Scope:
    Produced by the catalog client and the reconciler, handed
    to subscribers as read-only values.

  Revision History:
    2026-09-14 COD  Introduced Package and VersionInfo types.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Invariants enforced by the only mutators
============================================================*/

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Version metadata for one release of a package. Values are immutable;
/// moving an install path produces a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    version_id: String,
    version_string: String,
    published_date: String,
    supported_version: String,
    local_path: String,
}

impl VersionInfo {
    pub fn new(
        version_id: impl Into<String>,
        version_string: impl Into<String>,
        published_date: impl Into<String>,
        supported_version: impl Into<String>,
    ) -> Self {
        Self {
            version_id: version_id.into(),
            version_string: version_string.into(),
            published_date: published_date.into(),
            supported_version: supported_version.into(),
            local_path: String::new(),
        }
    }

    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    pub fn version_string(&self) -> &str {
        &self.version_string
    }

    pub fn published_date(&self) -> &str {
        &self.published_date
    }

    pub fn supported_version(&self) -> &str {
        &self.supported_version
    }

    /// Install location; empty when this release is not on disk.
    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn is_installed(&self) -> bool {
        !self.local_path.is_empty()
    }

    pub fn with_local_path(self, local_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            ..self
        }
    }
}

/// Authoritative verdict for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageState {
    UpToDate,
    Outdated,
    InProgress,
    Error,
}

/// Cached answer from the bulk update-check endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateHint {
    UpToDate,
    Outdated,
}

impl From<UpdateHint> for PackageState {
    fn from(hint: UpdateHint) -> Self {
        match hint {
            UpdateHint::UpToDate => PackageState::UpToDate,
            UpdateHint::Outdated => PackageState::Outdated,
        }
    }
}

impl PackageState {
    /// Hint equivalent of this state, if the hint cache can hold it.
    pub fn as_hint(self) -> Option<UpdateHint> {
        match self {
            PackageState::UpToDate => Some(UpdateHint::UpToDate),
            PackageState::Outdated => Some(UpdateHint::Outdated),
            PackageState::InProgress | PackageState::Error => None,
        }
    }
}

/// Descriptive fields taken from the catalog detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub display_name: String,
    pub publisher: String,
    pub category: String,
    pub description: String,
}

/// A catalog package as presented to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    id: String,
    metadata: PackageMetadata,
    fetched: Option<VersionInfo>,
    local: Option<VersionInfo>,
    state: PackageState,
    error: Option<TransportError>,
    placeholder: bool,
}

impl Package {
    /// Stand-in emitted before the first detail for `id` arrives.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: PackageMetadata::default(),
            fetched: None,
            local: None,
            state: PackageState::UpToDate,
            error: None,
            placeholder: true,
        }
    }

    /// Package whose detail fetch failed.
    pub fn failed(id: impl Into<String>, error: TransportError) -> Self {
        Self {
            id: id.into(),
            metadata: PackageMetadata::default(),
            fetched: None,
            local: None,
            state: PackageState::Error,
            error: Some(error),
            placeholder: false,
        }
    }

    pub fn from_remote(id: impl Into<String>, metadata: PackageMetadata, fetched: VersionInfo) -> Self {
        Self {
            id: id.into(),
            metadata,
            fetched: Some(fetched),
            local: None,
            state: PackageState::UpToDate,
            error: None,
            placeholder: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn fetched_version(&self) -> Option<&VersionInfo> {
        self.fetched.as_ref()
    }

    /// Installed release when it differs from the fetched one.
    pub fn local_version(&self) -> Option<&VersionInfo> {
        self.local.as_ref()
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// All version records, fetched first.
    pub fn versions(&self) -> impl Iterator<Item = &VersionInfo> {
        self.fetched.iter().chain(self.local.iter())
    }

    /// The release currently on disk, if any.
    pub fn installed_version(&self) -> Option<&VersionInfo> {
        self.local
            .iter()
            .chain(self.fetched.iter())
            .find(|version| version.is_installed())
    }

    pub(crate) fn set_state(&mut self, state: PackageState) {
        self.state = state;
    }

    pub(crate) fn set_fetched_local_path(&mut self, local_path: &str) {
        if let Some(fetched) = self.fetched.take() {
            self.fetched = Some(fetched.with_local_path(local_path));
        }
    }

    /// Track `version` as the installed release. A record with the fetched
    /// version string is coalesced into the fetched record.
    pub(crate) fn set_local_version(&mut self, version: VersionInfo) {
        let same_as_fetched = self
            .fetched
            .as_ref()
            .is_some_and(|fetched| fetched.version_string == version.version_string);
        if same_as_fetched {
            self.set_fetched_local_path(&version.local_path);
            self.local = None;
        } else {
            self.local = Some(version);
        }
    }

    pub(crate) fn set_local_path(&mut self, local_path: &str) {
        if let Some(local) = self.local.take() {
            self.local = Some(local.with_local_path(local_path));
        }
    }

    pub(crate) fn remove_local_version(&mut self) {
        self.local = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(version: &str) -> Package {
        Package::from_remote(
            "42",
            PackageMetadata::default(),
            VersionInfo::new("v", version, "2026-01-01", "2022.3"),
        )
    }

    #[test]
    fn local_version_with_fetched_string_is_coalesced() {
        let mut package = remote("1.0");
        package.set_local_version(VersionInfo::new("v", "1.0", "", "").with_local_path("/pkgs/42"));

        assert!(package.local_version().is_none());
        assert_eq!(package.versions().count(), 1);
        assert_eq!(package.installed_version().unwrap().local_path(), "/pkgs/42");
    }

    #[test]
    fn distinct_local_version_is_second_record() {
        let mut package = remote("2.0");
        package.set_local_version(VersionInfo::new("v1", "1.0", "", "").with_local_path("/pkgs/42"));

        let strings: Vec<&str> = package.versions().map(VersionInfo::version_string).collect();
        assert_eq!(strings, vec!["2.0", "1.0"]);
        assert_eq!(package.installed_version().unwrap().version_string(), "1.0");
    }

    #[test]
    fn placeholder_has_no_versions() {
        let package = Package::placeholder("7");
        assert!(package.is_placeholder());
        assert!(package.installed_version().is_none());
        assert_eq!(package.versions().count(), 0);
    }

    #[test]
    fn failed_package_keeps_transport_error() {
        let package = Package::failed("9", TransportError::new("Product not found"));
        assert_eq!(package.state(), PackageState::Error);
        assert_eq!(package.error().map(|err| err.message.as_str()), Some("Product not found"));
        assert_eq!(package.clone(), package);
    }

    #[test]
    fn hint_maps_onto_state() {
        assert_eq!(PackageState::from(UpdateHint::Outdated), PackageState::Outdated);
        assert_eq!(PackageState::Error.as_hint(), None);
        assert_eq!(PackageState::UpToDate.as_hint(), Some(UpdateHint::UpToDate));
    }
}
