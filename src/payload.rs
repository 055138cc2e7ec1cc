/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::payload
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Typed shapes for catalog responses and installed-package
    sidecars, plus the decoding step that turns raw JSON into
    them or into a TransportError.

  Security / Safety Notes:
    Decoding is pure; no payload content is executed or used
    to build filesystem paths.

  Dependencies:
    serde / serde_json for structured parsing.

  Operational Scope:
    Used by transports to decode responses and by the client
    and reconciler to read sidecar metadata.

  Revision History:
    2026-09-15 COD  Replaced key lookups with typed decoding.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Structured response parsing with explicit error paths
    - Lossy sidecar reads are explicit Option results
============================================================*/

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::package::{Package, PackageMetadata, UpdateHint, VersionInfo};

/// Key carrying a remote failure in any catalog payload.
pub const ERROR_KEY: &str = "errorMessage";

/// One page of catalog ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub total: u64,
    #[serde(alias = "results", deserialize_with = "catalog_ids")]
    pub ids: Vec<String>,
}

/// Full catalog detail for one product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductDetail {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub version: RemoteVersion,
}

/// Latest published release as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteVersion {
    #[serde(default)]
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub supported_version: String,
}

impl ProductDetail {
    /// Build the package for `id`; `local_path` is empty when not installed.
    pub fn into_package(self, id: &str, local_path: &str) -> Package {
        let fetched = VersionInfo::new(
            self.version.id,
            self.version.version,
            self.version.published_date,
            self.version.supported_version,
        )
        .with_local_path(local_path);
        let metadata = PackageMetadata {
            display_name: self.display_name,
            publisher: self.publisher,
            category: self.category,
            description: self.description,
        };
        Package::from_remote(id, metadata, fetched)
    }
}

#[derive(Debug, Deserialize)]
struct UpdateCheckResponse {
    #[serde(default)]
    results: Vec<UpdateCheckRow>,
}

#[derive(Debug, Deserialize)]
struct UpdateCheckRow {
    #[serde(deserialize_with = "catalog_id")]
    id: String,
    #[serde(default)]
    can_update: i64,
}

/// Installed-package sidecar (`package.json`). Non-string fields read as
/// empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocalMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pubdate: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub supported_version: String,
}

impl LocalMetadata {
    /// Parse a sidecar blob. `None` when the blob is not a JSON object or has
    /// no string `id`.
    pub fn parse(blob: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(blob).ok()?;
        if !value.get("id").is_some_and(Value::is_string) {
            return None;
        }
        let metadata: LocalMetadata = serde_json::from_value(value).ok()?;
        (!metadata.id.is_empty()).then_some(metadata)
    }

    /// Installed release described by this sidecar.
    pub fn version_info(&self, install_path: &str) -> VersionInfo {
        VersionInfo::new(
            self.version_id.clone(),
            self.version.clone(),
            self.pubdate.clone(),
            self.supported_version.clone(),
        )
        .with_local_path(install_path)
    }
}

/// Fail with the remote message when the payload carries the error key.
pub fn check_error(value: &Value) -> Result<(), TransportError> {
    match value.get(ERROR_KEY) {
        Some(Value::String(message)) => Err(TransportError::new(message.clone())),
        Some(other) => Err(TransportError::new(other.to_string())),
        None => Ok(()),
    }
}

pub fn decode_page(value: Value) -> Result<ProductPage, TransportError> {
    check_error(&value)?;
    serde_json::from_value(value)
        .map_err(|err| TransportError::new(format!("Failed to decode product list: {err}")))
}

pub fn decode_detail(value: Value) -> Result<ProductDetail, TransportError> {
    check_error(&value)?;
    serde_json::from_value(value)
        .map_err(|err| TransportError::new(format!("Failed to decode product detail: {err}")))
}

/// Decode bulk update-check rows; a non-zero `can_update` means Outdated.
pub fn decode_update_check(value: Value) -> Result<HashMap<String, UpdateHint>, TransportError> {
    check_error(&value)?;
    let response: UpdateCheckResponse = serde_json::from_value(value)
        .map_err(|err| TransportError::new(format!("Failed to decode update details: {err}")))?;
    Ok(response
        .results
        .into_iter()
        .map(|row| {
            let hint = if row.can_update != 0 {
                UpdateHint::Outdated
            } else {
                UpdateHint::UpToDate
            };
            (row.id, hint)
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn catalog_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn catalog_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = Vec::<RawId>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(String::from).collect())
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn page_accepts_numeric_ids() {
        let page = decode_page(json!({ "total": 3, "results": [11, "12", 13] })).unwrap();
        assert_eq!(
            page,
            ProductPage {
                total: 3,
                ids: vec!["11".into(), "12".into(), "13".into()],
            }
        );
    }

    #[test]
    fn error_key_becomes_transport_error() {
        let err = decode_detail(json!({ "errorMessage": "Product not found" })).unwrap_err();
        assert_eq!(err, TransportError::new("Product not found"));
    }

    #[test]
    fn detail_builds_package_with_local_path() {
        let detail = decode_detail(json!({
            "display_name": "Terrain Tools",
            "publisher": "Synavera",
            "version": { "id": "900", "version": "2.0", "published_date": "2026-02-01" }
        }))
        .unwrap();
        let package = detail.into_package("42", "/pkgs/terrain");

        assert_eq!(package.metadata().display_name, "Terrain Tools");
        let fetched = package.fetched_version().unwrap();
        assert_eq!(fetched.version_string(), "2.0");
        assert_eq!(fetched.local_path(), "/pkgs/terrain");
        assert_eq!(fetched.supported_version(), "");
    }

    #[test]
    fn detail_without_version_is_rejected() {
        let err = decode_detail(json!({ "display_name": "x" })).unwrap_err();
        assert!(err.message.starts_with("Failed to decode product detail"));
    }

    #[test]
    fn update_check_maps_can_update() {
        let hints = decode_update_check(json!({
            "results": [
                { "id": "1", "can_update": 1 },
                { "id": 2, "can_update": 0 },
                { "id": "3" }
            ]
        }))
        .unwrap();
        assert_eq!(hints["1"], UpdateHint::Outdated);
        assert_eq!(hints["2"], UpdateHint::UpToDate);
        assert_eq!(hints["3"], UpdateHint::UpToDate);
    }

    #[test]
    fn sidecar_requires_string_id() {
        assert!(LocalMetadata::parse(r#"{"id": 42, "version": "1.0"}"#).is_none());
        assert!(LocalMetadata::parse(r#"{"version": "1.0"}"#).is_none());
        assert!(LocalMetadata::parse("not json").is_none());
        assert!(LocalMetadata::parse("[]").is_none());
    }

    #[test]
    fn sidecar_non_string_fields_read_empty() {
        let metadata = LocalMetadata::parse(r#"{"id": "42", "version": 1, "pubdate": "2025-12-01"}"#).unwrap();
        assert_eq!(metadata.version, "");
        assert_eq!(metadata.pubdate, "2025-12-01");

        let info = metadata.version_info("/pkgs/42");
        assert_eq!(info.local_path(), "/pkgs/42");
        assert_eq!(info.published_date(), "2025-12-01");
    }
}
