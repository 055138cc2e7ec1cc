/*============================================================
  Synavera Project: Syn-Store
  Module: storesync_core::reconcile
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Reconcile in-memory packages against a fresh scan of the
    local inventory, yielding the authoritative version
    records and UpToDate/Outdated verdict.

  Security / Safety Notes:
    Pure computation over already-loaded data.

  Dependencies:
    None beyond std.

  Operational Scope:
    Used by CatalogClient::refresh for bulk and single-package
    rescans with identical branch logic.

  Revision History:
    2026-09-16 COD  Authored version reconciler.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Same inputs, same verdict; no hidden ordering
    - Change detection to avoid redundant emissions
============================================================*/

use std::collections::HashMap;

use crate::inventory::LocalPackage;
use crate::package::{Package, PackageState, VersionInfo};

/// Map package id to the installed release described by its sidecar.
/// Entries without a usable sidecar id are skipped.
pub fn scan_local_versions(installed: &[LocalPackage]) -> HashMap<String, VersionInfo> {
    installed
        .iter()
        .filter_map(|local| {
            let sidecar = local.sidecar()?;
            let info = sidecar.version_info(&local.install_path);
            Some((sidecar.id, info))
        })
        .collect()
}

/// Bring `package` in line with `local` (the scanned install, if any).
/// Returns true when the package changed.
///
/// Placeholders and failed packages carry no fetched version and are left
/// untouched.
pub fn reconcile(package: &mut Package, local: Option<&VersionInfo>) -> bool {
    let Some(fetched) = package.fetched_version() else {
        return false;
    };
    let fetched_string = fetched.version_string().to_string();
    let installed_string = package
        .installed_version()
        .map(|installed| installed.version_string().to_string());

    let Some(local) = local else {
        if installed_string.is_none() {
            return false;
        }
        // Nothing installed means nothing can be outdated.
        package.set_fetched_local_path("");
        package.remove_local_version();
        package.set_state(PackageState::UpToDate);
        return true;
    };

    if installed_string.as_deref() == Some(local.version_string()) {
        return false;
    }

    if local.version_string() == fetched_string {
        package.set_fetched_local_path(local.local_path());
        package.remove_local_version();
        package.set_state(PackageState::UpToDate);
    } else if package
        .local_version()
        .is_some_and(|tracked| tracked.version_string() == local.version_string())
    {
        package.set_fetched_local_path("");
        package.set_local_path(local.local_path());
        package.set_state(PackageState::Outdated);
    } else {
        package.set_fetched_local_path("");
        package.set_local_version(local.clone());
        package.set_state(PackageState::Outdated);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageMetadata;
    use pretty_assertions::assert_eq;

    fn remote(version: &str, local_path: &str) -> Package {
        Package::from_remote(
            "42",
            PackageMetadata::default(),
            VersionInfo::new("v-remote", version, "2026-03-01", "2023.1").with_local_path(local_path),
        )
    }

    fn installed(version: &str, path: &str) -> VersionInfo {
        VersionInfo::new("v-local", version, "2025-01-01", "2022.3").with_local_path(path)
    }

    fn version_strings(package: &Package) -> Vec<(String, String)> {
        package
            .versions()
            .map(|v| (v.version_string().to_string(), v.local_path().to_string()))
            .collect()
    }

    #[test]
    fn same_version_is_up_to_date_single_record() {
        let mut package = remote("1.0", "");
        assert!(reconcile(&mut package, Some(&installed("1.0", "/pkgs/42"))));

        assert_eq!(package.state(), PackageState::UpToDate);
        assert_eq!(version_strings(&package), vec![("1.0".into(), "/pkgs/42".into())]);
    }

    #[test]
    fn older_local_is_outdated_with_two_records() {
        let mut package = remote("2.0", "");
        assert!(reconcile(&mut package, Some(&installed("1.0", "/pkgs/42"))));

        assert_eq!(package.state(), PackageState::Outdated);
        assert_eq!(
            version_strings(&package),
            vec![
                ("2.0".into(), String::new()),
                ("1.0".into(), "/pkgs/42".into()),
            ]
        );
    }

    #[test]
    fn uninstall_drops_local_record() {
        let mut package = remote("2.0", "");
        reconcile(&mut package, Some(&installed("1.0", "/pkgs/42")));

        assert!(reconcile(&mut package, None));
        assert_eq!(package.state(), PackageState::UpToDate);
        assert!(package.local_version().is_none());
        assert!(package.installed_version().is_none());
    }

    #[test]
    fn second_pass_is_a_no_op() {
        for local in [Some(installed("1.0", "/p")), Some(installed("2.0", "/p")), None] {
            let mut package = remote("2.0", "/old");
            reconcile(&mut package, local.as_ref());
            let settled = package.clone();

            assert!(!reconcile(&mut package, local.as_ref()));
            assert_eq!(package, settled);
        }
    }

    #[test]
    fn moved_install_of_tracked_version_updates_path() {
        let mut package = remote("2.0", "");
        reconcile(&mut package, Some(&installed("1.0", "/old")));
        // Tracked record keeps its version string but loses the install path.
        package.set_local_path("");

        assert!(reconcile(&mut package, Some(&installed("1.0", "/new"))));
        assert_eq!(package.state(), PackageState::Outdated);
        assert_eq!(package.local_version().unwrap().local_path(), "/new");
    }

    #[test]
    fn third_version_replaces_tracked_local() {
        let mut package = remote("3.0", "");
        reconcile(&mut package, Some(&installed("1.0", "/p")));

        assert!(reconcile(&mut package, Some(&installed("2.0", "/p"))));
        assert_eq!(package.state(), PackageState::Outdated);
        assert_eq!(package.local_version().unwrap().version_string(), "2.0");
        assert_eq!(package.versions().count(), 2);
    }

    #[test]
    fn upgrade_to_latest_coalesces() {
        let mut package = remote("2.0", "");
        reconcile(&mut package, Some(&installed("1.0", "/p")));

        assert!(reconcile(&mut package, Some(&installed("2.0", "/p"))));
        assert_eq!(package.state(), PackageState::UpToDate);
        assert_eq!(version_strings(&package), vec![("2.0".into(), "/p".into())]);
    }

    #[test]
    fn placeholders_are_skipped() {
        let mut package = Package::placeholder("42");
        assert!(!reconcile(&mut package, Some(&installed("1.0", "/p"))));
    }

    #[test]
    fn scan_skips_malformed_sidecars() {
        let scanned = scan_local_versions(&[
            LocalPackage::new("/a", r#"{"id": "1", "version": "1.0"}"#),
            LocalPackage::new("/b", r#"{"id": 2}"#),
            LocalPackage::new("/c", "garbage"),
        ]);
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned["1"].local_path(), "/a");
    }
}
