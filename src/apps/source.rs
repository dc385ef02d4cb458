//! App enumeration boundary and working-set construction.
//!
//! The engine never discovers apps itself. An [`AppSource`] hands over the raw
//! list, and [`build_working_set`] applies the offline-app policy, checks that
//! package names are present and unique, and sorts by display name.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;

use crate::apps::record::{AppRecord, INTERNET_PERMISSION, Icon, InstalledApp, Uid};
use crate::core::errors::{NetPolicyError, Result};
use crate::engine::capabilities::OfflineApps;

/// Source of installed-app snapshots.
pub trait AppSource: Send + Sync {
    fn enumerate(&self) -> Result<Vec<InstalledApp>>;
}

/// Fixed in-memory list, for tests and embedding hosts that enumerate themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticAppSource {
    apps: Vec<InstalledApp>,
}

impl StaticAppSource {
    #[must_use]
    pub fn new(apps: Vec<InstalledApp>) -> Self {
        Self { apps }
    }
}

impl AppSource for StaticAppSource {
    fn enumerate(&self) -> Result<Vec<InstalledApp>> {
        Ok(self.apps.clone())
    }
}

// ──────────────────── manifest source ────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    app: Vec<ManifestApp>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestApp {
    name: String,
    package: String,
    #[serde(default)]
    uid: Option<u32>,
    #[serde(default)]
    system: bool,
    #[serde(default)]
    permissions: Vec<String>,
    /// Shorthand for listing the internet permission.
    #[serde(default)]
    internet: Option<bool>,
    /// Icon file, relative to the manifest.
    #[serde(default)]
    icon: Option<PathBuf>,
}

/// Reads installed apps from a TOML manifest.
///
/// ```toml
/// [[app]]
/// name = "Maps"
/// package = "org.example.maps"
/// uid = 10100
/// internet = true
/// icon = "icons/maps.png"
/// ```
#[derive(Debug, Clone)]
pub struct ManifestAppSource {
    path: PathBuf,
}

impl ManifestAppSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_icon(&self, relative: &Path) -> Result<Icon> {
        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        let icon_path = base.join(relative);
        let bytes = fs::read(&icon_path).map_err(|source| NetPolicyError::io(&icon_path, source))?;
        Ok(Icon::from_bytes(bytes))
    }
}

impl AppSource for ManifestAppSource {
    fn enumerate(&self) -> Result<Vec<InstalledApp>> {
        let raw =
            fs::read_to_string(&self.path).map_err(|source| NetPolicyError::io(&self.path, source))?;
        let manifest: ManifestFile =
            toml::from_str(&raw).map_err(|err| NetPolicyError::ManifestParse {
                path: self.path.clone(),
                details: err.to_string(),
            })?;

        let mut apps = Vec::with_capacity(manifest.app.len());
        for entry in manifest.app {
            let icon = match &entry.icon {
                Some(relative) => self.load_icon(relative)?,
                None => Icon::empty(),
            };
            let mut requested_permissions = entry.permissions;
            if entry.internet == Some(true)
                && !requested_permissions
                    .iter()
                    .any(|perm| perm == INTERNET_PERMISSION)
            {
                requested_permissions.push(INTERNET_PERMISSION.to_string());
            }
            apps.push(InstalledApp {
                name: entry.name,
                package_name: entry.package,
                icon,
                system_app: entry.system,
                uid: entry.uid.map(Uid),
                requested_permissions,
            });
        }
        Ok(apps)
    }
}

// ──────────────────── working set ────────────────────

/// Whether `package` can key a working-set entry.
#[must_use]
pub fn is_valid_package_name(package: &str) -> bool {
    !package.trim().is_empty()
}

/// Ordered working set plus the raw entries that could not join it.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    pub records: Vec<AppRecord>,
    /// Entries with a blank package name, in enumeration order.
    pub skipped: Vec<InstalledApp>,
}

/// Turn a raw enumeration into the ordered working set.
///
/// Apps without the internet permission are dropped under
/// [`OfflineApps::Hide`] and kept (as non-interactive rows) under
/// [`OfflineApps::Disable`]. Entries with a blank package name are set aside
/// in [`WorkingSet::skipped`]; a repeated package name fails the whole batch.
/// The result is stable-sorted by name.
pub fn build_working_set(raw: Vec<InstalledApp>, offline: OfflineApps) -> Result<WorkingSet> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut set = WorkingSet {
        records: Vec::with_capacity(raw.len()),
        skipped: Vec::new(),
    };

    for app in raw {
        if !is_valid_package_name(&app.package_name) {
            set.skipped.push(app);
            continue;
        }
        if !seen.insert(app.package_name.clone()) {
            return Err(NetPolicyError::DuplicatePackage {
                package: app.package_name,
            });
        }
        if offline == OfflineApps::Hide && !app.requests_internet() {
            continue;
        }
        set.records.push(AppRecord::from_installed(app));
    }

    set.records.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(set)
}
