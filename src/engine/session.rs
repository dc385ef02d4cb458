//! Policy session: owns the working set and turns it into renderable rows.
//!
//! The working set is an `Arc<[AppRecord]>` replaced wholesale on every
//! enumeration. Each replacement is diffed against the previous snapshot and
//! the resulting [`EditBatch`] is fanned out to subscribers. Policy masks are
//! read through the store on render and cached per UID so toggles can be
//! answered from the cache when the store is slow to converge.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::apps::record::{AppRecord, Icon, InstalledApp, Uid};
use crate::apps::source::{AppSource, WorkingSet, build_working_set};
use crate::apps::view_state::ExpansionTable;
use crate::core::errors::Result;
use crate::diff::{DiffItem, EditScript, diff};
use crate::engine::capabilities::Capabilities;
use crate::engine::controller::BindingTable;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::logger::{self, ActivityLog};
use crate::policy::flags::{PolicyMask, RestrictionFlag};
use crate::policy::mode::{PolicyMode, derive_mode_for_mask};
use crate::policy::store::PolicyStore;

// ──────────────────── view model ────────────────────

/// One switch on a rendered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchState {
    pub flag: RestrictionFlag,
    /// Traffic allowed under this condition.
    pub checked: bool,
    /// The user may flip it.
    pub enabled: bool,
}

/// Everything a host needs to draw one app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppRow {
    pub name: String,
    pub package_name: String,
    pub icon: Icon,
    pub system_app: bool,
    pub uid: Option<Uid>,
    pub switches: Vec<SwitchState>,
    pub mode: Option<PolicyMode>,
    pub expanded: bool,
    pub expandable: bool,
}

impl AppRow {
    #[must_use]
    pub fn switch(&self, flag: RestrictionFlag) -> Option<&SwitchState> {
        self.switches.iter().find(|switch| switch.flag == flag)
    }

    /// Any switch on the row can be flipped.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.switches.iter().any(|switch| switch.enabled)
    }
}

impl DiffItem for AppRow {
    type Key = str;

    fn key(&self) -> &str {
        &self.package_name
    }

    fn same_content(&self, other: &Self) -> bool {
        self.icon == other.icon
            && self.name == other.name
            && self.package_name == other.package_name
            && self.system_app == other.system_app
            && self.uid == other.uid
    }

    fn same_view_state(&self, other: &Self) -> bool {
        self.expanded == other.expanded
    }
}

/// Changes published on each working-set replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditBatch {
    /// Generation of the working set the script produces.
    pub generation: u64,
    pub script: EditScript<AppRecord>,
}

// ──────────────────── session ────────────────────

pub struct PolicySession {
    store: Arc<dyn PolicyStore>,
    caps: Capabilities,
    records: RwLock<Arc<[AppRecord]>>,
    generation: AtomicU64,
    masks: RwLock<HashMap<Uid, PolicyMask>>,
    pub(crate) expansion: ExpansionTable,
    pub(crate) bindings: BindingTable,
    subscribers: Mutex<Vec<Sender<EditBatch>>>,
    pub(crate) log: ActivityLog,
    /// Serialises store writes so toggles land in issue order.
    pub(crate) write_gate: Mutex<()>,
}

impl PolicySession {
    /// New session with an empty working set.
    pub fn new(store: Arc<dyn PolicyStore>, caps: Capabilities, log: ActivityLog) -> Self {
        let tracked: Vec<&str> = caps
            .tracked_flags
            .iter()
            .map(|flag| flag.short_name())
            .collect();
        log.record(
            &LogEntry::new(EventType::SessionStart, Severity::Info).details(format!(
                "tracked={} expandable={} offline_apps={:?}",
                tracked.join(","),
                caps.expandable,
                caps.offline_apps
            )),
        );
        Self {
            store,
            caps,
            records: RwLock::new(Arc::from(Vec::new())),
            generation: AtomicU64::new(0),
            masks: RwLock::new(HashMap::new()),
            expansion: ExpansionTable::new(),
            bindings: BindingTable::new(),
            subscribers: Mutex::new(Vec::new()),
            log,
            write_gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Number of working-set replacements so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current working set snapshot.
    #[must_use]
    pub fn records(&self) -> Arc<[AppRecord]> {
        Arc::clone(&self.records.read())
    }

    #[must_use]
    pub fn record(&self, package_name: &str) -> Option<AppRecord> {
        self.records
            .read()
            .iter()
            .find(|record| record.package_name == package_name)
            .cloned()
    }

    /// Receive an [`EditBatch`] for every later working-set replacement.
    pub fn subscribe(&self) -> Receiver<EditBatch> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Enumerate `source` and replace the working set.
    ///
    /// On failure the previous working set stays in place.
    pub fn reload(&self, source: &dyn AppSource) -> Result<EditBatch> {
        let raw = match source.enumerate() {
            Ok(raw) => raw,
            Err(err) => {
                self.enumeration_failed(&err);
                return Err(err);
            }
        };
        self.replace_working_set(raw)
    }

    /// Replace the working set with a fresh enumeration.
    pub fn replace_working_set(&self, raw: Vec<InstalledApp>) -> Result<EditBatch> {
        let WorkingSet {
            records: next,
            skipped,
        } = match build_working_set(raw, self.caps.offline_apps) {
            Ok(set) => set,
            Err(err) => {
                self.enumeration_failed(&err);
                return Err(err);
            }
        };
        for app in &skipped {
            logger::warn(
                "SESSION",
                &format!("skipping {:?}: blank package name", app.name),
            );
            self.log.record(
                &LogEntry::new(EventType::BoundaryInconsistency, Severity::Warning)
                    .uid(app.uid)
                    .details(format!("blank package name for {:?}", app.name)),
            );
        }

        let batch = {
            let mut records = self.records.write();
            let script = diff(&records[..], &next);
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            *records = Arc::from(next);

            let live_uids: HashSet<Uid> = records.iter().filter_map(|record| record.uid).collect();
            self.masks.write().retain(|uid, _| live_uids.contains(uid));
            self.expansion
                .retain(records.iter().map(|record| record.package_name.as_str()));

            EditBatch { generation, script }
        };

        self.log.record(
            &LogEntry::new(EventType::WorkingSetReplaced, Severity::Info)
                .generation(batch.generation)
                .working_set(self.records.read().len(), batch.script.summary()),
        );
        self.publish(&batch);
        Ok(batch)
    }

    /// Rows for the whole working set, reading each UID's mask from the store.
    pub fn render(&self) -> Vec<AppRow> {
        let records = self.records();
        records
            .iter()
            .map(|record| {
                let mask = self.refresh_mask(record);
                self.build_row(record, mask)
            })
            .collect()
    }

    /// One row from the cached mask, reading the store only on a cache miss.
    #[must_use]
    pub fn row(&self, package_name: &str) -> Option<AppRow> {
        let record = self.record(package_name)?;
        let cached = record
            .uid
            .and_then(|uid| self.masks.read().get(&uid).copied());
        let mask = match cached {
            Some(mask) => mask,
            None => self.refresh_mask(&record),
        };
        Some(self.build_row(&record, mask))
    }

    pub(crate) fn store(&self) -> &dyn PolicyStore {
        self.store.as_ref()
    }

    pub(crate) fn cached_mask(&self, uid: Uid) -> Option<PolicyMask> {
        self.masks.read().get(&uid).copied()
    }

    pub(crate) fn cache_mask(&self, uid: Uid, mask: PolicyMask) {
        self.masks.write().insert(uid, mask);
    }

    pub(crate) fn build_row(&self, record: &AppRecord, mask: PolicyMask) -> AppRow {
        let online = record.requests_internet_permission;
        let enabled = online && record.uid.is_some();
        let switches = self
            .caps
            .tracked_flags
            .iter()
            .map(|&flag| SwitchState {
                flag,
                checked: online && mask.is_allowed(flag),
                enabled,
            })
            .collect();
        let expandable = self.caps.expandable && online;
        AppRow {
            name: record.name.clone(),
            package_name: record.package_name.clone(),
            icon: record.icon.clone(),
            system_app: record.system_app,
            uid: record.uid,
            switches,
            mode: derive_mode_for_mask(mask, &self.caps.tracked_flags, online),
            expanded: expandable && self.expansion.is_expanded(&record.package_name),
            expandable,
        }
    }

    /// Read the store for one record, falling back to the cache on failure.
    fn refresh_mask(&self, record: &AppRecord) -> PolicyMask {
        let Some(uid) = record.uid else {
            return PolicyMask::NONE;
        };
        if !record.requests_internet_permission {
            return self.cached_mask(uid).unwrap_or_default();
        }
        match self.store.uid_policy(uid) {
            Ok(mask) => {
                self.cache_mask(uid, mask);
                mask
            }
            Err(err) => {
                self.log.record(
                    &LogEntry::new(EventType::PolicyReadFailed, Severity::Warning)
                        .package(&record.package_name)
                        .uid(Some(uid))
                        .error(&err),
                );
                self.cached_mask(uid).unwrap_or_default()
            }
        }
    }

    fn enumeration_failed(&self, err: &crate::core::errors::NetPolicyError) {
        logger::warn(
            "SESSION",
            &format!("enumeration failed, keeping previous working set: {err}"),
        );
        self.log.record(
            &LogEntry::new(EventType::EnumerationFailed, Severity::Error)
                .generation(self.generation())
                .error(err),
        );
    }

    fn publish(&self, batch: &EditBatch) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(batch.clone()).is_ok());
    }
}
