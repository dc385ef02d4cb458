//! Policy store trait and its implementations.
//!
//! The store is the source of truth for every UID's restriction mask. The
//! engine only reads it and issues add/remove calls; enforcement happens
//! wherever the store's contents are consumed.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::apps::record::Uid;
use crate::core::errors::{NetPolicyError, Result, StoreOp};
use crate::policy::flags::{PolicyMask, RestrictionFlag};

/// Per-UID policy authority.
///
/// `add_restriction` and `remove_restriction` must be idempotent.
pub trait PolicyStore: Send + Sync {
    fn uid_policy(&self, uid: Uid) -> Result<PolicyMask>;
    fn add_restriction(&self, uid: Uid, flag: RestrictionFlag) -> Result<()>;
    fn remove_restriction(&self, uid: Uid, flag: RestrictionFlag) -> Result<()>;
}

// ──────────────────── in-memory store ────────────────────

/// One recorded call against a [`MemoryPolicyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    Read(Uid),
    Add(Uid, RestrictionFlag),
    Remove(Uid, RestrictionFlag),
}

/// In-memory store with a call journal and injectable failures.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    masks: RwLock<HashMap<Uid, PolicyMask>>,
    journal: Mutex<Vec<StoreCall>>,
    failing_reads: RwLock<HashSet<Uid>>,
    failing_writes: RwLock<HashSet<Uid>>,
}

impl MemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with known masks.
    #[must_use]
    pub fn with_masks(masks: impl IntoIterator<Item = (Uid, PolicyMask)>) -> Self {
        let store = Self::new();
        store.masks.write().extend(masks);
        store
    }

    /// Make every read for `uid` fail until cleared.
    pub fn fail_reads_for(&self, uid: Uid, failing: bool) {
        toggle_membership(&self.failing_reads, uid, failing);
    }

    /// Make every add/remove for `uid` fail until cleared.
    pub fn fail_writes_for(&self, uid: Uid, failing: bool) {
        toggle_membership(&self.failing_writes, uid, failing);
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.journal.lock().clone()
    }

    /// Calls other than reads.
    #[must_use]
    pub fn writes(&self) -> Vec<StoreCall> {
        self.journal
            .lock()
            .iter()
            .copied()
            .filter(|call| !matches!(call, StoreCall::Read(_)))
            .collect()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    fn write(&self, uid: Uid, flag: RestrictionFlag, allowed: bool) -> Result<()> {
        let (call, op) = if allowed {
            (StoreCall::Remove(uid, flag), StoreOp::RemoveRestriction)
        } else {
            (StoreCall::Add(uid, flag), StoreOp::AddRestriction)
        };
        self.journal.lock().push(call);
        if self.failing_writes.read().contains(&uid) {
            return Err(NetPolicyError::store(uid, op, "injected write failure"));
        }
        let mut masks = self.masks.write();
        let slot = masks.entry(uid).or_default();
        *slot = slot.with_allowed(flag, allowed);
        Ok(())
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn uid_policy(&self, uid: Uid) -> Result<PolicyMask> {
        self.journal.lock().push(StoreCall::Read(uid));
        if self.failing_reads.read().contains(&uid) {
            return Err(NetPolicyError::store(
                uid,
                StoreOp::Read,
                "injected read failure",
            ));
        }
        Ok(self.masks.read().get(&uid).copied().unwrap_or_default())
    }

    fn add_restriction(&self, uid: Uid, flag: RestrictionFlag) -> Result<()> {
        self.write(uid, flag, false)
    }

    fn remove_restriction(&self, uid: Uid, flag: RestrictionFlag) -> Result<()> {
        self.write(uid, flag, true)
    }
}

fn toggle_membership(set: &RwLock<HashSet<Uid>>, uid: Uid, member: bool) {
    let mut set = set.write();
    if member {
        set.insert(uid);
    } else {
        set.remove(&uid);
    }
}

// ──────────────────── file-backed store ────────────────────

/// On-disk layout of a [`FilePolicyStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyFile {
    #[serde(default)]
    pub uids: BTreeMap<u32, u32>,
}

/// JSON-file store shared between processes.
///
/// Every read goes to disk so changes made elsewhere are seen immediately.
/// Writes replace the file atomically (temp file + rename). Writers within
/// one process are serialised.
#[derive(Debug)]
pub struct FilePolicyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePolicyStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file. A missing file is an empty store.
    pub fn load(&self) -> Result<PolicyFile> {
        if !self.path.exists() {
            return Ok(PolicyFile::default());
        }
        let raw =
            fs::read_to_string(&self.path).map_err(|source| NetPolicyError::io(&self.path, source))?;
        if raw.trim().is_empty() {
            return Ok(PolicyFile::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn persist(&self, file: &PolicyFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| NetPolicyError::io(parent, source))?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let json = serde_json::to_string_pretty(file)?;
        let mut handle = fs::File::create(&tmp).map_err(|source| NetPolicyError::io(&tmp, source))?;
        handle
            .write_all(json.as_bytes())
            .and_then(|()| handle.write_all(b"\n"))
            .and_then(|()| handle.sync_data())
            .map_err(|source| NetPolicyError::io(&tmp, source))?;
        fs::rename(&tmp, &self.path).map_err(|source| NetPolicyError::io(&self.path, source))
    }

    fn write(&self, uid: Uid, flag: RestrictionFlag, allowed: bool) -> Result<()> {
        let op = if allowed {
            StoreOp::RemoveRestriction
        } else {
            StoreOp::AddRestriction
        };
        let _guard = self.write_lock.lock();
        let mut file = self
            .load()
            .map_err(|err| NetPolicyError::store(uid, op, err.to_string()))?;
        let current = PolicyMask(file.uids.get(&uid.0).copied().unwrap_or(0));
        let next = current.with_allowed(flag, allowed);
        if next == current {
            return Ok(());
        }
        if next == PolicyMask::NONE {
            file.uids.remove(&uid.0);
        } else {
            file.uids.insert(uid.0, next.0);
        }
        self.persist(&file)
            .map_err(|err| NetPolicyError::store(uid, op, err.to_string()))
    }
}

impl PolicyStore for FilePolicyStore {
    fn uid_policy(&self, uid: Uid) -> Result<PolicyMask> {
        let file = self
            .load()
            .map_err(|err| NetPolicyError::store(uid, StoreOp::Read, err.to_string()))?;
        Ok(PolicyMask(file.uids.get(&uid.0).copied().unwrap_or(0)))
    }

    fn add_restriction(&self, uid: Uid, flag: RestrictionFlag) -> Result<()> {
        self.write(uid, flag, false)
    }

    fn remove_restriction(&self, uid: Uid, flag: RestrictionFlag) -> Result<()> {
        self.write(uid, flag, true)
    }
}
