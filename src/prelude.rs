//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use app_netpolicy::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{NetPolicyError, Result};

// Apps
pub use crate::apps::record::{AppRecord, Icon, InstalledApp, Uid};
pub use crate::apps::source::{AppSource, ManifestAppSource, StaticAppSource};

// Policy
pub use crate::policy::flags::{PolicyMask, RestrictionFlag};
pub use crate::policy::mode::PolicyMode;
pub use crate::policy::store::{FilePolicyStore, MemoryPolicyStore, PolicyStore};

// Diff
pub use crate::diff::{DiffItem, EditOp, EditScript, diff};

// Engine
pub use crate::engine::{
    AppRow, Capabilities, DiscardReason, EditBatch, PolicySession, RowBinding, ToggleOutcome,
};
pub use crate::logger::ActivityLog;
