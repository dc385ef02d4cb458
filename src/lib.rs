#![forbid(unsafe_code)]

//! app_netpolicy: per-app network access policy engine.
//!
//! Keeps a working set of installed apps, derives each app's policy mode from
//! the OS uid-policy bitmask, turns user toggles into restriction writes and
//! reports working-set changes as minimal edit scripts.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use app_netpolicy::prelude::*;
//!
//! let store = Arc::new(MemoryPolicyStore::new());
//! let session = PolicySession::new(store, Capabilities::full(), ActivityLog::disabled());
//! let rows = session.render();
//! # let _ = rows;
//! ```

pub mod prelude;

pub mod apps;
pub mod core;
pub mod diff;
pub mod engine;
pub mod logger;
pub mod policy;
