//! Installed apps: records, enumeration sources and per-row view state.

pub mod record;
pub mod source;
pub mod view_state;
