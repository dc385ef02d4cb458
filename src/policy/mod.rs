//! Uid-policy bitmask codec, mode derivation and the store boundary.

pub mod flags;
pub mod mode;
pub mod store;
