//! NP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::apps::record::Uid;
use crate::policy::flags::RestrictionFlag;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, NetPolicyError>;

/// Which policy store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    AddRestriction,
    RemoveRestriction,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::AddRestriction => write!(f, "add_restriction"),
            Self::RemoveRestriction => write!(f, "remove_restriction"),
        }
    }
}

/// Top-level error type for the network policy engine.
#[derive(Debug, Error)]
pub enum NetPolicyError {
    #[error("[NP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[NP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[NP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[NP-2001] app manifest parse failure in {path}: {details}")]
    ManifestParse { path: PathBuf, details: String },

    #[error("[NP-2002] duplicate package in working set: {package}")]
    DuplicatePackage { package: String },

    #[error("[NP-2004] unknown restriction flag: {input:?}")]
    UnknownFlag { input: String },

    #[error("[NP-3001] policy store {op} failed for uid {uid}: {details}")]
    PolicyStore {
        uid: Uid,
        op: StoreOp,
        details: String,
    },

    #[error("[NP-3002] restriction {flag} is not tracked by this engine")]
    UntrackedFlag { flag: RestrictionFlag },

    #[error("[NP-3003] app enumeration failed: {details}")]
    Enumeration { details: String },

    #[error("[NP-3101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[NP-3201] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[NP-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl NetPolicyError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "NP-1001",
            Self::MissingConfig { .. } => "NP-1002",
            Self::ConfigParse { .. } => "NP-1003",
            Self::ManifestParse { .. } => "NP-2001",
            Self::DuplicatePackage { .. } => "NP-2002",
            Self::UnknownFlag { .. } => "NP-2004",
            Self::PolicyStore { .. } => "NP-3001",
            Self::UntrackedFlag { .. } => "NP-3002",
            Self::Enumeration { .. } => "NP-3003",
            Self::Serialization { .. } => "NP-3101",
            Self::Io { .. } => "NP-3201",
            Self::Runtime { .. } => "NP-3900",
        }
    }

    /// Whether the host may reasonably retry the failed operation.
    ///
    /// The engine itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PolicyStore { .. } | Self::Io { .. } | Self::Enumeration { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for policy store failures.
    #[must_use]
    pub fn store(uid: Uid, op: StoreOp, details: impl Into<String>) -> Self {
        Self::PolicyStore {
            uid,
            op,
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for NetPolicyError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for NetPolicyError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
