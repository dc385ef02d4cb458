//! App identity records and the raw enumeration tuple they are built from.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Permission that marks an app as network-capable.
pub const INTERNET_PERMISSION: &str = "android.permission.INTERNET";

/// OS-assigned numeric identity of an installed app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ──────────────────── icon ────────────────────

/// Opaque icon bitmap, compared by content.
///
/// The bytes are shared so cloning a record never copies image data.
#[derive(Clone)]
pub struct Icon {
    bytes: Arc<[u8]>,
    digest: [u8; 32],
}

impl Icon {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(&bytes));
        Self { bytes, digest }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::from_bytes(Vec::<u8>::new())
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex SHA-256 of the icon bytes.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl Default for Icon {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Icon {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.len() == other.bytes.len() && self.digest == other.digest
    }
}

impl Eq for Icon {}

impl fmt::Debug for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Icon")
            .field("len", &self.bytes.len())
            .field("sha256", &self.digest_hex())
            .finish()
    }
}

impl Serialize for Icon {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Icon", 2)?;
        state.serialize_field("len", &self.bytes.len())?;
        state.serialize_field("sha256", &self.digest_hex())?;
        state.end()
    }
}

// ──────────────────── enumeration tuple ────────────────────

/// One installed app as reported by the enumeration boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    pub name: String,
    pub package_name: String,
    pub icon: Icon,
    pub system_app: bool,
    pub uid: Option<Uid>,
    pub requested_permissions: Vec<String>,
}

impl InstalledApp {
    /// Whether the app declared the network permission.
    #[must_use]
    pub fn requests_internet(&self) -> bool {
        self.requested_permissions
            .iter()
            .any(|perm| perm == INTERNET_PERMISSION || perm == "INTERNET")
    }
}

// ──────────────────── app record ────────────────────

/// Identity and content of one app in the working set.
///
/// Expansion state is deliberately absent; see
/// [`crate::apps::view_state::ExpansionTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppRecord {
    pub name: String,
    pub package_name: String,
    pub icon: Icon,
    pub system_app: bool,
    pub uid: Option<Uid>,
    pub requests_internet_permission: bool,
}

impl AppRecord {
    #[must_use]
    pub fn from_installed(app: InstalledApp) -> Self {
        let requests_internet_permission = app.requests_internet();
        Self {
            name: app.name,
            package_name: app.package_name,
            icon: app.icon,
            system_app: app.system_app,
            uid: app.uid,
            requests_internet_permission,
        }
    }

    /// Equality over every field that affects how the row is drawn.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.icon == other.icon
            && self.name == other.name
            && self.package_name == other.package_name
            && self.system_app == other.system_app
            && self.uid == other.uid
    }
}
