//! Display-mode derivation from the set of allowed restriction flags.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::flags::{PolicyMask, RestrictionFlag};

/// Two-valued summary shown on a collapsed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Every tracked flag is allowed.
    Default,
    /// At least one tracked flag is blocking.
    Custom,
}

impl PolicyMode {
    /// Row caption for this mode.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Default => "Default settings",
            Self::Custom => "Custom settings",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Derive the display mode for one app.
///
/// Returns `None` when the app does not request network access, since no
/// policy controls apply to it.
#[must_use]
pub fn derive_mode(
    allowed: &BTreeSet<RestrictionFlag>,
    tracked: &[RestrictionFlag],
    requests_internet: bool,
) -> Option<PolicyMode> {
    if !requests_internet {
        return None;
    }
    if tracked.iter().all(|flag| allowed.contains(flag)) {
        Some(PolicyMode::Default)
    } else {
        Some(PolicyMode::Custom)
    }
}

/// Shorthand for [`derive_mode`] straight from a mask.
#[must_use]
pub fn derive_mode_for_mask(
    mask: PolicyMask,
    tracked: &[RestrictionFlag],
    requests_internet: bool,
) -> Option<PolicyMode> {
    derive_mode(&mask.allowed_flags(tracked), tracked, requests_internet)
}
