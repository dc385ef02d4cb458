//! Which switches a session exposes and how it treats offline apps.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::policy::flags::RestrictionFlag;

/// Preset switch layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// Every restriction flag, rows expand to show them.
    #[default]
    Full,
    /// The global switch only.
    Simple,
}

/// Treatment of apps that never requested the internet permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfflineApps {
    /// Left out of the working set.
    #[default]
    Hide,
    /// Listed, with every switch disabled.
    Disable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Flags that get a switch and take part in mode derivation, in display order.
    pub tracked_flags: Vec<RestrictionFlag>,
    pub expandable: bool,
    pub offline_apps: OfflineApps,
}

impl Capabilities {
    #[must_use]
    pub fn full() -> Self {
        Self {
            tracked_flags: RestrictionFlag::ALL.to_vec(),
            expandable: true,
            offline_apps: OfflineApps::Hide,
        }
    }

    #[must_use]
    pub fn simple() -> Self {
        Self {
            tracked_flags: vec![RestrictionFlag::RejectAll],
            expandable: false,
            offline_apps: OfflineApps::Hide,
        }
    }

    #[must_use]
    pub fn for_variant(variant: EngineVariant) -> Self {
        match variant {
            EngineVariant::Full => Self::full(),
            EngineVariant::Simple => Self::simple(),
        }
    }

    #[must_use]
    pub fn tracks(&self, flag: RestrictionFlag) -> bool {
        self.tracked_flags.contains(&flag)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}
