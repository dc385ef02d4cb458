//! Restriction flags and the per-UID policy bitmask codec.
//!
//! Bit assignments mirror the platform uid-policy ABI so that a mask written
//! here is read identically by whatever enforces it. Bits the engine does not
//! know about are carried through untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::NetPolicyError;

// ──────────────────── raw codec ────────────────────

/// True iff none of `flag`'s bits are set in `bitmask`.
#[must_use]
pub const fn is_allowed(bitmask: u32, flag: u32) -> bool {
    bitmask & flag == 0
}

/// Returns `bitmask` with `flag` cleared when `allowed`, set otherwise.
#[must_use]
pub const fn set_allowed(bitmask: u32, flag: u32, allowed: bool) -> u32 {
    if allowed {
        bitmask & !flag
    } else {
        bitmask | flag
    }
}

// ──────────────────── restriction flag ────────────────────

/// One independently toggleable network-blocking condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestrictionFlag {
    /// Global block: no network at all.
    RejectAll,
    /// Block background data on metered networks.
    RejectMeteredBackground,
    /// Block Wi-Fi.
    RejectWifi,
    /// Block mobile data.
    RejectCellular,
    /// Block traffic routed through a VPN.
    RejectVpn,
}

impl RestrictionFlag {
    /// Every known flag, in switch display order.
    pub const ALL: [Self; 5] = [
        Self::RejectAll,
        Self::RejectMeteredBackground,
        Self::RejectWifi,
        Self::RejectCellular,
        Self::RejectVpn,
    ];

    /// Bit pattern defined by the uid-policy ABI.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::RejectMeteredBackground => 0x0000_0001,
            Self::RejectWifi => 0x0000_8000,
            Self::RejectCellular => 0x0001_0000,
            Self::RejectVpn => 0x0002_0000,
            Self::RejectAll => 0x0004_0000,
        }
    }

    /// Constant name as exposed by the policy ABI.
    #[must_use]
    pub const fn constant_name(self) -> &'static str {
        match self {
            Self::RejectAll => "REJECT_ALL",
            Self::RejectMeteredBackground => "REJECT_METERED_BACKGROUND",
            Self::RejectWifi => "REJECT_WIFI",
            Self::RejectCellular => "REJECT_CELLULAR",
            Self::RejectVpn => "REJECT_VPN",
        }
    }

    /// Short CLI spelling.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::RejectAll => "all",
            Self::RejectMeteredBackground => "background",
            Self::RejectWifi => "wifi",
            Self::RejectCellular => "cellular",
            Self::RejectVpn => "vpn",
        }
    }

    /// Switch label shown next to the control.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RejectAll => "Network access",
            Self::RejectMeteredBackground => "Background data",
            Self::RejectWifi => "Wi-Fi",
            Self::RejectCellular => "Mobile data",
            Self::RejectVpn => "VPN",
        }
    }
}

impl fmt::Display for RestrictionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constant_name())
    }
}

impl FromStr for RestrictionFlag {
    type Err = NetPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let flag = match normalized.trim_start_matches("policy_") {
            "all" | "reject_all" | "global" => Self::RejectAll,
            "background" | "reject_metered_background" | "metered_background" => {
                Self::RejectMeteredBackground
            }
            "wifi" | "reject_wifi" => Self::RejectWifi,
            "cellular" | "mobile" | "reject_cellular" => Self::RejectCellular,
            "vpn" | "reject_vpn" => Self::RejectVpn,
            _ => {
                return Err(NetPolicyError::UnknownFlag {
                    input: s.to_string(),
                });
            }
        };
        Ok(flag)
    }
}

// ──────────────────── policy mask ────────────────────

/// Effective policy bitmask for one UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyMask(pub u32);

impl PolicyMask {
    /// Mask with no restrictions.
    pub const NONE: Self = Self(0);

    /// Traffic under `flag` is permitted.
    #[must_use]
    pub const fn is_allowed(self, flag: RestrictionFlag) -> bool {
        is_allowed(self.0, flag.bits())
    }

    /// Copy with `flag` set to `allowed`, other bits untouched.
    #[must_use]
    pub const fn with_allowed(self, flag: RestrictionFlag, allowed: bool) -> Self {
        Self(set_allowed(self.0, flag.bits(), allowed))
    }

    /// The subset of `tracked` that this mask allows.
    #[must_use]
    pub fn allowed_flags(self, tracked: &[RestrictionFlag]) -> BTreeSet<RestrictionFlag> {
        tracked
            .iter()
            .copied()
            .filter(|flag| self.is_allowed(*flag))
            .collect()
    }

    /// Known flags currently set (blocking).
    #[must_use]
    pub fn active_restrictions(self) -> Vec<RestrictionFlag> {
        RestrictionFlag::ALL
            .into_iter()
            .filter(|flag| !self.is_allowed(*flag))
            .collect()
    }
}

impl fmt::Display for PolicyMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
