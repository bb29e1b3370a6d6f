//! Trunk status values.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a trunk as reported by the driver or agent that owns it.
///
/// A new trunk starts in [`TrunkStatus::Pending`]. After that the status only
/// changes when a driver reports a new value; any recognized value may follow
/// any other and no value is terminal.
///
/// # Examples
///
/// ```
/// use trunk_types::TrunkStatus;
///
/// let status: TrunkStatus = "ACTIVE".parse().unwrap();
/// assert_eq!(status, TrunkStatus::Active);
/// assert_eq!(TrunkStatus::default(), TrunkStatus::Pending);
///
/// // Values outside the recognized set are rejected
/// assert!("RUNNING".parse::<TrunkStatus>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrunkStatus {
    /// Trunk and all sub-ports are wired on the host.
    Active,
    /// Parent port is down or unbound.
    Down,
    /// Driver is wiring the trunk.
    Build,
    /// Trunk works but some sub-ports failed to wire.
    Degraded,
    /// Driver failed to wire the trunk.
    Error,
    /// Trunk was created and no driver has reported yet.
    #[default]
    Pending,
}

impl TrunkStatus {
    /// Status assigned to every newly created trunk.
    pub const INITIAL: TrunkStatus = TrunkStatus::Pending;

    /// Every recognized status.
    pub const ALL: [TrunkStatus; 6] = [
        TrunkStatus::Active,
        TrunkStatus::Down,
        TrunkStatus::Build,
        TrunkStatus::Degraded,
        TrunkStatus::Error,
        TrunkStatus::Pending,
    ];

    /// Returns the wire name of this status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TrunkStatus::Active => "ACTIVE",
            TrunkStatus::Down => "DOWN",
            TrunkStatus::Build => "BUILD",
            TrunkStatus::Degraded => "DEGRADED",
            TrunkStatus::Error => "ERROR",
            TrunkStatus::Pending => "PENDING",
        }
    }

    /// Returns true if traffic can flow over the trunk.
    pub const fn is_operational(&self) -> bool {
        matches!(self, TrunkStatus::Active | TrunkStatus::Degraded)
    }
}

impl fmt::Display for TrunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrunkStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrunkStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseError::InvalidTrunkStatus(s.to_string()))
    }
}
