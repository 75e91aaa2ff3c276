//! What to do when the lock store cannot be reached.

use std::str::FromStr;

use crate::cache::LocalCache;
use crate::error::Error;
use crate::model::{Decision, IncidentKey};

/// Policy applied once a claim attempt comes back unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DegradationPolicy {
    /// Fall back to the local cache: the first sighting in this process
    /// proceeds degraded, later ones skip. Other processes that are also
    /// degraded may act on the same key during the outage.
    #[default]
    FailOpen,
    /// Skip every action that could not be claimed durably.
    FailClosed,
}

impl DegradationPolicy {
    pub fn on_store_unavailable(self, key: &IncidentKey, cache: &LocalCache) -> Decision {
        match self {
            DegradationPolicy::FailOpen => {
                if cache.mark_if_absent(key) {
                    Decision::ProceedDegraded
                } else {
                    Decision::Skip
                }
            }
            DegradationPolicy::FailClosed => Decision::Skip,
        }
    }
}

impl std::fmt::Display for DegradationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DegradationPolicy::FailOpen => "fail-open",
            DegradationPolicy::FailClosed => "fail-closed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DegradationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-open" | "open" => Ok(DegradationPolicy::FailOpen),
            "fail-closed" | "closed" => Ok(DegradationPolicy::FailClosed),
            other => Err(Error::Config(format!(
                "unknown degraded mode {other:?} (expected fail-open or fail-closed)"
            ))),
        }
    }
}
