use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Global daily join quota per user. `None` disables the quota policy.
    pub daily_join_limit: Option<u32>,
    /// Upper bound on each channel-membership probe. Probes that exceed it
    /// count as "not a member".
    pub membership_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            daily_join_limit: None,
            membership_timeout: Duration::from_secs(5),
        }
    }
}
