use serde::{Deserialize, Serialize};
use std::path::Path;

/// Operator configuration, read from `config.json` in the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Telegram bot token. Without it the CLI runs against the console
    /// providers (deliveries are logged, membership checks pass).
    pub bot_token: Option<String>,
    /// Shared secret the external scheduler must present to run the sweep.
    pub sweep_secret: Option<String>,
    /// Global daily join quota per user; absent disables the policy.
    pub daily_join_limit: Option<u32>,
}

impl CliConfig {
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
