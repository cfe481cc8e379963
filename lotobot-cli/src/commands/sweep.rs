use crate::config::CliConfig;
use lotobot_core::{LotobotError, LotteryEngine, Result};

/// Scheduler entry point: draw every active time-type lottery whose draw
/// time has elapsed. Guarded by the shared secret from the config so only
/// the external scheduler can run it.
pub async fn handle_sweep(
    engine: &LotteryEngine,
    config: &CliConfig,
    secret: &str,
) -> Result<()> {
    let Some(expected) = &config.sweep_secret else {
        return Err(LotobotError::validation(
            "sweep_secret is not configured; refusing to sweep",
        ));
    };
    if secret != expected {
        return Err(LotobotError::validation("sweep secret mismatch"));
    }

    let drawn = engine.sweep_due().await?;
    if drawn.is_empty() {
        println!("No lotteries were due.");
        return Ok(());
    }

    for (lottery_id, winners) in drawn {
        println!("Drew lottery {}: {} winner(s)", lottery_id, winners.len());
    }
    Ok(())
}
