use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use lotobot_core::{LotobotError, LotteryEngine, PublishOutcome, Result};

#[derive(Subcommand)]
pub enum PublishCommands {
    /// Push the lottery announcement to a chat
    Send {
        /// Lottery id
        lottery_id: String,
        /// Destination chat id
        #[arg(long)]
        chat: i64,
        /// Destination chat title for the audit trail
        #[arg(long)]
        chat_title: String,
        /// Telegram id of the operator requesting the send
        #[arg(long)]
        actor: i64,
        /// Resend without the duplicate-send prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show the publish history of a lottery
    History {
        /// Lottery id
        lottery_id: String,
    },
}

pub async fn handle_publish_command(cmd: PublishCommands, engine: &LotteryEngine) -> Result<()> {
    match cmd {
        PublishCommands::Send {
            lottery_id,
            chat,
            chat_title,
            actor,
            force,
        } => {
            let outcome = engine
                .publish(&lottery_id, actor, chat, &chat_title, force)
                .await?;
            let record = match outcome {
                PublishOutcome::Published(record) => record,
                PublishOutcome::ConfirmationRequired(history) => {
                    if let Some(last) = history.last() {
                        println!(
                            "This lottery was already published to {} on {} ({} time(s) total).",
                            chat_title,
                            last.published_at.to_rfc3339(),
                            history.len()
                        );
                    }
                    let confirmed = Confirm::new()
                        .with_prompt("Send it again?")
                        .default(false)
                        .interact()
                        .map_err(|e| LotobotError::internal(e.to_string()))?;
                    if !confirmed {
                        println!("Aborted.");
                        return Ok(());
                    }
                    match engine
                        .publish(&lottery_id, actor, chat, &chat_title, true)
                        .await?
                    {
                        PublishOutcome::Published(record) => record,
                        PublishOutcome::ConfirmationRequired(_) => {
                            return Err(LotobotError::internal(
                                "forced publish still asked for confirmation",
                            ))
                        }
                    }
                }
            };
            println!(
                "Published to {} (message {})",
                record.chat_title, record.message_id
            );
        }

        PublishCommands::History { lottery_id } => {
            let history = engine.publish_history(&lottery_id).await?;
            if history.is_empty() {
                println!("Never published.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Chat", "Chat ID", "Message", "Published at"]);
            for record in history {
                table.add_row(vec![
                    record.chat_title.clone(),
                    record.chat_id.to_string(),
                    record.message_id.to_string(),
                    record.published_at.to_rfc3339(),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
