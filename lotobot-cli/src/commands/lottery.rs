use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use lotobot_core::{
    DrawType, LotobotError, LotteryEngine, NewLottery, NewPrize, RequiredChannel, Result,
};

#[derive(Subcommand)]
pub enum LotteryCommands {
    /// Create a new lottery with its prizes
    Create {
        /// Lottery title
        title: String,
        /// Prize as name:count (repeatable)
        #[arg(short, long = "prize", required = true)]
        prizes: Vec<String>,
        /// Draw when this many participants have joined
        #[arg(long, conflicts_with = "draw_time")]
        draw_count: Option<u32>,
        /// Draw at this time (RFC 3339)
        #[arg(long)]
        draw_time: Option<String>,
        /// Require participants to have a username
        #[arg(long)]
        require_username: bool,
        /// Required channel as chat_id:title (repeatable)
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Telegram id of the creator
        #[arg(long)]
        created_by: i64,
    },
    /// List all lotteries
    List,
    /// Show one lottery with prizes and winners
    Info {
        /// Lottery id
        id: String,
    },
    /// Trigger the draw manually (privileged)
    Draw {
        /// Lottery id
        id: String,
    },
    /// Cancel an active lottery
    Cancel {
        /// Lottery id
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn handle_lottery_command(cmd: LotteryCommands, engine: &LotteryEngine) -> Result<()> {
    match cmd {
        LotteryCommands::Create {
            title,
            prizes,
            draw_count,
            draw_time,
            require_username,
            channels,
            created_by,
        } => {
            let draw_time = draw_time.as_deref().map(parse_rfc3339).transpose()?;
            let draw_type = match (draw_count, draw_time) {
                (Some(_), None) => DrawType::Count,
                (None, Some(_)) => DrawType::Time,
                _ => {
                    return Err(LotobotError::validation(
                        "specify exactly one of --draw-count and --draw-time",
                    ))
                }
            };

            let new = NewLottery {
                title,
                draw_type,
                draw_count,
                draw_time,
                require_username,
                channels: channels
                    .iter()
                    .map(|raw| parse_channel(raw))
                    .collect::<Result<_>>()?,
                prizes: prizes
                    .iter()
                    .map(|raw| parse_prize(raw))
                    .collect::<Result<_>>()?,
                created_by,
            };

            let lottery = engine.create_lottery(&new).await?;
            println!("Lottery created!");
            println!("  ID: {}", lottery.id);
            println!("  Title: {}", lottery.title);
            match lottery.draw_type {
                DrawType::Count => {
                    println!("  Draws at: {} participants", lottery.draw_count.unwrap_or(0))
                }
                DrawType::Time => println!(
                    "  Draws at: {}",
                    lottery.draw_time.map(|t| t.to_rfc3339()).unwrap_or_default()
                ),
            }
        }

        LotteryCommands::List => {
            let lotteries = engine.list_lotteries().await?;
            if lotteries.is_empty() {
                println!("No lotteries found.");
                println!("Create one with: lotobot lottery create <title> --prize name:count ...");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["ID", "Title", "Status", "Trigger", "Participants"]);

            for lottery in lotteries {
                let trigger = match lottery.draw_type {
                    DrawType::Count => {
                        format!("{} joins", lottery.draw_count.unwrap_or(0))
                    }
                    DrawType::Time => lottery
                        .draw_time
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                };
                let count = engine.participant_count(&lottery.id).await?;
                table.add_row(vec![
                    lottery.short_id().to_string(),
                    lottery.title.clone(),
                    lottery.status.as_str().to_string(),
                    trigger,
                    count.to_string(),
                ]);
            }
            println!("{}", table);
        }

        LotteryCommands::Info { id } => {
            let lottery = engine.lottery(&id).await?;
            println!("Lottery: {}", lottery.title);
            println!("  ID: {}", lottery.id);
            println!("  Status: {}", lottery.status.as_str());
            println!("  Created by: {}", lottery.created_by);
            println!("  Participants: {}", engine.participant_count(&id).await?);
            if !lottery.channels.is_empty() {
                println!("  Required channels:");
                for channel in &lottery.channels {
                    println!("    - {} ({})", channel.title, channel.chat_id);
                }
            }

            let mut prize_table = Table::new();
            prize_table.load_preset(UTF8_FULL);
            prize_table.set_header(vec!["Prize", "Total", "Remaining"]);
            for prize in engine.prizes(&id).await? {
                prize_table.add_row(vec![
                    prize.name.clone(),
                    prize.total.to_string(),
                    prize.remaining.to_string(),
                ]);
            }
            println!("{}", prize_table);

            let winners = engine.winners(&id).await?;
            if !winners.is_empty() {
                let mut winner_table = Table::new();
                winner_table.load_preset(UTF8_FULL);
                winner_table.set_header(vec!["User", "Prize", "Notified", "Claimed"]);
                for winner in winners {
                    winner_table.add_row(vec![
                        winner.telegram_id.to_string(),
                        winner.prize_name.clone(),
                        if winner.notified { "yes" } else { "no" }.to_string(),
                        if winner.claimed { "yes" } else { "no" }.to_string(),
                    ]);
                }
                println!("{}", winner_table);
            }
        }

        LotteryCommands::Draw { id } => {
            let winners = engine.draw_now(&id).await?;
            if winners.is_empty() {
                println!("Lottery drawn with no winners (no participants).");
            } else {
                println!("Winners:");
                for winner in winners {
                    println!("  {} -> {}", winner.telegram_id, winner.prize_name);
                }
            }
        }

        LotteryCommands::Cancel { id, force } => {
            let lottery = engine.lottery(&id).await?;
            if !force {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Cancel lottery \"{}\"?", lottery.title))
                    .default(false)
                    .interact()
                    .map_err(|e| LotobotError::internal(e.to_string()))?;
                if !confirmed {
                    println!("Aborted.");
                    return Ok(());
                }
            }
            engine.cancel_lottery(&id).await?;
            println!("Lottery cancelled.");
        }
    }

    Ok(())
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LotobotError::validation(format!("invalid draw time '{}': {}", raw, e)))
}

fn parse_prize(raw: &str) -> Result<NewPrize> {
    let (name, count) = raw
        .rsplit_once(':')
        .ok_or_else(|| LotobotError::validation(format!("prize '{}' is not name:count", raw)))?;
    Ok(NewPrize {
        name: name.to_string(),
        total: count
            .parse()
            .map_err(|_| LotobotError::validation(format!("prize count '{}' is not a number", count)))?,
    })
}

fn parse_channel(raw: &str) -> Result<RequiredChannel> {
    let (chat_id, title) = raw
        .split_once(':')
        .ok_or_else(|| LotobotError::validation(format!("channel '{}' is not chat_id:title", raw)))?;
    Ok(RequiredChannel {
        chat_id: chat_id
            .parse()
            .map_err(|_| LotobotError::validation(format!("chat id '{}' is not a number", chat_id)))?,
        title: title.to_string(),
    })
}
