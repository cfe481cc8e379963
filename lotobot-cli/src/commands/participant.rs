use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use lotobot_core::{JoinRequest, LotteryEngine, Result};

#[derive(Subcommand)]
pub enum ParticipantCommands {
    /// Join a lottery on behalf of a user
    Join {
        /// Lottery id
        lottery_id: String,
        /// Telegram id of the joining user
        #[arg(long)]
        user: i64,
        /// Username (required by some lotteries)
        #[arg(long)]
        username: Option<String>,
        /// First name
        #[arg(long, default_value = "")]
        first_name: String,
        /// Last name
        #[arg(long)]
        last_name: Option<String>,
        /// Telegram id of the inviter, if any
        #[arg(long)]
        invited_by: Option<i64>,
    },
    /// List participants in insertion order
    List {
        /// Lottery id
        lottery_id: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show the participant count
    Count {
        /// Lottery id
        lottery_id: String,
    },
}

pub async fn handle_participant_command(
    cmd: ParticipantCommands,
    engine: &LotteryEngine,
) -> Result<()> {
    match cmd {
        ParticipantCommands::Join {
            lottery_id,
            user,
            username,
            first_name,
            last_name,
            invited_by,
        } => {
            let req = JoinRequest {
                telegram_id: user,
                username,
                first_name,
                last_name,
                invited_by,
            };
            let participant = engine.join(&lottery_id, &req).await?;
            println!("Joined! Participant ID: {}", participant.id);

            // The join may have been the one that fired the draw.
            let lottery = engine.lottery(&lottery_id).await?;
            if lottery.status == lotobot_core::LotteryStatus::Drawn {
                println!("The draw has fired; see 'lotobot lottery info {}'", lottery_id);
            }
        }

        ParticipantCommands::List {
            lottery_id,
            limit,
            offset,
        } => {
            let participants = engine.participants(&lottery_id, limit, offset).await?;
            if participants.is_empty() {
                println!("No participants.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Telegram ID", "Name", "Username", "Invites", "Joined"]);
            for participant in participants {
                table.add_row(vec![
                    participant.telegram_id.to_string(),
                    participant.display_name(),
                    participant.username.clone().unwrap_or_default(),
                    participant.invite_count.to_string(),
                    participant.joined_at.to_rfc3339(),
                ]);
            }
            println!("{}", table);
        }

        ParticipantCommands::Count { lottery_id } => {
            println!("{}", engine.participant_count(&lottery_id).await?);
        }
    }

    Ok(())
}
