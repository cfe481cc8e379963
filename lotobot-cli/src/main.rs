mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use lotobot_core::{
    ConsoleMessenger, EngineConfig, LotobotError, LotteryEngine, MembershipProvider, Messenger,
    NoCustomTemplates, OpenMembership, TelegramProvider,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lotobot")]
#[command(about = "Lottery participation and draw engine for chat-bot giveaways")]
#[command(version)]
struct Cli {
    /// Data directory for the lottery database and config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lottery management commands
    #[command(subcommand)]
    Lottery(commands::LotteryCommands),

    /// Participant commands
    #[command(subcommand)]
    Participant(commands::ParticipantCommands),

    /// Announcement publishing commands
    #[command(subcommand)]
    Publish(commands::PublishCommands),

    /// Draw every due time-based lottery (scheduler entry point)
    Sweep {
        /// Shared secret configured as sweep_secret
        #[arg(long)]
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "lotobot={}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lotobot")
    });
    tokio::fs::create_dir_all(&data_dir).await?;

    let config = CliConfig::load(&data_dir)?;

    let (membership, messenger): (Arc<dyn MembershipProvider>, Arc<dyn Messenger>) =
        match &config.bot_token {
            Some(token) => {
                let provider = Arc::new(TelegramProvider::new(token.clone())?);
                (provider.clone(), provider)
            }
            None => {
                tracing::warn!("No bot_token configured; using console providers");
                (Arc::new(OpenMembership), Arc::new(ConsoleMessenger::new()))
            }
        };

    let engine = LotteryEngine::new(
        &data_dir,
        membership,
        messenger,
        Arc::new(NoCustomTemplates),
        EngineConfig {
            daily_join_limit: config.daily_join_limit,
            ..EngineConfig::default()
        },
    )
    .await?;

    // Execute command
    let result = match cli.command {
        Commands::Lottery(cmd) => commands::handle_lottery_command(cmd, &engine).await,
        Commands::Participant(cmd) => commands::handle_participant_command(cmd, &engine).await,
        Commands::Publish(cmd) => commands::handle_publish_command(cmd, &engine).await,
        Commands::Sweep { secret } => commands::handle_sweep(&engine, &config, &secret).await,
    };

    if let Err(e) = result {
        // rejections are user mistakes, not faults; give them a distinct exit code
        let code = if e.is_rejection() { 2 } else { 1 };
        match e {
            LotobotError::NotFound { id } => {
                eprintln!("Error: Lottery '{}' not found", id);
                eprintln!("Use 'lotobot lottery list' to see known lotteries");
            }
            LotobotError::ChannelMembershipRequired { missing } => {
                eprintln!("Error: User must join these channels first:");
                for title in missing {
                    eprintln!("  - {}", title);
                }
            }
            LotobotError::DailyLimitReached { limit } => {
                eprintln!("Error: Daily join limit of {} reached", limit);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(code);
    }

    Ok(())
}
