pub mod lottery_store;
pub mod participant_store;
pub mod publish_store;
pub mod user_store;

pub use lottery_store::LotteryStore;
pub use participant_store::ParticipantStore;
pub use publish_store::PublishStore;
pub use user_store::UserStore;

use crate::error::{LotobotError, Result};
use rusqlite::Connection;
use std::path::Path;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LotobotError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lotteries (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                draw_type TEXT NOT NULL,
                draw_count INTEGER,
                draw_time INTEGER,
                require_username INTEGER NOT NULL DEFAULT 0,
                winner_template TEXT,
                creator_template TEXT,
                group_template TEXT,
                created_by INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS lottery_channels (
                lottery_id TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id),
                PRIMARY KEY (lottery_id, chat_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS prizes (
                id TEXT PRIMARY KEY,
                lottery_id TEXT NOT NULL,
                name TEXT NOT NULL,
                total INTEGER NOT NULL,
                remaining INTEGER NOT NULL,
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id)
            )",
            [],
        )?;

        // The unique constraint is what actually enforces one join per user
        // per lottery; the eligibility pre-check is advisory only.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS participants (
                id TEXT PRIMARY KEY,
                lottery_id TEXT NOT NULL,
                telegram_id INTEGER NOT NULL,
                username TEXT,
                first_name TEXT NOT NULL,
                last_name TEXT,
                invited_by INTEGER,
                invite_count INTEGER NOT NULL DEFAULT 0,
                joined_at INTEGER NOT NULL,
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id),
                UNIQUE (lottery_id, telegram_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS winners (
                id TEXT PRIMARY KEY,
                lottery_id TEXT NOT NULL,
                telegram_id INTEGER NOT NULL,
                prize_id TEXT NOT NULL,
                prize_name TEXT NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0,
                claimed INTEGER NOT NULL DEFAULT 0,
                claimed_at INTEGER,
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id),
                FOREIGN KEY (prize_id) REFERENCES prizes(id)
            )",
            [],
        )?;

        // Append-only publish history
        conn.execute(
            "CREATE TABLE IF NOT EXISTS publishes (
                id TEXT PRIMARY KEY,
                lottery_id TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                chat_title TEXT NOT NULL,
                message_id INTEGER NOT NULL,
                published_at INTEGER NOT NULL,
                FOREIGN KEY (lottery_id) REFERENCES lotteries(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                telegram_id INTEGER PRIMARY KEY,
                daily_join_count INTEGER NOT NULL DEFAULT 0,
                daily_join_reset_at INTEGER NOT NULL,
                is_vip INTEGER NOT NULL DEFAULT 0,
                vip_expire_at INTEGER
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
