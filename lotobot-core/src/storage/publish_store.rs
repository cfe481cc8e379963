use crate::error::Result;
use crate::storage::Storage;
use crate::types::PublishRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

/// Append-only history of announcement pushes. Rows are never updated or
/// deleted; duplicate-send prevention and audit both read from here.
pub struct PublishStore<'a> {
    storage: &'a Storage,
}

impl<'a> PublishStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn append(
        &self,
        lottery_id: &str,
        chat_id: i64,
        chat_title: &str,
        message_id: i64,
    ) -> Result<PublishRecord> {
        let conn = self.storage.get_connection().await;

        let record = PublishRecord {
            id: Uuid::new_v4().to_string(),
            lottery_id: lottery_id.to_string(),
            chat_id,
            chat_title: chat_title.to_string(),
            message_id,
            published_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO publishes (id, lottery_id, chat_id, chat_title, message_id, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.lottery_id,
                record.chat_id,
                record.chat_title,
                record.message_id,
                record.published_at.timestamp(),
            ],
        )?;

        tracing::info!(
            "Recorded publish of lottery {} to chat {} ({})",
            lottery_id,
            chat_id,
            chat_title
        );
        Ok(record)
    }

    /// History for one (lottery, chat) pair, oldest first.
    pub async fn history_for_chat(
        &self,
        lottery_id: &str,
        chat_id: i64,
    ) -> Result<Vec<PublishRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, lottery_id, chat_id, chat_title, message_id, published_at
             FROM publishes WHERE lottery_id = ?1 AND chat_id = ?2 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![lottery_id, chat_id], map_publish_row)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// Every destination chat this lottery was ever pushed to, deduplicated.
    pub async fn destinations(&self, lottery_id: &str) -> Result<Vec<(i64, String)>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT chat_id, MAX(chat_title) FROM publishes
             WHERE lottery_id = ?1 GROUP BY chat_id ORDER BY MIN(rowid) ASC",
        )?;
        let rows = stmt.query_map(params![lottery_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut chats = Vec::new();
        for chat in rows {
            chats.push(chat?);
        }
        Ok(chats)
    }

    pub async fn history(&self, lottery_id: &str) -> Result<Vec<PublishRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, lottery_id, chat_id, chat_title, message_id, published_at
             FROM publishes WHERE lottery_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![lottery_id], map_publish_row)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}

fn map_publish_row(row: &Row<'_>) -> rusqlite::Result<PublishRecord> {
    let published_ts: i64 = row.get(5)?;
    Ok(PublishRecord {
        id: row.get(0)?,
        lottery_id: row.get(1)?,
        chat_id: row.get(2)?,
        chat_title: row.get(3)?,
        message_id: row.get(4)?,
        published_at: DateTime::from_timestamp(published_ts, 0).unwrap_or_else(Utc::now),
    })
}
