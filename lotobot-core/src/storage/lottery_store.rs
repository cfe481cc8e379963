use crate::error::{LotobotError, Result};
use crate::storage::Storage;
use crate::types::{
    DrawType, Lottery, LotteryPatch, LotteryStatus, NewLottery, Prize, RequiredChannel, Winner,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub struct LotteryStore<'a> {
    storage: &'a Storage,
}

impl<'a> LotteryStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Create a lottery together with its prizes and channel requirements.
    pub async fn create(&self, new: &NewLottery) -> Result<Lottery> {
        match new.draw_type {
            DrawType::Count if new.draw_count.is_none() => {
                return Err(LotobotError::validation(
                    "count-type lottery needs a draw count",
                ));
            }
            DrawType::Time if new.draw_time.is_none() => {
                return Err(LotobotError::validation(
                    "time-type lottery needs a draw time",
                ));
            }
            _ => {}
        }
        if new.prizes.is_empty() {
            return Err(LotobotError::validation("lottery needs at least one prize"));
        }

        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let lottery_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        tx.execute(
            "INSERT INTO lotteries
             (id, title, status, draw_type, draw_count, draw_time, require_username, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                lottery_id,
                new.title,
                LotteryStatus::Active.as_str(),
                new.draw_type.as_str(),
                new.draw_count,
                new.draw_time.map(|t| t.timestamp()),
                new.require_username,
                new.created_by,
                created_at.timestamp(),
            ],
        )?;

        for channel in &new.channels {
            tx.execute(
                "INSERT INTO lottery_channels (lottery_id, chat_id, title) VALUES (?1, ?2, ?3)",
                params![lottery_id, channel.chat_id, channel.title],
            )?;
        }

        for prize in &new.prizes {
            tx.execute(
                "INSERT INTO prizes (id, lottery_id, name, total, remaining)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![Uuid::new_v4().to_string(), lottery_id, prize.name, prize.total],
            )?;
        }

        tx.commit()?;
        tracing::info!("Created lottery '{}' with ID: {}", new.title, lottery_id);

        drop(conn);
        self.get(&lottery_id).await?.ok_or_else(|| {
            LotobotError::internal("lottery vanished immediately after creation")
        })
    }

    pub async fn get(&self, lottery_id: &str) -> Result<Option<Lottery>> {
        let conn = self.storage.get_connection().await;

        let lottery = conn
            .query_row(
                "SELECT id, title, status, draw_type, draw_count, draw_time, require_username,
                        winner_template, creator_template, group_template, created_by, created_at
                 FROM lotteries WHERE id = ?1",
                params![lottery_id],
                map_lottery_row,
            )
            .optional()?;

        let Some(mut lottery) = lottery else {
            return Ok(None);
        };
        lottery.channels = load_channels(&conn, lottery_id)?;
        Ok(Some(lottery))
    }

    pub async fn list(&self) -> Result<Vec<Lottery>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, title, status, draw_type, draw_count, draw_time, require_username,
                    winner_template, creator_template, group_template, created_by, created_at
             FROM lotteries ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], map_lottery_row)?;

        let mut lotteries = Vec::new();
        for row in rows {
            let mut lottery = row?;
            lottery.channels = load_channels(&conn, &lottery.id)?;
            lotteries.push(lottery);
        }
        Ok(lotteries)
    }

    /// Active time-type lotteries whose draw time has elapsed.
    pub async fn list_due_time_draws(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id FROM lotteries
             WHERE status = 'active' AND draw_type = 'time' AND draw_time <= ?1",
        )?;
        let rows = stmt.query_map(params![now.timestamp()], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Conditionally move an active lottery to cancelled. Returns false when
    /// the lottery had already left the active state.
    pub async fn cancel(&self, lottery_id: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let updated = conn.execute(
            "UPDATE lotteries SET status = 'cancelled' WHERE id = ?1 AND status = 'active'",
            params![lottery_id],
        )?;
        if updated == 1 {
            tracing::info!("Cancelled lottery {}", lottery_id);
        }
        Ok(updated == 1)
    }

    /// Apply a partial update. Rejected once the lottery has left the active
    /// state, so drawn results can never be rewritten.
    pub async fn apply_patch(&self, lottery_id: &str, patch: &LotteryPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let conn = self.storage.get_connection().await;

        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(title) = &patch.title {
            sets.push("title = ?");
            values.push(Box::new(title.clone()));
        }
        if let Some(count) = patch.draw_count {
            sets.push("draw_count = ?");
            values.push(Box::new(count));
        }
        if let Some(time) = patch.draw_time {
            sets.push("draw_time = ?");
            values.push(Box::new(time.timestamp()));
        }
        if let Some(require) = patch.require_username {
            sets.push("require_username = ?");
            values.push(Box::new(require));
        }
        if let Some(tpl) = &patch.winner_template {
            sets.push("winner_template = ?");
            values.push(Box::new(tpl.clone()));
        }
        if let Some(tpl) = &patch.creator_template {
            sets.push("creator_template = ?");
            values.push(Box::new(tpl.clone()));
        }
        if let Some(tpl) = &patch.group_template {
            sets.push("group_template = ?");
            values.push(Box::new(tpl.clone()));
        }
        values.push(Box::new(lottery_id.to_string()));

        let sql = format!(
            "UPDATE lotteries SET {} WHERE id = ? AND status = 'active'",
            sets.join(", ")
        );
        let updated = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        if updated == 0 {
            return Err(LotobotError::not_active(lottery_id));
        }
        Ok(())
    }

    pub async fn prizes(&self, lottery_id: &str) -> Result<Vec<Prize>> {
        let conn = self.storage.get_connection().await;
        load_prizes(&conn, lottery_id)
    }

    pub async fn winners(&self, lottery_id: &str) -> Result<Vec<Winner>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, lottery_id, telegram_id, prize_id, prize_name, notified, claimed, claimed_at
             FROM winners WHERE lottery_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![lottery_id], map_winner_row)?;

        let mut winners = Vec::new();
        for winner in rows {
            winners.push(winner?);
        }
        Ok(winners)
    }

    pub async fn mark_notified(&self, winner_id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE winners SET notified = 1 WHERE id = ?1",
            params![winner_id],
        )?;
        Ok(())
    }

    pub async fn mark_claimed(&self, winner_id: &str) -> Result<()> {
        let conn = self.storage.get_connection().await;
        let updated = conn.execute(
            "UPDATE winners SET claimed = 1, claimed_at = ?1 WHERE id = ?2 AND claimed = 0",
            params![Utc::now().timestamp(), winner_id],
        )?;
        if updated == 0 {
            return Err(LotobotError::conflict("winner already claimed or unknown"));
        }
        Ok(())
    }
}

pub(crate) fn map_lottery_row(row: &Row<'_>) -> rusqlite::Result<Lottery> {
    let status_str: String = row.get(2)?;
    let draw_type_str: String = row.get(3)?;
    let draw_time_ts: Option<i64> = row.get(5)?;
    let created_at_ts: i64 = row.get(11)?;

    Ok(Lottery {
        id: row.get(0)?,
        title: row.get(1)?,
        status: LotteryStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, "status".to_string(), rusqlite::types::Type::Text)
        })?,
        draw_type: DrawType::parse(&draw_type_str).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                3,
                "draw_type".to_string(),
                rusqlite::types::Type::Text,
            )
        })?,
        draw_count: row.get(4)?,
        draw_time: draw_time_ts.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        require_username: row.get(6)?,
        channels: Vec::new(),
        winner_template: row.get(7)?,
        creator_template: row.get(8)?,
        group_template: row.get(9)?,
        created_by: row.get(10)?,
        created_at: DateTime::from_timestamp(created_at_ts, 0).unwrap_or_else(Utc::now),
    })
}

pub(crate) fn map_winner_row(row: &Row<'_>) -> rusqlite::Result<Winner> {
    let claimed_at_ts: Option<i64> = row.get(7)?;
    Ok(Winner {
        id: row.get(0)?,
        lottery_id: row.get(1)?,
        telegram_id: row.get(2)?,
        prize_id: row.get(3)?,
        prize_name: row.get(4)?,
        notified: row.get(5)?,
        claimed: row.get(6)?,
        claimed_at: claimed_at_ts.and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}

pub(crate) fn load_channels(
    conn: &Connection,
    lottery_id: &str,
) -> Result<Vec<RequiredChannel>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, title FROM lottery_channels WHERE lottery_id = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![lottery_id], |row| {
        Ok(RequiredChannel {
            chat_id: row.get(0)?,
            title: row.get(1)?,
        })
    })?;

    let mut channels = Vec::new();
    for channel in rows {
        channels.push(channel?);
    }
    Ok(channels)
}

pub(crate) fn load_prizes(conn: &Connection, lottery_id: &str) -> Result<Vec<Prize>> {
    let mut stmt = conn.prepare(
        "SELECT id, lottery_id, name, total, remaining
         FROM prizes WHERE lottery_id = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![lottery_id], |row| {
        Ok(Prize {
            id: row.get(0)?,
            lottery_id: row.get(1)?,
            name: row.get(2)?,
            total: row.get(3)?,
            remaining: row.get(4)?,
        })
    })?;

    let mut prizes = Vec::new();
    for prize in rows {
        prizes.push(prize?);
    }
    Ok(prizes)
}
