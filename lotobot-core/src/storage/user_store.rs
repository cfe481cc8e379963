use crate::error::Result;
use crate::storage::Storage;
use crate::types::UserQuota;
use chrono::{DateTime, Local, Utc};
use rusqlite::{params, OptionalExtension};

pub struct UserStore<'a> {
    storage: &'a Storage,
}

impl<'a> UserStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Fetch the quota row for a user, creating it on first sight.
    pub async fn get_or_create(&self, telegram_id: i64) -> Result<UserQuota> {
        let conn = self.storage.get_connection().await;

        let existing = conn
            .query_row(
                "SELECT telegram_id, daily_join_count, daily_join_reset_at, is_vip, vip_expire_at
                 FROM users WHERE telegram_id = ?1",
                params![telegram_id],
                |row| {
                    let reset_ts: i64 = row.get(2)?;
                    let vip_ts: Option<i64> = row.get(4)?;
                    Ok(UserQuota {
                        telegram_id: row.get(0)?,
                        daily_join_count: row.get(1)?,
                        daily_join_reset_at: DateTime::from_timestamp(reset_ts, 0)
                            .unwrap_or_else(Utc::now),
                        is_vip: row.get(3)?,
                        vip_expire_at: vip_ts.and_then(|ts| DateTime::from_timestamp(ts, 0)),
                    })
                },
            )
            .optional()?;

        if let Some(quota) = existing {
            return Ok(quota);
        }

        let quota = UserQuota {
            telegram_id,
            daily_join_count: 0,
            daily_join_reset_at: Utc::now(),
            is_vip: false,
            vip_expire_at: None,
        };
        // Another request may create the row first; the counter state is the
        // same either way.
        conn.execute(
            "INSERT OR IGNORE INTO users (telegram_id, daily_join_count, daily_join_reset_at, is_vip)
             VALUES (?1, 0, ?2, 0)",
            params![telegram_id, quota.daily_join_reset_at.timestamp()],
        )?;
        Ok(quota)
    }

    /// Zero the counter and move the reset anchor to now.
    pub async fn reset_daily_count(&self, telegram_id: i64) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE users SET daily_join_count = 0, daily_join_reset_at = ?1
             WHERE telegram_id = ?2",
            params![Utc::now().timestamp(), telegram_id],
        )?;
        Ok(())
    }

    /// Atomic in-place increment of the daily counter.
    pub async fn increment_daily_count(&self, telegram_id: i64) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE users SET daily_join_count = daily_join_count + 1 WHERE telegram_id = ?1",
            params![telegram_id],
        )?;
        Ok(())
    }

    pub async fn set_vip(&self, telegram_id: i64, expire_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "INSERT INTO users (telegram_id, daily_join_count, daily_join_reset_at, is_vip, vip_expire_at)
             VALUES (?1, 0, ?2, 1, ?3)
             ON CONFLICT(telegram_id) DO UPDATE SET is_vip = 1, vip_expire_at = excluded.vip_expire_at",
            params![
                telegram_id,
                Utc::now().timestamp(),
                expire_at.map(|t| t.timestamp())
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn set_quota_state(
        &self,
        telegram_id: i64,
        count: u32,
        reset_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE users SET daily_join_count = ?1, daily_join_reset_at = ?2 WHERE telegram_id = ?3",
            params![count, reset_at.timestamp(), telegram_id],
        )?;
        Ok(())
    }
}

/// Quota days roll over at local midnight, not UTC.
pub fn same_local_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.with_timezone(&Local).date_naive() == b.with_timezone(&Local).date_naive()
}
