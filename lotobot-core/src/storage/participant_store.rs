use crate::error::{LotobotError, Result};
use crate::storage::Storage;
use crate::types::{JoinRequest, Participant};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

pub struct ParticipantStore<'a> {
    storage: &'a Storage,
}

impl<'a> ParticipantStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Insert a join record. The UNIQUE(lottery_id, telegram_id) constraint
    /// is the authoritative duplicate guard; a violation maps to
    /// AlreadyJoined so concurrent duplicate requests fail cleanly.
    pub async fn insert(&self, lottery_id: &str, req: &JoinRequest) -> Result<Participant> {
        let conn = self.storage.get_connection().await;

        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            lottery_id: lottery_id.to_string(),
            telegram_id: req.telegram_id,
            username: req.username.clone(),
            first_name: req.first_name.clone(),
            last_name: req.last_name.clone(),
            invited_by: req.invited_by,
            invite_count: 0,
            joined_at: Utc::now(),
        };

        // Guarded on lottery status so a join racing a draw cannot land a
        // row in an already-drawn lottery.
        let inserted = conn.execute(
            "INSERT INTO participants
             (id, lottery_id, telegram_id, username, first_name, last_name, invited_by, invite_count, joined_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8
             WHERE EXISTS (SELECT 1 FROM lotteries WHERE id = ?2 AND status = 'active')",
            params![
                participant.id,
                participant.lottery_id,
                participant.telegram_id,
                participant.username,
                participant.first_name,
                participant.last_name,
                participant.invited_by,
                participant.joined_at.timestamp(),
            ],
        );

        match inserted {
            Ok(0) => Err(LotobotError::not_active(lottery_id)),
            Ok(_) => Ok(participant),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(LotobotError::AlreadyJoined)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, lottery_id: &str, telegram_id: i64) -> Result<bool> {
        let conn = self.storage.get_connection().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE lottery_id = ?1 AND telegram_id = ?2",
            params![lottery_id, telegram_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub async fn count(&self, lottery_id: &str) -> Result<u32> {
        let conn = self.storage.get_connection().await;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE lottery_id = ?1",
            params![lottery_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Participants in insertion order.
    pub async fn list(
        &self,
        lottery_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Participant>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, lottery_id, telegram_id, username, first_name, last_name,
                    invited_by, invite_count, joined_at
             FROM participants WHERE lottery_id = ?1
             ORDER BY rowid ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![lottery_id, limit, offset], map_participant_row)?;

        let mut participants = Vec::new();
        for participant in rows {
            participants.push(participant?);
        }
        Ok(participants)
    }

    /// Increment the inviter's referral counter. Monotonic, never decremented.
    pub async fn increment_invite_count(&self, lottery_id: &str, telegram_id: i64) -> Result<()> {
        let conn = self.storage.get_connection().await;
        conn.execute(
            "UPDATE participants SET invite_count = invite_count + 1
             WHERE lottery_id = ?1 AND telegram_id = ?2",
            params![lottery_id, telegram_id],
        )?;
        Ok(())
    }
}

pub(crate) fn map_participant_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    let joined_at_ts: i64 = row.get(8)?;
    Ok(Participant {
        id: row.get(0)?,
        lottery_id: row.get(1)?,
        telegram_id: row.get(2)?,
        username: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        invited_by: row.get(6)?,
        invite_count: row.get(7)?,
        joined_at: DateTime::from_timestamp(joined_at_ts, 0).unwrap_or_else(Utc::now),
    })
}
