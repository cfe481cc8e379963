use crate::error::{LotobotError, Result};
use crate::storage::lottery_store::load_prizes;
use crate::storage::participant_store::map_participant_row;
use crate::storage::Storage;
use crate::types::{DrawType, LotteryStatus, Participant, Prize, Winner};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

/// Result of one draw attempt.
#[derive(Debug, Clone)]
pub enum DrawOutcome {
    /// This attempt owned the draw; the lottery is now drawn.
    Completed(Vec<Winner>),
    /// Another execution already moved the lottery out of the active state.
    /// A silent no-op for the caller, never an error.
    AlreadyDecided,
    /// The trigger condition has not fired yet.
    NotReady,
}

/// The single idempotent draw implementation behind both entry points
/// (post-join for count-type, periodic sweep for time-type).
pub struct DrawTrigger<'a> {
    storage: &'a Storage,
}

impl<'a> DrawTrigger<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Attempt the draw. With `force` the trigger predicate is skipped
    /// (privileged manual draw); the conditional status claim is never
    /// skipped.
    ///
    /// The claim, winner inserts and prize decrements run in one
    /// transaction, so a lottery can never end up drawn with its winner
    /// rows missing.
    pub async fn attempt(&self, lottery_id: &str, force: bool) -> Result<DrawOutcome> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        let header = tx
            .query_row(
                "SELECT status, draw_type, draw_count, draw_time
                 FROM lotteries WHERE id = ?1",
                params![lottery_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<u32>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((status_str, draw_type_str, draw_count, draw_time)) = header else {
            return Err(LotobotError::not_found(lottery_id));
        };
        let status = LotteryStatus::parse(&status_str)
            .ok_or_else(|| LotobotError::internal("unknown lottery status in store"))?;
        let draw_type = DrawType::parse(&draw_type_str)
            .ok_or_else(|| LotobotError::internal("unknown draw type in store"))?;

        if status != LotteryStatus::Active {
            return Ok(DrawOutcome::AlreadyDecided);
        }

        let participant_count: u32 = tx.query_row(
            "SELECT COUNT(*) FROM participants WHERE lottery_id = ?1",
            params![lottery_id],
            |row| row.get(0),
        )?;

        if !force && !trigger_fires(draw_type, draw_count, draw_time, participant_count) {
            return Ok(DrawOutcome::NotReady);
        }

        // First durable effect: the conditional claim. Zero rows affected
        // means a concurrent execution won the race.
        let claimed = tx.execute(
            "UPDATE lotteries SET status = 'drawn' WHERE id = ?1 AND status = 'active'",
            params![lottery_id],
        )?;
        if claimed == 0 {
            return Ok(DrawOutcome::AlreadyDecided);
        }

        let prizes = load_prizes(&tx, lottery_id)?;

        let mut stmt = tx.prepare(
            "SELECT id, lottery_id, telegram_id, username, first_name, last_name,
                    invited_by, invite_count, joined_at
             FROM participants WHERE lottery_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![lottery_id], map_participant_row)?;
        let mut pool = Vec::new();
        for participant in rows {
            pool.push(participant?);
        }
        drop(stmt);

        let allocations = allocate(&prizes, pool, &mut rand::rng());

        let mut winners = Vec::new();
        for allocation in &allocations {
            let winner = Winner {
                id: Uuid::new_v4().to_string(),
                lottery_id: lottery_id.to_string(),
                telegram_id: allocation.participant.telegram_id,
                prize_id: allocation.prize_id.clone(),
                prize_name: allocation.prize_name.clone(),
                notified: false,
                claimed: false,
                claimed_at: None,
            };
            tx.execute(
                "INSERT INTO winners (id, lottery_id, telegram_id, prize_id, prize_name, notified, claimed)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                params![
                    winner.id,
                    winner.lottery_id,
                    winner.telegram_id,
                    winner.prize_id,
                    winner.prize_name,
                ],
            )?;
            winners.push(winner);
        }

        for prize in &prizes {
            let drawn = allocations
                .iter()
                .filter(|a| a.prize_id == prize.id)
                .count() as u32;
            if drawn == 0 {
                continue;
            }
            // Guarded decrement; remaining must never go negative.
            let updated = tx.execute(
                "UPDATE prizes SET remaining = remaining - ?1
                 WHERE id = ?2 AND remaining >= ?1",
                params![drawn, prize.id],
            )?;
            if updated == 0 {
                return Err(LotobotError::conflict(format!(
                    "prize {} inventory changed during draw",
                    prize.id
                )));
            }
        }

        tx.commit()?;

        tracing::info!(
            "Drew lottery {}: {} winners from {} participants",
            lottery_id,
            winners.len(),
            participant_count
        );
        Ok(DrawOutcome::Completed(winners))
    }
}

fn trigger_fires(
    draw_type: DrawType,
    draw_count: Option<u32>,
    draw_time: Option<i64>,
    participant_count: u32,
) -> bool {
    match draw_type {
        DrawType::Count => draw_count.is_some_and(|target| participant_count >= target),
        DrawType::Time => draw_time.is_some_and(|at| Utc::now().timestamp() >= at),
    }
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub participant: Participant,
    pub prize_id: String,
    pub prize_name: String,
}

/// Distribute prize inventory over the participant pool: one full shuffle,
/// then prizes consume the front of the pool in order. Uniform without
/// replacement, at most one prize per participant per execution.
pub fn allocate<R: Rng + ?Sized>(
    prizes: &[Prize],
    mut pool: Vec<Participant>,
    rng: &mut R,
) -> Vec<Allocation> {
    pool.shuffle(rng);

    let mut allocations = Vec::new();
    let mut cursor = pool.into_iter();
    for prize in prizes {
        for _ in 0..prize.remaining {
            let Some(participant) = cursor.next() else {
                return allocations;
            };
            allocations.push(Allocation {
                participant,
                prize_id: prize.id.clone(),
                prize_name: prize.name.clone(),
            });
        }
    }
    allocations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};

    fn prize(id: &str, remaining: u32) -> Prize {
        Prize {
            id: id.to_string(),
            lottery_id: "lot".to_string(),
            name: format!("prize-{}", id),
            total: remaining,
            remaining,
        }
    }

    fn pool(n: i64) -> Vec<Participant> {
        (0..n)
            .map(|i| Participant {
                id: format!("p{}", i),
                lottery_id: "lot".to_string(),
                telegram_id: 1000 + i,
                username: None,
                first_name: format!("user{}", i),
                last_name: None,
                invited_by: None,
                invite_count: 0,
                joined_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn allocates_exactly_remaining_when_pool_is_larger() {
        let prizes = vec![prize("a", 3)];
        let allocations = allocate(&prizes, pool(10), &mut rand::rng());

        assert_eq!(allocations.len(), 3);
        let distinct: HashSet<i64> =
            allocations.iter().map(|a| a.participant.telegram_id).collect();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn no_participant_wins_twice_across_prizes() {
        let prizes = vec![prize("a", 2), prize("b", 2), prize("c", 2)];
        let allocations = allocate(&prizes, pool(5), &mut rand::rng());

        // 6 prize units but only 5 participants; later prizes run short
        assert_eq!(allocations.len(), 5);
        let distinct: HashSet<i64> =
            allocations.iter().map(|a| a.participant.telegram_id).collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn empty_pool_yields_no_allocations() {
        let prizes = vec![prize("a", 3)];
        assert!(allocate(&prizes, Vec::new(), &mut rand::rng()).is_empty());
    }

    #[test]
    fn earlier_prizes_take_precedence_when_inventory_exceeds_pool() {
        let prizes = vec![prize("a", 3), prize("b", 3)];
        let allocations = allocate(&prizes, pool(4), &mut rand::rng());

        assert_eq!(allocations.len(), 4);
        assert_eq!(allocations.iter().filter(|a| a.prize_id == "a").count(), 3);
        assert_eq!(allocations.iter().filter(|a| a.prize_id == "b").count(), 1);
    }

    #[test]
    fn selection_is_not_biased_toward_insertion_order() {
        // With 2 of 6 drawn per trial, each participant should win roughly
        // a third of the time. A heavy bias toward the front of the pool
        // would push the first entries far above that.
        let prizes = vec![prize("a", 2)];
        let trials = 3000;
        let mut wins: HashMap<i64, u32> = HashMap::new();
        let mut rng = rand::rng();

        for _ in 0..trials {
            for allocation in allocate(&prizes, pool(6), &mut rng) {
                *wins.entry(allocation.participant.telegram_id).or_default() += 1;
            }
        }

        let expected = trials as f64 * 2.0 / 6.0;
        for id in 1000..1006 {
            let count = *wins.get(&id).unwrap_or(&0) as f64;
            assert!(
                count > expected * 0.75 && count < expected * 1.25,
                "participant {} won {} times, expected about {}",
                id,
                count,
                expected
            );
        }
    }

    #[test]
    fn trigger_predicate_per_draw_type() {
        assert!(trigger_fires(DrawType::Count, Some(5), None, 5));
        assert!(trigger_fires(DrawType::Count, Some(5), None, 7));
        assert!(!trigger_fires(DrawType::Count, Some(5), None, 4));

        let past = Utc::now().timestamp() - 60;
        let future = Utc::now().timestamp() + 3600;
        assert!(trigger_fires(DrawType::Time, None, Some(past), 0));
        assert!(!trigger_fires(DrawType::Time, None, Some(future), 0));
    }
}
