use crate::config::EngineConfig;
use crate::draw::{DrawOutcome, DrawTrigger};
use crate::eligibility::EligibilityChecker;
use crate::error::{LotobotError, Result};
use crate::notify::NotificationFanout;
use crate::provider::{MembershipProvider, Messenger, TemplateSource};
use crate::publish::{PublishOutcome, PublishTracker};
use crate::storage::{LotteryStore, ParticipantStore, PublishStore, Storage, UserStore};
use crate::types::{
    DrawType, JoinRequest, Lottery, LotteryPatch, NewLottery, Participant, Prize, PublishRecord,
    Winner,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Facade over the participation and draw engine. Handlers are stateless;
/// every instance (and every clone of the providers) goes through the same
/// SQLite file, so all mutual exclusion lives in the store.
pub struct LotteryEngine {
    storage: Arc<Storage>,
    membership: Arc<dyn MembershipProvider>,
    messenger: Arc<dyn Messenger>,
    templates: Arc<dyn TemplateSource>,
    config: EngineConfig,
}

impl LotteryEngine {
    pub async fn new(
        data_dir: &Path,
        membership: Arc<dyn MembershipProvider>,
        messenger: Arc<dyn Messenger>,
        templates: Arc<dyn TemplateSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        let db_path = data_dir.join("lotobot.db");
        let storage = Arc::new(Storage::new(&db_path).await?);

        Ok(Self {
            storage,
            membership,
            messenger,
            templates,
            config,
        })
    }

    pub async fn create_lottery(&self, new: &NewLottery) -> Result<Lottery> {
        LotteryStore::new(&self.storage).create(new).await
    }

    pub async fn lottery(&self, lottery_id: &str) -> Result<Lottery> {
        LotteryStore::new(&self.storage)
            .get(lottery_id)
            .await?
            .ok_or_else(|| LotobotError::not_found(lottery_id))
    }

    pub async fn list_lotteries(&self) -> Result<Vec<Lottery>> {
        LotteryStore::new(&self.storage).list().await
    }

    pub async fn update_lottery(&self, lottery_id: &str, patch: &LotteryPatch) -> Result<Lottery> {
        let store = LotteryStore::new(&self.storage);
        if store.get(lottery_id).await?.is_none() {
            return Err(LotobotError::not_found(lottery_id));
        }
        store.apply_patch(lottery_id, patch).await?;
        self.lottery(lottery_id).await
    }

    /// Cancel an active lottery. Conditional like the draw claim; a lottery
    /// that already left the active state cannot be cancelled.
    pub async fn cancel_lottery(&self, lottery_id: &str) -> Result<()> {
        let store = LotteryStore::new(&self.storage);
        if store.get(lottery_id).await?.is_none() {
            return Err(LotobotError::not_found(lottery_id));
        }
        if !store.cancel(lottery_id).await? {
            return Err(LotobotError::not_active(lottery_id));
        }
        Ok(())
    }

    /// Handle a join request: eligibility checks, the participant insert,
    /// and for count-type lotteries the synchronous draw-trigger check.
    pub async fn join(&self, lottery_id: &str, req: &JoinRequest) -> Result<Participant> {
        let lottery = self.lottery(lottery_id).await?;

        let checker =
            EligibilityChecker::new(&self.storage, self.membership.as_ref(), &self.config);
        let participant = checker.check_and_register(&lottery, req).await?;

        if lottery.draw_type == DrawType::Count {
            self.attempt_and_announce(&lottery, false).await?;
        }

        Ok(participant)
    }

    /// Privileged manual draw. Skips the trigger predicate but not the
    /// conditional claim; returns the winner set of whichever execution
    /// actually owned the draw.
    pub async fn draw_now(&self, lottery_id: &str) -> Result<Vec<Winner>> {
        let lottery = self.lottery(lottery_id).await?;

        match self.attempt_and_announce(&lottery, true).await? {
            DrawOutcome::Completed(winners) => Ok(winners),
            // Someone else owned it; hand back the stored result.
            DrawOutcome::AlreadyDecided | DrawOutcome::NotReady => self.winners(lottery_id).await,
        }
    }

    /// Periodic sweep over every active time-type lottery whose draw time
    /// has elapsed. One lottery failing never stops the rest.
    pub async fn sweep_due(&self) -> Result<Vec<(String, Vec<Winner>)>> {
        let due = LotteryStore::new(&self.storage)
            .list_due_time_draws(Utc::now())
            .await?;

        let mut drawn = Vec::new();
        for lottery_id in due {
            let lottery = match self.lottery(&lottery_id).await {
                Ok(lottery) => lottery,
                Err(e) => {
                    tracing::warn!("Sweep skipped lottery {}: {}", lottery_id, e);
                    continue;
                }
            };
            match self.attempt_and_announce(&lottery, false).await {
                Ok(DrawOutcome::Completed(winners)) => drawn.push((lottery_id, winners)),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Sweep failed to draw lottery {}: {}", lottery_id, e);
                }
            }
        }
        Ok(drawn)
    }

    /// The one idempotent attempt-draw path shared by joins, the sweep and
    /// the manual trigger. Fan-out delivery problems are logged, never
    /// propagated; the draw itself has already committed.
    async fn attempt_and_announce(&self, lottery: &Lottery, force: bool) -> Result<DrawOutcome> {
        let outcome = DrawTrigger::new(&self.storage)
            .attempt(&lottery.id, force)
            .await?;

        if let DrawOutcome::Completed(winners) = &outcome {
            let fanout =
                NotificationFanout::new(&self.storage, self.messenger.as_ref(), self.templates.as_ref());
            if let Err(e) = fanout.announce_draw(lottery, winners).await {
                tracing::warn!(
                    "Notification fan-out for lottery {} failed: {}",
                    lottery.short_id(),
                    e
                );
            }
        }
        Ok(outcome)
    }

    pub async fn publish(
        &self,
        lottery_id: &str,
        actor: i64,
        chat_id: i64,
        chat_title: &str,
        force: bool,
    ) -> Result<PublishOutcome> {
        let lottery = self.lottery(lottery_id).await?;
        let tracker =
            PublishTracker::new(&self.storage, self.messenger.as_ref(), self.templates.as_ref());
        tracker
            .publish(&lottery, actor, chat_id, chat_title, force)
            .await
    }

    pub async fn participants(
        &self,
        lottery_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Participant>> {
        ParticipantStore::new(&self.storage)
            .list(lottery_id, limit, offset)
            .await
    }

    pub async fn participant_count(&self, lottery_id: &str) -> Result<u32> {
        ParticipantStore::new(&self.storage).count(lottery_id).await
    }

    pub async fn winners(&self, lottery_id: &str) -> Result<Vec<Winner>> {
        LotteryStore::new(&self.storage).winners(lottery_id).await
    }

    pub async fn prizes(&self, lottery_id: &str) -> Result<Vec<Prize>> {
        LotteryStore::new(&self.storage).prizes(lottery_id).await
    }

    pub async fn publish_history(&self, lottery_id: &str) -> Result<Vec<PublishRecord>> {
        PublishStore::new(&self.storage).history(lottery_id).await
    }

    pub async fn mark_claimed(&self, winner_id: &str) -> Result<()> {
        LotteryStore::new(&self.storage).mark_claimed(winner_id).await
    }

    pub async fn set_vip(&self, telegram_id: i64, expire_at: Option<DateTime<Utc>>) -> Result<()> {
        UserStore::new(&self.storage)
            .set_vip(telegram_id, expire_at)
            .await
    }

    #[cfg(test)]
    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Destination;
    use crate::types::{LotteryStatus, NewPrize, RequiredChannel};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::{tempdir, TempDir};

    struct StaticMembership {
        members: HashSet<(i64, i64)>,
    }

    #[async_trait]
    impl MembershipProvider for StaticMembership {
        async fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool> {
            Ok(self.members.contains(&(chat_id, user_id)))
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: StdMutex<Vec<(Destination, String)>>,
        fail_for: StdMutex<HashSet<i64>>,
        next_id: AtomicI64,
    }

    impl RecordingMessenger {
        fn sent_to(&self, destination: Destination) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(d, _)| *d == destination)
                .map(|(_, text)| text.clone())
                .collect()
        }

        fn total_sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn fail_deliveries_to(&self, chat_id: i64) {
            self.fail_for.lock().unwrap().insert(chat_id);
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn deliver(&self, destination: Destination, text: &str) -> Result<i64> {
            if self.fail_for.lock().unwrap().contains(&destination.chat_id()) {
                return Err(LotobotError::provider("simulated delivery failure"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination, text.to_string()));
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    struct Harness {
        engine: Arc<LotteryEngine>,
        messenger: Arc<RecordingMessenger>,
        _dir: TempDir,
    }

    async fn harness(config: EngineConfig, members: &[(i64, i64)]) -> Harness {
        let dir = tempdir().unwrap();
        let messenger = Arc::new(RecordingMessenger::default());
        let membership = Arc::new(StaticMembership {
            members: members.iter().copied().collect(),
        });
        let engine = LotteryEngine::new(
            dir.path(),
            membership,
            messenger.clone(),
            Arc::new(crate::provider::NoCustomTemplates),
            config,
        )
        .await
        .unwrap();
        Harness {
            engine: Arc::new(engine),
            messenger,
            _dir: dir,
        }
    }

    fn count_lottery(draw_count: u32, prizes: Vec<(&str, u32)>) -> NewLottery {
        NewLottery {
            title: "Test giveaway".to_string(),
            draw_type: DrawType::Count,
            draw_count: Some(draw_count),
            draw_time: None,
            require_username: false,
            channels: Vec::new(),
            prizes: prizes
                .into_iter()
                .map(|(name, total)| NewPrize {
                    name: name.to_string(),
                    total,
                })
                .collect(),
            created_by: 99,
        }
    }

    fn join_req(telegram_id: i64) -> JoinRequest {
        JoinRequest {
            telegram_id,
            username: Some(format!("user{}", telegram_id)),
            first_name: format!("User {}", telegram_id),
            last_name: None,
            invited_by: None,
        }
    }

    #[tokio::test]
    async fn duplicate_join_is_rejected() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(10, vec![("mug", 1)])).await.unwrap();

        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();
        let err = h.engine.join(&lottery.id, &join_req(1)).await.unwrap_err();
        assert!(matches!(err, LotobotError::AlreadyJoined));
        assert_eq!(h.engine.participant_count(&lottery.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn join_unknown_lottery_is_not_found() {
        let h = harness(EngineConfig::default(), &[]).await;
        let err = h.engine.join("missing", &join_req(1)).await.unwrap_err();
        assert!(matches!(err, LotobotError::NotFound { .. }));
    }

    #[tokio::test]
    async fn username_requirement_is_enforced() {
        let h = harness(EngineConfig::default(), &[]).await;
        let mut new = count_lottery(10, vec![("mug", 1)]);
        new.require_username = true;
        let lottery = h.engine.create_lottery(&new).await.unwrap();

        let mut req = join_req(1);
        req.username = None;
        let err = h.engine.join(&lottery.id, &req).await.unwrap_err();
        assert!(matches!(err, LotobotError::UsernameRequired));

        h.engine.join(&lottery.id, &join_req(2)).await.unwrap();
    }

    #[tokio::test]
    async fn channel_membership_is_fail_closed() {
        // User 1 is a member of both channels, user 2 of neither.
        let h = harness(EngineConfig::default(), &[(-100, 1), (-200, 1)]).await;
        let mut new = count_lottery(10, vec![("mug", 1)]);
        new.channels = vec![
            RequiredChannel {
                chat_id: -100,
                title: "News".to_string(),
            },
            RequiredChannel {
                chat_id: -200,
                title: "Chat".to_string(),
            },
        ];
        let lottery = h.engine.create_lottery(&new).await.unwrap();

        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();

        let err = h.engine.join(&lottery.id, &join_req(2)).await.unwrap_err();
        match err {
            LotobotError::ChannelMembershipRequired { missing } => {
                assert_eq!(missing, vec!["News".to_string(), "Chat".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn inviter_gets_referral_credit() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(10, vec![("mug", 1)])).await.unwrap();

        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();
        let mut req = join_req(2);
        req.invited_by = Some(1);
        h.engine.join(&lottery.id, &req).await.unwrap();

        let participants = h.engine.participants(&lottery.id, 100, 0).await.unwrap();
        let inviter = participants.iter().find(|p| p.telegram_id == 1).unwrap();
        assert_eq!(inviter.invite_count, 1);
    }

    // Threshold 2, one prize. The second join fires the draw, exactly one
    // of the two participants wins, later joins see NotActive.
    #[tokio::test]
    async fn count_draw_fires_on_threshold() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(2, vec![("mug", 1)])).await.unwrap();

        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();
        assert!(h.engine.winners(&lottery.id).await.unwrap().is_empty());
        assert_eq!(
            h.engine.lottery(&lottery.id).await.unwrap().status,
            LotteryStatus::Active
        );

        h.engine.join(&lottery.id, &join_req(2)).await.unwrap();

        let drawn = h.engine.lottery(&lottery.id).await.unwrap();
        assert_eq!(drawn.status, LotteryStatus::Drawn);

        let winners = h.engine.winners(&lottery.id).await.unwrap();
        assert_eq!(winners.len(), 1);
        assert!([1, 2].contains(&winners[0].telegram_id));
        assert!(winners[0].notified);

        let prizes = h.engine.prizes(&lottery.id).await.unwrap();
        assert_eq!(prizes[0].remaining, 0);

        let err = h.engine.join(&lottery.id, &join_req(3)).await.unwrap_err();
        assert!(matches!(err, LotobotError::NotActive { .. }));
    }

    #[tokio::test]
    async fn prize_accounting_holds_after_draw() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h
            .engine
            .create_lottery(&count_lottery(100, vec![("gold", 2), ("silver", 3)]))
            .await
            .unwrap();

        for id in 1..=10 {
            h.engine.join(&lottery.id, &join_req(id)).await.unwrap();
        }
        let winners = h.engine.draw_now(&lottery.id).await.unwrap();

        assert_eq!(winners.len(), 5);
        let distinct: HashSet<i64> = winners.iter().map(|w| w.telegram_id).collect();
        assert_eq!(distinct.len(), 5);

        let prizes = h.engine.prizes(&lottery.id).await.unwrap();
        for prize in &prizes {
            let won = winners.iter().filter(|w| w.prize_id == prize.id).count() as u32;
            assert_eq!(prize.remaining, prize.total - won);
            assert_eq!(prize.remaining, 0);
        }
        assert_eq!(winners.iter().filter(|w| w.prize_name == "gold").count(), 2);
        assert_eq!(winners.iter().filter(|w| w.prize_name == "silver").count(), 3);
    }

    #[tokio::test]
    async fn drawn_is_terminal() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();
        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();

        let winners = h.engine.draw_now(&lottery.id).await.unwrap();
        assert_eq!(winners.len(), 1);

        // Repeat manual draw is a no-op returning the stored result.
        let again = h.engine.draw_now(&lottery.id).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, winners[0].id);

        let err = h.engine.cancel_lottery(&lottery.id).await.unwrap_err();
        assert!(matches!(err, LotobotError::NotActive { .. }));
        assert_eq!(
            h.engine.lottery(&lottery.id).await.unwrap().status,
            LotteryStatus::Drawn
        );
    }

    #[tokio::test]
    async fn empty_pool_draw_still_transitions() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(5, vec![("mug", 2)])).await.unwrap();

        let winners = h.engine.draw_now(&lottery.id).await.unwrap();
        assert!(winners.is_empty());
        assert_eq!(
            h.engine.lottery(&lottery.id).await.unwrap().status,
            LotteryStatus::Drawn
        );
        // Inventory untouched when nobody participated
        assert_eq!(h.engine.prizes(&lottery.id).await.unwrap()[0].remaining, 2);
    }

    // The at-most-one-draw property under real concurrency: 50 parallel
    // joins race each other and the trigger, yet exactly one execution
    // draws and the winner set is consistent.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_joins_produce_one_draw() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h
            .engine
            .create_lottery(&count_lottery(10, vec![("gold", 1), ("silver", 2)]))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for id in 1..=50 {
            let engine = h.engine.clone();
            let lottery_id = lottery.id.clone();
            handles.push(tokio::spawn(async move {
                engine.join(&lottery_id, &join_req(id)).await
            }));
        }

        let mut joined = 0u32;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => joined += 1,
                Err(LotobotError::NotActive { .. }) => {}
                Err(e) => panic!("unexpected join error: {}", e),
            }
        }

        // The threshold must have been reached before any rejection.
        assert!(joined >= 10);
        assert_eq!(h.engine.participant_count(&lottery.id).await.unwrap(), joined);

        let drawn = h.engine.lottery(&lottery.id).await.unwrap();
        assert_eq!(drawn.status, LotteryStatus::Drawn);

        let winners = h.engine.winners(&lottery.id).await.unwrap();
        assert_eq!(winners.len(), 3);
        let distinct: HashSet<i64> = winners.iter().map(|w| w.telegram_id).collect();
        assert_eq!(distinct.len(), 3);

        let prizes = h.engine.prizes(&lottery.id).await.unwrap();
        assert!(prizes.iter().all(|p| p.remaining == 0));
    }

    #[tokio::test]
    async fn stale_quota_counter_resets_before_comparing() {
        let config = EngineConfig {
            daily_join_limit: Some(3),
            ..EngineConfig::default()
        };
        let h = harness(config, &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();

        // Counter exhausted, but the anchor is from an earlier day.
        let users = UserStore::new(h.engine.storage());
        users.get_or_create(7).await.unwrap();
        users
            .set_quota_state(7, 3, Utc::now() - Duration::days(2))
            .await
            .unwrap();

        h.engine.join(&lottery.id, &join_req(7)).await.unwrap();

        let quota = users.get_or_create(7).await.unwrap();
        assert_eq!(quota.daily_join_count, 1);
    }

    #[tokio::test]
    async fn daily_limit_blocks_and_vip_bypasses() {
        let config = EngineConfig {
            daily_join_limit: Some(2),
            ..EngineConfig::default()
        };
        let h = harness(config, &[]).await;

        let mut lotteries = Vec::new();
        for _ in 0..3 {
            lotteries.push(
                h.engine
                    .create_lottery(&count_lottery(100, vec![("mug", 1)]))
                    .await
                    .unwrap(),
            );
        }

        h.engine.join(&lotteries[0].id, &join_req(5)).await.unwrap();
        h.engine.join(&lotteries[1].id, &join_req(5)).await.unwrap();
        let err = h.engine.join(&lotteries[2].id, &join_req(5)).await.unwrap_err();
        assert!(matches!(err, LotobotError::DailyLimitReached { limit: 2 }));

        // VIP with an unexpired subscription skips the quota entirely.
        h.engine
            .set_vip(6, Some(Utc::now() + Duration::days(30)))
            .await
            .unwrap();
        for lottery in &lotteries {
            h.engine.join(&lottery.id, &join_req(6)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn time_sweep_draws_due_lotteries_once() {
        let h = harness(EngineConfig::default(), &[]).await;

        let due = NewLottery {
            title: "Expired giveaway".to_string(),
            draw_type: DrawType::Time,
            draw_count: None,
            draw_time: Some(Utc::now() - Duration::minutes(5)),
            require_username: false,
            channels: Vec::new(),
            prizes: vec![NewPrize {
                name: "mug".to_string(),
                total: 1,
            }],
            created_by: 99,
        };
        let mut pending = due.clone();
        pending.title = "Still running".to_string();
        pending.draw_time = Some(Utc::now() + Duration::hours(1));

        let due = h.engine.create_lottery(&due).await.unwrap();
        let pending = h.engine.create_lottery(&pending).await.unwrap();
        h.engine.join(&due.id, &join_req(1)).await.unwrap();
        h.engine.join(&pending.id, &join_req(1)).await.unwrap();

        let drawn = h.engine.sweep_due().await.unwrap();
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].0, due.id);
        assert_eq!(drawn[0].1.len(), 1);

        assert_eq!(
            h.engine.lottery(&pending.id).await.unwrap().status,
            LotteryStatus::Active
        );

        // Second sweep finds nothing to do.
        assert!(h.engine.sweep_due().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_winner_notification_leaves_flag_unset() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 2)])).await.unwrap();

        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();
        h.engine.join(&lottery.id, &join_req(2)).await.unwrap();
        h.messenger.fail_deliveries_to(1);
        h.messenger.fail_deliveries_to(2);

        let winners = h.engine.draw_now(&lottery.id).await.unwrap();
        assert_eq!(winners.len(), 2);

        // Delivery failed for both, the draw stands, flags stay false.
        let stored = h.engine.winners(&lottery.id).await.unwrap();
        assert!(stored.iter().all(|w| !w.notified));
        assert_eq!(
            h.engine.lottery(&lottery.id).await.unwrap().status,
            LotteryStatus::Drawn
        );
        // Creator summary still went out.
        assert_eq!(h.messenger.sent_to(Destination::User(99)).len(), 1);
    }

    #[tokio::test]
    async fn publish_requires_confirmation_for_repeat_sends() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();

        let first = h.engine.publish(&lottery.id, 99, -500, "Main chat", false).await.unwrap();
        assert!(matches!(first, PublishOutcome::Published(_)));
        assert_eq!(h.messenger.total_sent(), 1);

        let second = h.engine.publish(&lottery.id, 99, -500, "Main chat", false).await.unwrap();
        match second {
            PublishOutcome::ConfirmationRequired(history) => assert_eq!(history.len(), 1),
            PublishOutcome::Published(_) => panic!("repeat publish went out without confirmation"),
        }
        assert_eq!(h.messenger.total_sent(), 1);
        assert_eq!(h.engine.publish_history(&lottery.id).await.unwrap().len(), 1);

        let forced = h.engine.publish(&lottery.id, 99, -500, "Main chat", true).await.unwrap();
        assert!(matches!(forced, PublishOutcome::Published(_)));
        assert_eq!(h.messenger.total_sent(), 2);
        assert_eq!(h.engine.publish_history(&lottery.id).await.unwrap().len(), 2);

        // A different chat has no history and publishes straight away.
        let other = h.engine.publish(&lottery.id, 99, -600, "Side chat", false).await.unwrap();
        assert!(matches!(other, PublishOutcome::Published(_)));
    }

    #[tokio::test]
    async fn announcement_reflects_live_counts() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();

        h.engine.publish(&lottery.id, 99, -500, "Main chat", false).await.unwrap();
        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();
        h.engine.join(&lottery.id, &join_req(2)).await.unwrap();
        h.engine.publish(&lottery.id, 99, -500, "Main chat", true).await.unwrap();

        let sent = h.messenger.sent_to(Destination::Chat(-500));
        assert!(sent[0].contains("Participants so far: 0"));
        assert!(sent[1].contains("Participants so far: 2"));
    }

    #[tokio::test]
    async fn destination_chats_hear_about_the_draw() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();

        h.engine.publish(&lottery.id, 99, -500, "Main chat", false).await.unwrap();
        h.engine.publish(&lottery.id, 99, -600, "Side chat", false).await.unwrap();
        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();

        // One destination failing must not block the other.
        h.messenger.fail_deliveries_to(-500);
        h.engine.draw_now(&lottery.id).await.unwrap();

        let side = h.messenger.sent_to(Destination::Chat(-600));
        assert_eq!(side.len(), 2); // announcement + draw result
        assert!(side[1].contains("has been drawn"));
    }

    #[tokio::test]
    async fn patch_applies_only_while_active() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();

        let patch = LotteryPatch {
            title: Some("Renamed".to_string()),
            draw_count: Some(50),
            ..LotteryPatch::default()
        };
        let updated = h.engine.update_lottery(&lottery.id, &patch).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.draw_count, Some(50));

        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();
        h.engine.draw_now(&lottery.id).await.unwrap();

        let err = h.engine.update_lottery(&lottery.id, &patch).await.unwrap_err();
        assert!(matches!(err, LotobotError::NotActive { .. }));
    }

    #[tokio::test]
    async fn winner_claim_is_recorded_once() {
        let h = harness(EngineConfig::default(), &[]).await;
        let lottery = h.engine.create_lottery(&count_lottery(100, vec![("mug", 1)])).await.unwrap();
        h.engine.join(&lottery.id, &join_req(1)).await.unwrap();

        let winners = h.engine.draw_now(&lottery.id).await.unwrap();
        h.engine.mark_claimed(&winners[0].id).await.unwrap();

        let stored = h.engine.winners(&lottery.id).await.unwrap();
        assert!(stored[0].claimed);
        assert!(stored[0].claimed_at.is_some());

        let err = h.engine.mark_claimed(&winners[0].id).await.unwrap_err();
        assert!(matches!(err, LotobotError::Conflict(_)));
    }
}
