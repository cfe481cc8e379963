use crate::config::EngineConfig;
use crate::error::{LotobotError, Result};
use crate::provider::MembershipProvider;
use crate::storage::user_store::same_local_day;
use crate::storage::{ParticipantStore, Storage, UserStore};
use crate::types::{JoinRequest, Lottery, LotteryStatus, Participant};
use chrono::Utc;
use futures::future::join_all;
use tokio::time::timeout;

/// Validates a join request against lottery rules and quotas, then persists
/// the participant row. Checks run in a fixed order so the caller always
/// gets the most specific rejection.
pub struct EligibilityChecker<'a> {
    storage: &'a Storage,
    membership: &'a dyn MembershipProvider,
    config: &'a EngineConfig,
}

impl<'a> EligibilityChecker<'a> {
    pub fn new(
        storage: &'a Storage,
        membership: &'a dyn MembershipProvider,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            storage,
            membership,
            config,
        }
    }

    /// Run all checks and, on success, insert the participant row.
    ///
    /// The duplicate pre-check here is advisory; the unique constraint on
    /// the insert is what closes the race between two concurrent requests
    /// that both pass the pre-check.
    pub async fn check_and_register(
        &self,
        lottery: &Lottery,
        req: &JoinRequest,
    ) -> Result<Participant> {
        if lottery.status != LotteryStatus::Active {
            return Err(LotobotError::not_active(&lottery.id));
        }

        let participants = ParticipantStore::new(self.storage);
        if participants.exists(&lottery.id, req.telegram_id).await? {
            return Err(LotobotError::AlreadyJoined);
        }

        if lottery.require_username && req.username.as_deref().unwrap_or("").is_empty() {
            return Err(LotobotError::UsernameRequired);
        }

        self.check_channel_membership(lottery, req.telegram_id)
            .await?;
        self.check_daily_quota(req.telegram_id).await?;

        let participant = participants.insert(&lottery.id, req).await?;
        tracing::info!(
            "User {} joined lottery {} ({})",
            req.telegram_id,
            lottery.short_id(),
            lottery.title
        );

        // Best-effort referral credit; its failure must not undo the join.
        if let Some(inviter) = req.invited_by {
            if let Err(e) = participants
                .increment_invite_count(&lottery.id, inviter)
                .await
            {
                tracing::warn!(
                    "Failed to credit inviter {} on lottery {}: {}",
                    inviter,
                    lottery.short_id(),
                    e
                );
            }
        }

        Ok(participant)
    }

    /// Probe all required channels concurrently. A probe that errors or
    /// times out counts as "not a member" (fail-closed).
    async fn check_channel_membership(&self, lottery: &Lottery, user_id: i64) -> Result<()> {
        if lottery.channels.is_empty() {
            return Ok(());
        }

        let probes = lottery.channels.iter().map(|channel| async move {
            let result = timeout(
                self.config.membership_timeout,
                self.membership.is_member(channel.chat_id, user_id),
            )
            .await;
            let is_member = match result {
                Ok(Ok(member)) => member,
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Membership probe failed for chat {}: {}",
                        channel.chat_id,
                        e
                    );
                    false
                }
                Err(_) => {
                    tracing::warn!("Membership probe timed out for chat {}", channel.chat_id);
                    false
                }
            };
            (channel, is_member)
        });

        let missing: Vec<String> = join_all(probes)
            .await
            .into_iter()
            .filter(|(_, is_member)| !is_member)
            .map(|(channel, _)| channel.title.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(LotobotError::ChannelMembershipRequired { missing })
        }
    }

    /// Daily quota: reset the counter when the stored anchor is from an
    /// earlier local day, then compare against the limit and increment.
    /// VIP users with an unexpired subscription bypass the whole policy.
    async fn check_daily_quota(&self, telegram_id: i64) -> Result<()> {
        let Some(limit) = self.config.daily_join_limit else {
            return Ok(());
        };

        let users = UserStore::new(self.storage);
        let now = Utc::now();
        let mut quota = users.get_or_create(telegram_id).await?;

        if quota.vip_active(now) {
            return Ok(());
        }

        if !same_local_day(quota.daily_join_reset_at, now) {
            users.reset_daily_count(telegram_id).await?;
            quota.daily_join_count = 0;
        }

        if quota.daily_join_count >= limit {
            return Err(LotobotError::DailyLimitReached { limit });
        }

        users.increment_daily_count(telegram_id).await?;
        Ok(())
    }
}
