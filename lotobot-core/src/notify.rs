use crate::error::Result;
use crate::provider::templates::{render, resolve};
use crate::provider::{Destination, Messenger, TemplateKey, TemplateSource};
use crate::storage::{LotteryStore, ParticipantStore, PublishStore, Storage};
use crate::types::{Lottery, Winner};

/// What the fan-out managed to deliver. Failures are logged and counted,
/// never retried here; the `notified` flag on each winner is the only
/// durable signal.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub winners_notified: u32,
    pub winners_failed: u32,
    pub creator_notified: bool,
    pub destinations_notified: u32,
    pub destinations_failed: u32,
}

/// Post-draw delivery of winner, creator and destination-chat messages.
/// Every recipient is independent; one failure never aborts the batch and
/// never reverts the draw.
pub struct NotificationFanout<'a> {
    storage: &'a Storage,
    messenger: &'a dyn Messenger,
    templates: &'a dyn TemplateSource,
}

impl<'a> NotificationFanout<'a> {
    pub fn new(
        storage: &'a Storage,
        messenger: &'a dyn Messenger,
        templates: &'a dyn TemplateSource,
    ) -> Self {
        Self {
            storage,
            messenger,
            templates,
        }
    }

    pub async fn announce_draw(
        &self,
        lottery: &Lottery,
        winners: &[Winner],
    ) -> Result<FanoutReport> {
        let mut report = FanoutReport::default();

        self.notify_winners(lottery, winners, &mut report).await?;
        self.notify_creator(lottery, winners, &mut report).await?;
        self.notify_destinations(lottery, winners, &mut report)
            .await?;

        tracing::info!(
            "Fan-out for lottery {}: {}/{} winners notified, creator: {}, {}/{} chats",
            lottery.short_id(),
            report.winners_notified,
            winners.len(),
            report.creator_notified,
            report.destinations_notified,
            report.destinations_notified + report.destinations_failed,
        );
        Ok(report)
    }

    async fn notify_winners(
        &self,
        lottery: &Lottery,
        winners: &[Winner],
        report: &mut FanoutReport,
    ) -> Result<()> {
        let lotteries = LotteryStore::new(self.storage);
        let template = resolve(lottery, TemplateKey::Winner, self.templates).await?;
        let participants = ParticipantStore::new(self.storage)
            .list(&lottery.id, u32::MAX, 0)
            .await?;

        for winner in winners {
            let name = participants
                .iter()
                .find(|p| p.telegram_id == winner.telegram_id)
                .map(|p| p.display_name())
                .unwrap_or_else(|| winner.telegram_id.to_string());
            let text = render(
                &template,
                &[
                    ("name", name.as_str()),
                    ("title", lottery.title.as_str()),
                    ("prize", winner.prize_name.as_str()),
                    ("id", lottery.short_id()),
                ],
            );

            match self
                .messenger
                .deliver(Destination::User(winner.telegram_id), &text)
                .await
            {
                Ok(_) => {
                    lotteries.mark_notified(&winner.id).await?;
                    report.winners_notified += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to notify winner {} of lottery {}: {}",
                        winner.telegram_id,
                        lottery.short_id(),
                        e
                    );
                    report.winners_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn notify_creator(
        &self,
        lottery: &Lottery,
        winners: &[Winner],
        report: &mut FanoutReport,
    ) -> Result<()> {
        let participant_count = ParticipantStore::new(self.storage)
            .count(&lottery.id)
            .await?;
        let template = resolve(lottery, TemplateKey::Creator, self.templates).await?;
        let text = render(
            &template,
            &[
                ("title", lottery.title.as_str()),
                ("id", lottery.short_id()),
                ("count", participant_count.to_string().as_str()),
                ("winners", self.winner_list(lottery, winners).await?.as_str()),
            ],
        );

        match self
            .messenger
            .deliver(Destination::User(lottery.created_by), &text)
            .await
        {
            Ok(_) => report.creator_notified = true,
            Err(e) => {
                tracing::warn!(
                    "Failed to notify creator {} of lottery {}: {}",
                    lottery.created_by,
                    lottery.short_id(),
                    e
                );
            }
        }
        Ok(())
    }

    async fn notify_destinations(
        &self,
        lottery: &Lottery,
        winners: &[Winner],
        report: &mut FanoutReport,
    ) -> Result<()> {
        let destinations = PublishStore::new(self.storage)
            .destinations(&lottery.id)
            .await?;
        if destinations.is_empty() {
            return Ok(());
        }

        let template = resolve(lottery, TemplateKey::Group, self.templates).await?;
        let text = render(
            &template,
            &[
                ("title", lottery.title.as_str()),
                ("id", lottery.short_id()),
                ("winners", self.winner_list(lottery, winners).await?.as_str()),
            ],
        );

        for (chat_id, chat_title) in destinations {
            match self
                .messenger
                .deliver(Destination::Chat(chat_id), &text)
                .await
            {
                Ok(_) => report.destinations_notified += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to announce draw of lottery {} in chat {} ({}): {}",
                        lottery.short_id(),
                        chat_id,
                        chat_title,
                        e
                    );
                    report.destinations_failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn winner_list(&self, lottery: &Lottery, winners: &[Winner]) -> Result<String> {
        if winners.is_empty() {
            return Ok("(no participants)".to_string());
        }
        let participants = ParticipantStore::new(self.storage)
            .list(&lottery.id, u32::MAX, 0)
            .await?;

        let mut lines = Vec::new();
        for winner in winners {
            let name = participants
                .iter()
                .find(|p| p.telegram_id == winner.telegram_id)
                .map(|p| p.display_name())
                .unwrap_or_else(|| winner.telegram_id.to_string());
            lines.push(format!("- {}: {}", name, winner.prize_name));
        }
        Ok(lines.join("\n"))
    }
}
