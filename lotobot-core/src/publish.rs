use crate::error::Result;
use crate::provider::templates::{render, resolve};
use crate::provider::{Destination, Messenger, TemplateKey, TemplateSource};
use crate::storage::{LotteryStore, ParticipantStore, PublishStore, Storage};
use crate::types::{Lottery, PublishRecord};

/// Result of a publish request.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    /// The announcement went out and one history row was appended.
    Published(PublishRecord),
    /// This lottery was already pushed to this chat; the caller must
    /// confirm (retry with `force`) before a duplicate is sent.
    ConfirmationRequired(Vec<PublishRecord>),
}

/// Pushes lottery announcements to destination chats and records every push
/// so a repeat send never happens silently.
pub struct PublishTracker<'a> {
    storage: &'a Storage,
    messenger: &'a dyn Messenger,
    templates: &'a dyn TemplateSource,
}

impl<'a> PublishTracker<'a> {
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

    /// Publish the announcement to one chat. The text is rendered at send
    /// time from the live participant count and prize inventory, never from
    /// a snapshot taken at creation.
    pub async fn publish(
        &self,
        lottery: &Lottery,
        actor: i64,
        chat_id: i64,
        chat_title: &str,
        force: bool,
    ) -> Result<PublishOutcome> {
        let publishes = PublishStore::new(self.storage);

        let history = publishes.history_for_chat(&lottery.id, chat_id).await?;
        if !history.is_empty() && !force {
            tracing::debug!(
                "Publish of lottery {} to chat {} by {} needs confirmation ({} prior sends)",
                lottery.short_id(),
                chat_id,
                actor,
                history.len()
            );
            return Ok(PublishOutcome::ConfirmationRequired(history));
        }

        tracing::info!(
            "Publishing lottery {} to chat {} (requested by {})",
            lottery.short_id(),
            chat_id,
            actor
        );
        let text = self.render_announcement(lottery).await?;
        let message_id = self
            .messenger
            .deliver(Destination::Chat(chat_id), &text)
            .await?;

        let record = publishes
            .append(&lottery.id, chat_id, chat_title, message_id)
            .await?;
        Ok(PublishOutcome::Published(record))
    }

    async fn render_announcement(&self, lottery: &Lottery) -> Result<String> {
        let participant_count = ParticipantStore::new(self.storage)
            .count(&lottery.id)
            .await?;
        let prizes = LotteryStore::new(self.storage).prizes(&lottery.id).await?;

        let prize_lines: Vec<String> = prizes
            .iter()
            .map(|p| format!("- {} ({} of {} left)", p.name, p.remaining, p.total))
            .collect();

        let template = resolve(lottery, TemplateKey::Announcement, self.templates).await?;
        Ok(render(
            &template,
            &[
                ("title", lottery.title.as_str()),
                ("id", lottery.short_id()),
                ("prizes", prize_lines.join("\n").as_str()),
                ("count", participant_count.to_string().as_str()),
            ],
        ))
    }
}
