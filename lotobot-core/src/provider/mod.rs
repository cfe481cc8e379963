pub mod console;
pub mod telegram;
pub mod templates;

pub use console::{ConsoleMessenger, OpenMembership};
pub use telegram::TelegramProvider;
pub use templates::{render, NoCustomTemplates, TemplateKey};

use crate::error::Result;
use async_trait::async_trait;

/// Where a message is delivered: a user's private chat or a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    User(i64),
    Chat(i64),
}

impl Destination {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::User(id) | Self::Chat(id) => *id,
        }
    }
}

/// External channel-membership lookup. Unreliable by contract; callers time
/// the call out and treat any failure as "not a member".
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool>;
}

/// External message delivery. Returns the provider's message id.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<i64>;
}

/// Custom notification templates stored outside this engine, per owner.
/// Returning `None` falls through to the built-in default for the key.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn custom(&self, key: TemplateKey, owner_id: i64) -> Result<Option<String>>;
}
