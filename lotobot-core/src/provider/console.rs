use crate::error::Result;
use crate::provider::{Destination, MembershipProvider, Messenger};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

/// Messenger for local operation without bot credentials: deliveries are
/// logged instead of sent, with synthetic message ids.
pub struct ConsoleMessenger {
    next_id: AtomicI64,
}

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for ConsoleMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<i64> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!("[console] delivery to {:?}: {}", destination, text);
        Ok(message_id)
    }
}

/// Membership provider that treats every user as a member. Pairs with
/// ConsoleMessenger for local runs where no Telegram API is reachable.
pub struct OpenMembership;

#[async_trait]
impl MembershipProvider for OpenMembership {
    async fn is_member(&self, _chat_id: i64, _user_id: i64) -> Result<bool> {
        Ok(true)
    }
}
