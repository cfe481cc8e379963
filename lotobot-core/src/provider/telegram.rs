use crate::error::{LotobotError, Result};
use crate::provider::{Destination, MembershipProvider, Messenger};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client covering the two calls this engine needs:
/// getChatMember for eligibility probes and sendMessage for delivery.
pub struct TelegramProvider {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramProvider {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, API_BASE)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct ChatMember {
    status: String,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[async_trait]
impl MembershipProvider for TelegramProvider {
    async fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        let response: ApiResponse<ChatMember> = self
            .client
            .get(self.method_url("getChatMember"))
            .query(&[("chat_id", chat_id), ("user_id", user_id)])
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(LotobotError::provider(
                response
                    .description
                    .unwrap_or_else(|| "getChatMember failed".to_string()),
            ));
        }

        let member = response
            .result
            .ok_or_else(|| LotobotError::provider("getChatMember returned no result"))?;

        // "left" and "kicked" are the non-member states
        Ok(matches!(
            member.status.as_str(),
            "creator" | "administrator" | "member" | "restricted"
        ))
    }
}

#[async_trait]
impl Messenger for TelegramProvider {
    async fn deliver(&self, destination: Destination, text: &str) -> Result<i64> {
        let response: ApiResponse<SentMessage> = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": destination.chat_id(),
                "text": text,
            }))
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(LotobotError::provider(
                response
                    .description
                    .unwrap_or_else(|| "sendMessage failed".to_string()),
            ));
        }

        let sent = response
            .result
            .ok_or_else(|| LotobotError::provider("sendMessage returned no result"))?;
        Ok(sent.message_id)
    }
}
