use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryStatus {
    Active,
    Drawn,
    Cancelled,
}

impl LotteryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Drawn => "drawn",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "drawn" => Some(Self::Drawn),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawType {
    /// Draw fires once the participant count reaches `draw_count`.
    Count,
    /// Draw fires once `draw_time` has elapsed.
    Time,
}

impl DrawType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Time => "time",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Self::Count),
            "time" => Some(Self::Time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lottery {
    pub id: String,
    pub title: String,
    pub status: LotteryStatus,
    pub draw_type: DrawType,
    pub draw_count: Option<u32>,
    pub draw_time: Option<DateTime<Utc>>,
    pub require_username: bool,
    pub channels: Vec<RequiredChannel>,
    pub winner_template: Option<String>,
    pub creator_template: Option<String>,
    pub group_template: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Lottery {
    /// Short id form used in user-facing messages.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Channel a user must be a member of before joining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredChannel {
    pub chat_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prize {
    pub id: String,
    pub lottery_id: String,
    pub name: String,
    pub total: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub lottery_id: String,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub invited_by: Option<i64>,
    pub invite_count: u32,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Winner {
    pub id: String,
    pub lottery_id: String,
    pub telegram_id: i64,
    pub prize_id: String,
    /// Prize name snapshot taken at draw time.
    pub prize_name: String,
    pub notified: bool,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// One announcement push to a destination chat. Append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub id: String,
    pub lottery_id: String,
    pub chat_id: i64,
    pub chat_title: String,
    pub message_id: i64,
    pub published_at: DateTime<Utc>,
}

/// Per-user daily join quota state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuota {
    pub telegram_id: i64,
    pub daily_join_count: u32,
    pub daily_join_reset_at: DateTime<Utc>,
    pub is_vip: bool,
    pub vip_expire_at: Option<DateTime<Utc>>,
}

impl UserQuota {
    /// VIP users with an unexpired subscription bypass the daily quota.
    pub fn vip_active(&self, now: DateTime<Utc>) -> bool {
        self.is_vip && self.vip_expire_at.map_or(true, |exp| exp > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub invited_by: Option<i64>,
}

/// Explicit partial update for a lottery. Each field is applied only when
/// set; absent fields leave the stored value untouched. Only active
/// lotteries may be patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotteryPatch {
    pub title: Option<String>,
    pub draw_count: Option<u32>,
    pub draw_time: Option<DateTime<Utc>>,
    pub require_username: Option<bool>,
    pub winner_template: Option<String>,
    pub creator_template: Option<String>,
    pub group_template: Option<String>,
}

impl LotteryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.draw_count.is_none()
            && self.draw_time.is_none()
            && self.require_username.is_none()
            && self.winner_template.is_none()
            && self.creator_template.is_none()
            && self.group_template.is_none()
    }
}

/// Parameters for creating a lottery together with its prizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLottery {
    pub title: String,
    pub draw_type: DrawType,
    pub draw_count: Option<u32>,
    pub draw_time: Option<DateTime<Utc>>,
    pub require_username: bool,
    pub channels: Vec<RequiredChannel>,
    pub prizes: Vec<NewPrize>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrize {
    pub name: String,
    pub total: u32,
}
