//! lotobot-core - Lottery participation and draw engine
//!
//! This library runs giveaway campaigns for a chat-bot audience: eligibility
//! checking for joins, an idempotent draw trigger with at-most-one-draw
//! semantics, fair prize allocation without replacement, notification
//! fan-out tolerating partial failure, and duplicate-safe announcement
//! publishing.

pub mod config;
pub mod draw;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod notify;
pub mod provider;
pub mod publish;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use draw::{allocate, Allocation, DrawOutcome, DrawTrigger};
pub use engine::LotteryEngine;
pub use error::{LotobotError, Result};
pub use notify::FanoutReport;
pub use provider::{
    ConsoleMessenger, Destination, MembershipProvider, Messenger, NoCustomTemplates,
    OpenMembership, TelegramProvider, TemplateKey, TemplateSource,
};
pub use publish::PublishOutcome;
pub use types::{
    DrawType, JoinRequest, Lottery, LotteryPatch, LotteryStatus, NewLottery, NewPrize, Participant,
    Prize, PublishRecord, RequiredChannel, UserQuota, Winner,
};
