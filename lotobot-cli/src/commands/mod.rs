pub mod lottery;
pub mod participant;
pub mod publish;
pub mod sweep;

pub use lottery::{handle_lottery_command, LotteryCommands};
pub use participant::{handle_participant_command, ParticipantCommands};
pub use publish::{handle_publish_command, PublishCommands};
pub use sweep::handle_sweep;
