use thiserror::Error;

pub type Result<T> = std::result::Result<T, LotobotError>;

#[derive(Error, Debug)]
pub enum LotobotError {
    #[error("Lottery not found: {id}")]
    NotFound { id: String },

    #[error("Lottery is not active: {id}")]
    NotActive { id: String },

    #[error("Already joined this lottery")]
    AlreadyJoined,

    #[error("A username is required to join this lottery")]
    UsernameRequired,

    #[error("Must join required channels first: {}", missing.join(", "))]
    ChannelMembershipRequired { missing: Vec<String> },

    #[error("Daily join limit reached ({limit} per day)")]
    DailyLimitReached { limit: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Lost concurrent write race: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LotobotError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn not_active(id: impl Into<String>) -> Self {
        Self::NotActive { id: id.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a user-facing join rejection rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::NotActive { .. }
                | Self::AlreadyJoined
                | Self::UsernameRequired
                | Self::ChannelMembershipRequired { .. }
                | Self::DailyLimitReached { .. }
        )
    }
}

// conversion from reqwest::Error (provider transport failures are transient)
impl From<reqwest::Error> for LotobotError {
    fn from(err: reqwest::Error) -> Self {
        LotobotError::Provider(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_distinguished_from_faults() {
        assert!(LotobotError::AlreadyJoined.is_rejection());
        assert!(LotobotError::UsernameRequired.is_rejection());
        assert!(LotobotError::not_found("abc").is_rejection());
        assert!(LotobotError::DailyLimitReached { limit: 3 }.is_rejection());

        assert!(!LotobotError::provider("telegram down").is_rejection());
        assert!(!LotobotError::conflict("lost race").is_rejection());
        assert!(!LotobotError::internal("bug").is_rejection());
    }
}
