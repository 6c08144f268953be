use thiserror::Error;

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient points: need {required}, have {available}")]
    InsufficientPoints { required: u64, available: u64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("Concurrent modification of {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LoyaltyError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Only optimistic-concurrency collisions are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoyaltyError::Conflict(_))
    }

    /// Business-rule failures surface to the caller as-is; everything else is
    /// an infrastructure fault.
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            LoyaltyError::Config(_) | LoyaltyError::Serialization(_) | LoyaltyError::Internal(_)
        )
    }

    /// Stable machine-readable code for API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            LoyaltyError::NotFound(_) => "not_found",
            LoyaltyError::Validation(_) => "validation_error",
            LoyaltyError::InsufficientPoints { .. } => "insufficient_points",
            LoyaltyError::InvalidState(_) => "invalid_state",
            LoyaltyError::AlreadyClaimed(_) => "already_claimed",
            LoyaltyError::Conflict(_) => "conflict",
            LoyaltyError::Config(_) => "config_error",
            LoyaltyError::Serialization(_) => "serialization_error",
            LoyaltyError::Internal(_) => "internal_error",
        }
    }
}
