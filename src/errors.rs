use crate::otp::{rejection_message, VerifyFailure};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: DateTime<Utc>,
    },

    #[error("Daily OTP limit reached. Please try again later")]
    QuotaExceeded { retry_after: Option<DateTime<Utc>> },

    #[error("An OTP was already sent and is still valid")]
    OtpStillActive { retry_after: DateTime<Utc> },

    #[error("User not found")]
    UserNotFound,

    #[error("Account is deactivated")]
    AccountDeactivated,

    #[error("Failed to send OTP: {0}")]
    Delivery(String),

    #[error("{}", rejection_message(.reason, .remaining_attempts))]
    OtpRejected {
        reason: VerifyFailure,
        remaining_attempts: u32,
        can_request_new: bool,
        retry_after: Option<DateTime<Utc>>,
    },

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl AuthError {
    /// When the client may try again, for errors that carry such guidance.
    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            AuthError::RateLimited { retry_after, .. } => Some(*retry_after),
            AuthError::QuotaExceeded { retry_after } => *retry_after,
            AuthError::OtpStillActive { retry_after } => Some(*retry_after),
            AuthError::OtpRejected { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
