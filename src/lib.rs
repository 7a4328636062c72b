#![doc = include_str!("../README.md")]

#[cfg(feature = "axum")]
pub mod axum_api;
pub mod clock;
pub mod config;
pub mod cron;
pub mod errors;
pub mod models;
pub mod otp;
pub mod phone;
pub mod rate_limit;
pub mod service;
pub mod sms;
pub mod storage;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, StorageType};
pub use cron::{SweepHandle, SweepScheduler};
pub use errors::AuthError;
pub use models::{User, UserView};
pub use otp::{OtpManager, VerifyFailure, VerifyOutcome};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use service::{AuthService, OtpPurpose};
pub use sms::{SmsDispatcher, SmsProvider, SmtpGatewayProvider, TwilioSmsProvider};
pub use storage::{InMemoryUserStore, RedisUserStore, UserStore};
