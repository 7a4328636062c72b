use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::models::{User, UserView};
use crate::otp::{OtpManager, VerifyOutcome};
use crate::phone;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::sms::SmsDispatcher;
use crate::storage::UserStore;
use crate::token::TokenService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    #[default]
    Login,
    Verification,
    PasswordReset,
}

impl OtpPurpose {
    fn message_body(&self, code: &str, expiry_seconds: i64) -> String {
        let action = match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Verification => "phone verification",
            OtpPurpose::PasswordReset => "password reset",
        };
        format!(
            "Your {} code is {}. It expires in {} seconds. Do not share it with anyone.",
            action, code, expiry_seconds
        )
    }
}

#[derive(Debug, Clone)]
pub struct SendOtpResponse {
    pub msg: String,
    pub expires_in: i64,
    /// Codes the daily quota still allows after this one.
    pub remaining_attempts: u32,
    pub retry_after: DateTime<Utc>,
    /// Only populated in development mode.
    pub otp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifyOtpResponse {
    pub msg: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
}

/// One async mutex per phone number so that generation, delivery, rollback
/// and persistence for a user never interleave within this process.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    const PRUNE_THRESHOLD: usize = 1024;

    async fn acquire(&self, phone_number: &str) -> Result<OwnedMutexGuard<()>, AuthError> {
        let lock = {
            let mut map = self
                .locks
                .lock()
                .map_err(|_| AuthError::StorageError("Lock poisoned".into()))?;
            if map.len() >= Self::PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(phone_number.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }
}

pub struct AuthService {
    pub config: AuthConfig,
    store: Arc<dyn UserStore>,
    sms: SmsDispatcher,
    token_service: TokenService,
    rate_limiter: Arc<RateLimiter>,
    otp: OtpManager,
    locks: UserLocks,
}

impl AuthService {
    pub fn new(config: AuthConfig, store: Arc<dyn UserStore>, sms: SmsDispatcher) -> Self {
        Self::with_clock(config, store, sms, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AuthConfig,
        store: Arc<dyn UserStore>,
        sms: SmsDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let token_service = TokenService::new(config.clone());
        let rate_limiter = Arc::new(RateLimiter::new(&config, clock.clone()));
        let otp = OtpManager::new(&config, clock);
        Self {
            config,
            store,
            sms,
            token_service,
            rate_limiter,
            otp,
            locks: UserLocks::default(),
        }
    }

    /// The limiter, shared with the sweep scheduler.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    /// Current time as the service sees it.
    pub fn now(&self) -> DateTime<Utc> {
        self.otp.now()
    }

    pub fn token_service(&self) -> &TokenService {
        &self.token_service
    }

    #[instrument(skip(self))]
    pub async fn send_otp(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<SendOtpResponse, AuthError> {
        self.issue_otp(phone_number, purpose, false).await
    }

    /// Like [`send_otp`](Self::send_otp) but refuses while the previous code
    /// is still valid.
    #[instrument(skip(self))]
    pub async fn resend_otp(
        &self,
        phone_number: &str,
        purpose: OtpPurpose,
    ) -> Result<SendOtpResponse, AuthError> {
        self.issue_otp(phone_number, purpose, true).await
    }

    async fn issue_otp(
        &self,
        raw_phone: &str,
        purpose: OtpPurpose,
        resend: bool,
    ) -> Result<SendOtpResponse, AuthError> {
        let phone_number = phone::normalize(raw_phone)?;

        if let RateLimitDecision::Limited {
            message,
            retry_after,
        } = self.rate_limiter.check_limit(&phone_number)?
        {
            warn!(phone = %phone_number, "OTP send rate limited");
            return Err(AuthError::RateLimited {
                message,
                retry_after,
            });
        }

        let _guard = self.locks.acquire(&phone_number).await?;
        let mut user = self.load_active_user(&phone_number).await?;

        if resend && self.otp.is_active(&user) {
            if let Some(expires_at) = user.otp.expires_at {
                return Err(AuthError::OtpStillActive {
                    retry_after: expires_at,
                });
            }
        }

        if !self.otp.can_request_otp(&user) {
            warn!(phone = %phone_number, "Daily OTP quota exhausted");
            return Err(AuthError::QuotaExceeded {
                retry_after: self.otp.quota_retry_after(&user),
            });
        }

        let code = self.otp.generate_otp(&mut user);
        self.store.save(&user).await?;

        let expires_in = self.otp.expiry().num_seconds();
        let retry_after = user.otp.expires_at.unwrap_or_else(|| self.otp.now());
        let remaining_attempts = self.otp.remaining_requests(&user);

        if self.config.dev_mode {
            info!(phone = %phone_number, "Development mode: OTP delivery skipped");
            return Ok(SendOtpResponse {
                msg: "OTP generated (development mode)".to_string(),
                expires_in,
                remaining_attempts,
                retry_after,
                otp: Some(code),
            });
        }

        let body = purpose.message_body(&code, expires_in);
        if let Err(e) = self.sms.send(&phone_number, &body).await {
            error!(phone = %phone_number, "OTP delivery failed: {}", e);
            self.otp.rollback_generation(&mut user);
            if let Err(save_err) = self.store.save(&user).await {
                error!(phone = %phone_number, "Failed to roll back OTP: {}", save_err);
            }
            return Err(e);
        }

        info!(phone = %phone_number, ?purpose, "OTP sent");
        Ok(SendOtpResponse {
            msg: if resend {
                "OTP resent successfully".to_string()
            } else {
                "OTP sent successfully".to_string()
            },
            expires_in,
            remaining_attempts,
            retry_after,
            otp: None,
        })
    }

    #[instrument(skip(self, otp))]
    pub async fn verify_otp(
        &self,
        raw_phone: &str,
        otp: &str,
    ) -> Result<VerifyOtpResponse, AuthError> {
        let phone_number = phone::normalize(raw_phone)?;
        phone::validate_otp_format(otp, self.otp.otp_length())?;

        let _guard = self.locks.acquire(&phone_number).await?;
        let mut user = self.load_active_user(&phone_number).await?;

        let outcome = self.otp.verify_otp(&mut user, otp);
        match outcome {
            VerifyOutcome::Verified => {
                user.is_phone_verified = true;
                self.store.save(&user).await?;

                let access_token = self.token_service.create_access_token(&user)?;
                let refresh_token = self.token_service.create_refresh_token(&user)?;

                info!(phone = %phone_number, "OTP verified");
                Ok(VerifyOtpResponse {
                    msg: outcome.message(),
                    access_token,
                    refresh_token,
                    user: UserView::from(&user),
                })
            }
            VerifyOutcome::Rejected {
                reason,
                remaining_attempts,
            } => {
                // Only a compared code changes the stored attempt count.
                if reason == crate::otp::VerifyFailure::Incorrect {
                    self.store.save(&user).await?;
                }
                warn!(phone = %phone_number, %reason, "OTP verification failed");
                Err(AuthError::OtpRejected {
                    reason,
                    remaining_attempts,
                    can_request_new: self.otp.can_request_otp(&user),
                    retry_after: self.otp.quota_retry_after(&user),
                })
            }
        }
    }

    async fn load_active_user(&self, phone_number: &str) -> Result<User, AuthError> {
        let user = self
            .store
            .find_by_phone(phone_number)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }
        Ok(user)
    }
}
