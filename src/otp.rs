use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::models::User;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::fmt;
use std::sync::Arc;

/// Longest code that fits the `u32` range used to draw it.
pub const MAX_OTP_LENGTH: usize = 9;

/// Why a submitted code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    NoOtpRequested,
    Expired,
    TooManyAttempts,
    Incorrect,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VerifyFailure::NoOtpRequested => "No OTP requested. Please request a new OTP",
            VerifyFailure::Expired => "OTP has expired. Please request a new OTP",
            VerifyFailure::TooManyAttempts => {
                "Too many failed attempts. Please request a new OTP"
            }
            VerifyFailure::Incorrect => "Incorrect OTP",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Rejected {
        reason: VerifyFailure,
        remaining_attempts: u32,
    },
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Verified)
    }

    pub fn message(&self) -> String {
        match self {
            VerifyOutcome::Verified => "OTP verified successfully".to_string(),
            VerifyOutcome::Rejected {
                reason,
                remaining_attempts,
            } => rejection_message(reason, remaining_attempts),
        }
    }
}

pub(crate) fn rejection_message(reason: &VerifyFailure, remaining_attempts: &u32) -> String {
    match reason {
        VerifyFailure::Incorrect => format!(
            "Incorrect OTP. {} attempt{} remaining",
            remaining_attempts,
            if *remaining_attempts == 1 { "" } else { "s" }
        ),
        _ => reason.to_string(),
    }
}

/// Issues, expires and checks the passcode embedded in a [`User`].
///
/// Every operation mutates the user in place; persisting it is the caller's
/// job.
#[derive(Clone)]
pub struct OtpManager {
    otp_length: usize,
    expiry: Duration,
    max_attempts: u32,
    daily_limit: u32,
    quota_window: Duration,
    clock: Arc<dyn Clock>,
}

impl OtpManager {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            otp_length: config.otp_length.clamp(1, MAX_OTP_LENGTH),
            expiry: Duration::seconds(config.otp_expiry_seconds),
            max_attempts: config.otp_max_verify_attempts,
            daily_limit: config.otp_daily_limit,
            quota_window: Duration::hours(config.otp_quota_window_hours),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    fn quota_window_elapsed(&self, user: &User, now: DateTime<Utc>) -> bool {
        match user.otp_request_count.last_request {
            Some(last) => now - last >= self.quota_window,
            None => true,
        }
    }

    pub fn can_request_otp(&self, user: &User) -> bool {
        let now = self.clock.now();
        user.otp_request_count.count < self.daily_limit || self.quota_window_elapsed(user, now)
    }

    /// Codes that can still be generated before the daily quota blocks.
    pub fn remaining_requests(&self, user: &User) -> u32 {
        if self.quota_window_elapsed(user, self.clock.now()) {
            self.daily_limit
        } else {
            self.daily_limit
                .saturating_sub(user.otp_request_count.count)
        }
    }

    /// When the daily quota lets the user in again, if it currently blocks.
    pub fn quota_retry_after(&self, user: &User) -> Option<DateTime<Utc>> {
        if self.can_request_otp(user) {
            return None;
        }
        user.otp_request_count
            .last_request
            .map(|last| last + self.quota_window)
    }

    pub fn is_active(&self, user: &User) -> bool {
        match (&user.otp.code, user.otp.expires_at) {
            (Some(_), Some(expires_at)) => self.clock.now() < expires_at,
            _ => false,
        }
    }

    pub fn generate_otp(&self, user: &mut User) -> String {
        let now = self.clock.now();
        let code = self.random_code();

        user.otp.code = Some(code.clone());
        user.otp.expires_at = Some(now + self.expiry);
        user.otp.attempts = 0;

        let quota = if self.quota_window_elapsed(user, now) {
            1
        } else {
            user.otp_request_count.count + 1
        };
        user.otp_request_count.count = quota;
        user.otp_request_count.last_request = Some(now);
        user.updated_at = now;

        code
    }

    /// Undoes a generation whose delivery failed: the code is withdrawn and
    /// the quota charge refunded.
    pub fn rollback_generation(&self, user: &mut User) {
        user.otp.clear();
        user.otp_request_count.count = user.otp_request_count.count.saturating_sub(1);
        user.updated_at = self.clock.now();
    }

    pub fn verify_otp(&self, user: &mut User, submitted: &str) -> VerifyOutcome {
        let now = self.clock.now();

        let code = match &user.otp.code {
            Some(code) => code.clone(),
            None => return self.rejected(VerifyFailure::NoOtpRequested, 0),
        };

        // An absent expiry is treated like an expired code.
        if user.otp.expires_at.map_or(true, |expires_at| now >= expires_at) {
            return self.rejected(VerifyFailure::Expired, self.remaining_attempts(user));
        }

        if user.otp.attempts >= self.max_attempts {
            return self.rejected(VerifyFailure::TooManyAttempts, 0);
        }

        user.otp.attempts += 1;
        user.updated_at = now;

        if submitted != code {
            return self.rejected(VerifyFailure::Incorrect, self.remaining_attempts(user));
        }

        user.otp.clear();
        VerifyOutcome::Verified
    }

    fn remaining_attempts(&self, user: &User) -> u32 {
        self.max_attempts.saturating_sub(user.otp.attempts)
    }

    fn rejected(&self, reason: VerifyFailure, remaining_attempts: u32) -> VerifyOutcome {
        VerifyOutcome::Rejected {
            reason,
            remaining_attempts,
        }
    }

    fn random_code(&self) -> String {
        let mut rng = rand::thread_rng();
        let range = 10u32.pow(self.otp_length as u32);
        let num = rng.gen_range(0..range);
        format!("{:0width$}", num, width = self.otp_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager() -> (OtpManager, Arc<ManualClock>, User) {
        let clock = Arc::new(ManualClock::default());
        let manager = OtpManager::new(&AuthConfig::default(), clock.clone());
        (manager, clock, User::new("Asha", "+15551234567"))
    }

    fn set_code(manager: &OtpManager, user: &mut User, code: &str) {
        manager.generate_otp(user);
        user.otp.code = Some(code.to_string());
    }

    #[test]
    fn test_generated_code_is_six_digits() {
        let (manager, _, mut user) = manager();
        for _ in 0..500 {
            let code = manager.generate_otp(&mut user);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_oversized_length_is_capped() {
        let config = AuthConfig {
            otp_length: 12,
            ..AuthConfig::default()
        };
        let manager = OtpManager::new(&config, Arc::new(ManualClock::default()));
        let mut user = User::new("Asha", "+15551234567");

        assert_eq!(manager.otp_length(), MAX_OTP_LENGTH);
        for _ in 0..100 {
            let code = manager.generate_otp(&mut user);
            assert_eq!(code.len(), MAX_OTP_LENGTH);
        }

        let config = AuthConfig {
            otp_length: 0,
            ..AuthConfig::default()
        };
        let manager = OtpManager::new(&config, Arc::new(ManualClock::default()));
        assert_eq!(manager.generate_otp(&mut user).len(), 1);
    }

    #[test]
    fn test_generate_sets_expiry_and_resets_attempts() {
        let (manager, clock, mut user) = manager();
        user.otp.attempts = 2;

        let code = manager.generate_otp(&mut user);

        assert_eq!(user.otp.code.as_deref(), Some(code.as_str()));
        assert_eq!(user.otp.expires_at, Some(clock.now() + Duration::seconds(60)));
        assert_eq!(user.otp.attempts, 0);
        assert_eq!(user.otp_request_count.count, 1);
        assert_eq!(user.otp_request_count.last_request, Some(clock.now()));
    }

    #[test]
    fn test_correct_code_verifies_once() {
        let (manager, _, mut user) = manager();
        let code = manager.generate_otp(&mut user);

        let outcome = manager.verify_otp(&mut user, &code);
        assert!(outcome.is_valid());
        assert!(user.otp.code.is_none());
        assert!(user.otp.expires_at.is_none());

        let replay = manager.verify_otp(&mut user, &code);
        assert_eq!(
            replay,
            VerifyOutcome::Rejected {
                reason: VerifyFailure::NoOtpRequested,
                remaining_attempts: 0
            }
        );
    }

    #[test]
    fn test_no_otp_requested() {
        let (manager, _, mut user) = manager();
        let outcome = manager.verify_otp(&mut user, "123456");
        assert!(!outcome.is_valid());
        assert!(outcome.message().contains("No OTP requested"));
    }

    #[test]
    fn test_expired_code_does_not_count_attempt() {
        let (manager, clock, mut user) = manager();
        let code = manager.generate_otp(&mut user);

        clock.advance(Duration::seconds(61));
        let outcome = manager.verify_otp(&mut user, &code);

        assert!(!outcome.is_valid());
        assert!(outcome.message().contains("expired"));
        assert_eq!(user.otp.attempts, 0);
        assert_eq!(user.otp.code.as_deref(), Some(code.as_str()));
    }

    #[test]
    fn test_code_expires_exactly_at_deadline() {
        let (manager, clock, mut user) = manager();
        let code = manager.generate_otp(&mut user);

        clock.advance(Duration::seconds(60));
        assert!(!manager.is_active(&user));
        assert!(matches!(
            manager.verify_otp(&mut user, &code),
            VerifyOutcome::Rejected {
                reason: VerifyFailure::Expired,
                ..
            }
        ));
    }

    #[test]
    fn test_leading_zero_requires_exact_match() {
        let (manager, _, mut user) = manager();
        set_code(&manager, &mut user, "042917");

        let outcome = manager.verify_otp(&mut user, "42917");
        assert!(!outcome.is_valid());
        assert_eq!(user.otp.attempts, 1);

        assert!(manager.verify_otp(&mut user, "042917").is_valid());
    }

    #[test]
    fn test_wrong_codes_report_remaining_attempts() {
        let (manager, _, mut user) = manager();
        set_code(&manager, &mut user, "111111");

        let first = manager.verify_otp(&mut user, "000000");
        assert_eq!(
            first,
            VerifyOutcome::Rejected {
                reason: VerifyFailure::Incorrect,
                remaining_attempts: 2
            }
        );
        assert_eq!(first.message(), "Incorrect OTP. 2 attempts remaining");

        let second = manager.verify_otp(&mut user, "000000");
        assert_eq!(second.message(), "Incorrect OTP. 1 attempt remaining");
    }

    #[test]
    fn test_lockout_after_three_failures() {
        let (manager, _, mut user) = manager();
        set_code(&manager, &mut user, "111111");

        for _ in 0..3 {
            assert!(!manager.verify_otp(&mut user, "000000").is_valid());
        }

        let outcome = manager.verify_otp(&mut user, "111111");
        assert_eq!(
            outcome,
            VerifyOutcome::Rejected {
                reason: VerifyFailure::TooManyAttempts,
                remaining_attempts: 0
            }
        );
        assert_eq!(user.otp.attempts, 3);

        // A fresh code lifts the lockout.
        let code = manager.generate_otp(&mut user);
        assert!(manager.verify_otp(&mut user, &code).is_valid());
    }

    #[test]
    fn test_daily_quota_blocks_sixth_generation() {
        let (manager, clock, mut user) = manager();

        for _ in 0..5 {
            assert!(manager.can_request_otp(&user));
            manager.generate_otp(&mut user);
            clock.advance(Duration::minutes(10));
        }

        assert!(!manager.can_request_otp(&user));
        assert_eq!(manager.remaining_requests(&user), 0);
        assert_eq!(
            manager.quota_retry_after(&user),
            Some(user.otp_request_count.last_request.unwrap() + Duration::hours(24))
        );

        let last = user.otp_request_count.last_request.unwrap();
        clock.set(last + Duration::hours(24) - Duration::seconds(1));
        assert!(!manager.can_request_otp(&user));

        clock.set(last + Duration::hours(24));
        assert!(manager.can_request_otp(&user));
        assert_eq!(manager.quota_retry_after(&user), None);

        manager.generate_otp(&mut user);
        assert_eq!(user.otp_request_count.count, 1);
    }

    #[test]
    fn test_quota_window_anchored_to_last_request() {
        let (manager, clock, mut user) = manager();
        manager.generate_otp(&mut user);
        clock.advance(Duration::hours(23));
        manager.generate_otp(&mut user);
        clock.advance(Duration::hours(23));
        manager.generate_otp(&mut user);

        assert_eq!(user.otp_request_count.count, 3);
        assert_eq!(manager.remaining_requests(&user), 2);
    }

    #[test]
    fn test_rollback_refunds_quota() {
        let (manager, _, mut user) = manager();
        manager.generate_otp(&mut user);
        manager.generate_otp(&mut user);

        manager.rollback_generation(&mut user);

        assert!(user.otp.code.is_none());
        assert!(user.otp.expires_at.is_none());
        assert_eq!(user.otp_request_count.count, 1);
    }
}
