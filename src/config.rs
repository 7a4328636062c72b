#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub dev_mode: bool, // Skip SMS delivery and echo the code
    pub otp_length: usize,
    pub otp_expiry_seconds: i64,
    pub otp_max_verify_attempts: u32,
    pub otp_daily_limit: u32,
    pub otp_quota_window_hours: i64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: i64,
    pub sms_timeout_seconds: u64,
    pub jwt_secret: String,
    pub jwt_algorithm: jsonwebtoken::Algorithm,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub storage_type: StorageType,
    pub redis_url: String,
    pub twilio: Option<TwilioConfig>,
    pub smtp_gateway: Option<SmtpGatewayConfig>,
    pub bind_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StorageType {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// Digits prepended to numbers stored without a leading `+`.
    pub default_country_code: Option<String>,
}

/// Email-to-SMS carrier gateway, used as a fallback provider.
#[derive(Debug, Clone)]
pub struct SmtpGatewayConfig {
    pub gateway_domain: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub mail_from: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            otp_length: 6,
            otp_expiry_seconds: 60,
            otp_max_verify_attempts: 3,
            otp_daily_limit: 5,
            otp_quota_window_hours: 24,
            rate_limit_max_requests: 10,
            rate_limit_window_seconds: 3600,
            sms_timeout_seconds: 10,
            jwt_secret: "secret".to_string(),
            jwt_algorithm: jsonwebtoken::Algorithm::HS256,
            access_token_expire_minutes: 60,
            refresh_token_expire_days: 30,
            storage_type: StorageType::Memory,
            redis_url: "redis://127.0.0.1/".to_string(),
            twilio: None,
            smtp_gateway: None,
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

use crate::errors::AuthError;

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, AuthError> {
    match std::env::var(name) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|_| AuthError::ConfigError(format!("Invalid {}", name))),
        Err(_) => Ok(None),
    }
}

fn required_var(name: &str) -> Result<String, AuthError> {
    std::env::var(name).map_err(|_| AuthError::ConfigError(format!("{} must be set", name)))
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("APP_ENV") {
            config.dev_mode = val.eq_ignore_ascii_case("development");
        }

        // Tokens cannot be minted without it, so there is no fallback.
        config.jwt_secret = required_var("JWT_SECRET")?;
        if config.jwt_secret.is_empty() {
            return Err(AuthError::ConfigError("JWT_SECRET must not be empty".to_string()));
        }

        if let Some(val) = parse_var("ACCESS_TOKEN_EXPIRE_MINUTES")? {
            config.access_token_expire_minutes = val;
        }
        if let Some(val) = parse_var("REFRESH_TOKEN_EXPIRE_DAYS")? {
            config.refresh_token_expire_days = val;
        }
        if let Some(val) = parse_var::<usize>("OTP_LENGTH")? {
            if !(1..=crate::otp::MAX_OTP_LENGTH).contains(&val) {
                return Err(AuthError::ConfigError(format!(
                    "OTP_LENGTH must be between 1 and {}",
                    crate::otp::MAX_OTP_LENGTH
                )));
            }
            config.otp_length = val;
        }
        if let Some(val) = parse_var("OTP_EXPIRY_SECONDS")? {
            config.otp_expiry_seconds = val;
        }
        if let Some(val) = parse_var("OTP_MAX_VERIFY_ATTEMPTS")? {
            config.otp_max_verify_attempts = val;
        }
        if let Some(val) = parse_var("OTP_DAILY_LIMIT")? {
            config.otp_daily_limit = val;
        }
        if let Some(val) = parse_var("RATE_LIMIT_MAX_REQUESTS")? {
            config.rate_limit_max_requests = val;
        }
        if let Some(val) = parse_var::<i64>("RATE_LIMIT_WINDOW_SECONDS")? {
            if val <= 0 {
                return Err(AuthError::ConfigError(
                    "RATE_LIMIT_WINDOW_SECONDS must be positive".to_string(),
                ));
            }
            config.rate_limit_window_seconds = val;
        }
        if let Some(val) = parse_var("SMS_TIMEOUT_SECONDS")? {
            config.sms_timeout_seconds = val;
        }

        if let Ok(val) = std::env::var("STORAGE_TYPE") {
            config.storage_type = match val.to_lowercase().as_str() {
                "memory" => StorageType::Memory,
                "redis" => StorageType::Redis,
                _ => {
                    return Err(AuthError::ConfigError(
                        "Invalid STORAGE_TYPE: must be 'memory' or 'redis'".to_string(),
                    ))
                }
            };
        }

        if config.storage_type == StorageType::Redis {
            let redis_host = required_var("REDIS_HOST")?;
            let redis_port = required_var("REDIS_PORT")?;
            config.redis_url = format!("redis://{}:{}/", redis_host, redis_port);
        }

        if let (Ok(account_sid), Ok(auth_token), Ok(from_number)) = (
            std::env::var("TWILIO_ACCOUNT_SID"),
            std::env::var("TWILIO_AUTH_TOKEN"),
            std::env::var("TWILIO_FROM_NUMBER"),
        ) {
            let default_country_code = match std::env::var("TWILIO_DEFAULT_COUNTRY_CODE") {
                Ok(code) => {
                    let code = code.trim_start_matches('+').to_string();
                    if code.is_empty()
                        || code.len() > 3
                        || !code.bytes().all(|b| b.is_ascii_digit())
                    {
                        return Err(AuthError::ConfigError(
                            "Invalid TWILIO_DEFAULT_COUNTRY_CODE".to_string(),
                        ));
                    }
                    Some(code)
                }
                Err(_) => None,
            };
            config.twilio = Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
                default_country_code,
            });
        }

        if let Ok(gateway_domain) = std::env::var("SMS_EMAIL_GATEWAY_DOMAIN") {
            config.smtp_gateway = Some(SmtpGatewayConfig {
                gateway_domain,
                smtp_server: required_var("SMTP_HOST")?,
                smtp_port: parse_var("SMTP_PORT")?.unwrap_or(587),
                smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
                mail_from: required_var("SMTP_MAIL_FROM")?,
            });
        }

        if !config.dev_mode && config.twilio.is_none() && config.smtp_gateway.is_none() {
            return Err(AuthError::ConfigError(
                "No SMS provider configured: set TWILIO_* or SMS_EMAIL_GATEWAY_DOMAIN".to_string(),
            ));
        }

        if let Ok(val) = std::env::var("BIND_ADDR") {
            config.bind_addr = val;
        }

        Ok(config)
    }
}
