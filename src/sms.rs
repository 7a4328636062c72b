use crate::config::{SmtpGatewayConfig, TwilioConfig};
use crate::errors::AuthError;
use crate::phone;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Something that can put a text message on a phone.
///
/// Implementations validate the destination themselves and report failure
/// as [`AuthError::Delivery`] so the dispatcher can move on to the next one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_message(&self, destination: &str, body: &str) -> Result<(), AuthError>;
}

/// Tries providers in order until one accepts the message.
pub struct SmsDispatcher {
    providers: Vec<Arc<dyn SmsProvider>>,
    timeout: Duration,
}

impl SmsDispatcher {
    pub fn new(providers: Vec<Arc<dyn SmsProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns the name of the provider that delivered the message. When all
    /// of them fail the error text lists each provider's failure.
    #[instrument(skip(self, body))]
    pub async fn send(&self, destination: &str, body: &str) -> Result<&'static str, AuthError> {
        if self.providers.is_empty() {
            return Err(AuthError::Delivery("No SMS provider configured".to_string()));
        }

        let mut failures = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let attempt = tokio::time::timeout(
                self.timeout,
                provider.send_message(destination, body),
            )
            .await;

            match attempt {
                Ok(Ok(())) => {
                    info!(provider = provider.name(), "SMS delivered");
                    return Ok(provider.name());
                }
                Ok(Err(e)) => {
                    warn!(provider = provider.name(), "SMS provider failed: {}", e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
                Err(_) => {
                    warn!(provider = provider.name(), "SMS provider timed out");
                    failures.push(format!(
                        "{}: timed out after {:?}",
                        provider.name(),
                        self.timeout
                    ));
                }
            }
        }

        Err(AuthError::Delivery(failures.join("; ")))
    }
}

pub struct TwilioSmsProvider {
    client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioSmsProvider {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

/// Formats a stored number as E.164.
///
/// A number stored without `+` is national; it only becomes dialable
/// abroad once a country code is known, so without one it is refused
/// rather than guessed.
pub fn to_e164(
    destination: &str,
    default_country_code: Option<&str>,
) -> Result<String, AuthError> {
    let normalized = phone::normalize(destination)?;
    if normalized.starts_with('+') {
        return Ok(normalized);
    }
    match default_country_code {
        Some(code) => Ok(format!("+{}{}", code.trim_start_matches('+'), normalized)),
        None => Err(AuthError::Delivery(format!(
            "{} has no country code and TWILIO_DEFAULT_COUNTRY_CODE is not set",
            normalized
        ))),
    }
}

#[async_trait]
impl SmsProvider for TwilioSmsProvider {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send_message(&self, destination: &str, body: &str) -> Result<(), AuthError> {
        let to = to_e164(destination, self.config.default_country_code.as_deref())?;

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );
        let form = [
            ("To", to.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Delivery(format!("Request to Twilio failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AuthError::Delivery(format!(
                "Twilio returned {}: {}",
                status, error_body
            )));
        }
        Ok(())
    }
}

/// Sends the text as an email to a carrier's email-to-SMS gateway.
pub struct SmtpGatewayProvider {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    gateway_domain: String,
}

impl SmtpGatewayProvider {
    pub fn new(config: &SmtpGatewayConfig) -> Result<Self, AuthError> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        // Port 1025 is a local capture server (Mailpit) without TLS.
        let mailer = if config.smtp_port == 1025 {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
                .port(config.smtp_port)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
                .map_err(|e| AuthError::ConfigError(format!("Invalid SMTP host: {}", e)))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from_email: config.mail_from.clone(),
            gateway_domain: config.gateway_domain.clone(),
        })
    }
}

#[async_trait]
impl SmsProvider for SmtpGatewayProvider {
    fn name(&self) -> &'static str {
        "smtp-gateway"
    }

    async fn send_message(&self, destination: &str, body: &str) -> Result<(), AuthError> {
        let normalized = phone::normalize(destination)?;
        let recipient = format!("{}@{}", phone::digits(&normalized), self.gateway_domain);

        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e| AuthError::Delivery(format!("Invalid from address: {}", e)))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| AuthError::Delivery(format!("Invalid gateway address: {}", e)))?)
            .body(body.to_string())
            .map_err(|e| AuthError::Delivery(format!("Failed to build message: {}", e)))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AuthError::Delivery(format!("Failed to send via gateway: {}", e)))?;
        Ok(())
    }
}
