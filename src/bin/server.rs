use anyhow::Context;
use phone_otp_auth::axum_api::auth_router;
use phone_otp_auth::config::StorageType;
use phone_otp_auth::{
    AuthConfig, AuthService, InMemoryUserStore, RedisUserStore, SmsDispatcher, SmsProvider,
    SmtpGatewayProvider, SweepScheduler, TwilioSmsProvider, UserStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Missing secrets or providers are fatal here, before anything listens.
    let config = AuthConfig::from_env().context("Failed to load configuration")?;

    let store: Arc<dyn UserStore> = match config.storage_type {
        StorageType::Memory => {
            warn!("Using in-memory user store; data is lost on restart");
            Arc::new(InMemoryUserStore::new())
        }
        StorageType::Redis => Arc::new(
            RedisUserStore::new(&config.redis_url).context("Failed to open Redis client")?,
        ),
    };

    let mut providers: Vec<Arc<dyn SmsProvider>> = Vec::new();
    if let Some(twilio) = &config.twilio {
        providers.push(Arc::new(TwilioSmsProvider::new(twilio.clone())));
    }
    if let Some(gateway) = &config.smtp_gateway {
        providers.push(Arc::new(
            SmtpGatewayProvider::new(gateway).context("Failed to build SMTP gateway")?,
        ));
    }
    if config.dev_mode {
        warn!("Development mode: OTP codes are returned in responses and not delivered");
    }
    let sms = SmsDispatcher::new(providers, Duration::from_secs(config.sms_timeout_seconds));
    if sms.is_empty() {
        info!("No SMS provider configured");
    }

    let bind_addr = config.bind_addr.clone();
    let auth_service = Arc::new(AuthService::new(config, store, sms));

    let limiter = auth_service.rate_limiter();
    let sweep_interval = limiter
        .window()
        .to_std()
        .context("Rate limit window must be positive")?;
    let sweep = SweepScheduler::new(limiter).start(sweep_interval);

    let app = auth_router(auth_service);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweep.stop().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
