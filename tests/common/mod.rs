use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use phone_otp_auth::{
    axum_api::auth_router, AuthConfig, AuthError, AuthService, InMemoryUserStore, ManualClock,
    SmsDispatcher, SmsProvider, User, UserStore,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt; // for oneshot

#[allow(dead_code)]
pub const PHONE: &str = "+15551234567";

#[derive(Default)]
pub struct TestSmsProvider {
    pub sent_messages: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl TestSmsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsProvider for TestSmsProvider {
    fn name(&self) -> &'static str {
        "test"
    }

    async fn send_message(&self, destination: &str, body: &str) -> Result<(), AuthError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AuthError::Delivery("test provider unavailable".to_string()));
        }
        self.sent_messages
            .lock()
            .unwrap()
            .push((destination.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub sms: Arc<TestSmsProvider>,
    pub store: Arc<InMemoryUserStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    #[allow(dead_code)]
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    #[allow(dead_code)]
    pub async fn stored_user(&self) -> User {
        self.store.find_by_phone(PHONE).await.unwrap().unwrap()
    }
}

#[allow(dead_code)]
pub async fn spawn_app() -> TestApp {
    spawn_app_with(AuthConfig::default()).await
}

pub async fn spawn_app_with(auth_config: AuthConfig) -> TestApp {
    let store = Arc::new(InMemoryUserStore::new());
    store.insert(User::new("Asha", PHONE)).await.unwrap();

    let sms = Arc::new(TestSmsProvider::new());
    let clock = Arc::new(ManualClock::default());
    let providers: Vec<Arc<dyn SmsProvider>> = vec![sms.clone()];
    let dispatcher = SmsDispatcher::new(providers, Duration::from_secs(5));

    let auth_service = Arc::new(AuthService::with_clock(
        auth_config,
        store.clone(),
        dispatcher,
        clock.clone(),
    ));

    TestApp {
        router: auth_router(auth_service),
        sms,
        store,
        clock,
    }
}
