use axum::http::{header, StatusCode};
use chrono::{DateTime, Duration, Utc};
use phone_otp_auth::Clock;
use serde_json::json;

mod common;
use common::spawn_app;

#[tokio::test]
async fn test_send_otp_rate_limit() {
    let app = spawn_app().await;
    // Unregistered, so the daily quota never gets involved.
    let phone = "+447700900123";

    // 10 allowed attempts (default config)
    for _ in 0..10 {
        let (status, _, _) = app.post("/otp/send", json!({ "phoneNumber": phone })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // 11th attempt should fail
    let (status, headers, body) = app.post("/otp/send", json!({ "phoneNumber": phone })).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);
    assert!(body["msg"]
        .as_str()
        .unwrap()
        .contains("Too many OTP requests"));
    assert!(body["retryAfter"].is_string());
    assert_eq!(headers[header::RETRY_AFTER], "3600");

    // Resend shares the same budget.
    let (status, _, _) = app.post("/otp/resend", json!({ "phoneNumber": phone })).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Header and body count down on the same clock.
    app.clock.advance(Duration::minutes(15));
    let (status, headers, body) = app.post("/otp/send", json!({ "phoneNumber": phone })).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "2700");
    let retry_at: DateTime<Utc> =
        serde_json::from_value(body["retryAfter"].clone()).unwrap();
    assert_eq!((retry_at - app.clock.now()).num_seconds(), 2700);

    app.clock.advance(Duration::minutes(45) + Duration::seconds(1));
    let (status, _, _) = app.post("/otp/send", json!({ "phoneNumber": phone })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_formatting_does_not_bypass_rate_limit() {
    let app = spawn_app().await;

    for i in 0..10 {
        let phone = if i % 2 == 0 {
            "+44 7700 900123"
        } else {
            "+44-7700-900-123"
        };
        app.post("/otp/send", json!({ "phoneNumber": phone })).await;
    }

    let (status, _, _) = app
        .post("/otp/send", json!({ "phoneNumber": "+447700900123" }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
