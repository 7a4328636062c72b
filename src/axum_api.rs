use crate::errors::AuthError;
use crate::models::UserView;
use crate::service::{AuthService, OtpPurpose, SendOtpResponse};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub phone_number: String,
    pub purpose: Option<OtpPurpose>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpBody {
    pub success: bool,
    pub msg: String,
    pub expires_in: i64,
    pub remaining_attempts: u32,
    pub retry_after: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

impl From<SendOtpResponse> for SendOtpBody {
    fn from(response: SendOtpResponse) -> Self {
        Self {
            success: true,
            msg: response.msg,
            expires_in: response.expires_in,
            remaining_attempts: response.remaining_attempts,
            retry_after: response.retry_after,
            otp: response.otp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpBody {
    pub success: bool,
    pub msg: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserView,
    pub is_phone_verified: bool,
}

impl AppState {
    /// Pairs an error with the service clock so the `Retry-After` header and
    /// the JSON `retryAfter` are measured against the same instant.
    fn reject(&self, error: AuthError) -> ApiError {
        ApiError {
            error,
            now: self.auth_service.now(),
        }
    }
}

/// An [`AuthError`] ready to be rendered at a given time.
#[derive(Debug)]
pub struct ApiError {
    pub error: AuthError,
    pub now: DateTime<Utc>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError {
            error: self,
            now: Utc::now(),
        }
        .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError { error, now } = self;
        let status = match &error {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::OtpStillActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::AccountDeactivated => StatusCode::UNAUTHORIZED,
            AuthError::OtpRejected { .. } => StatusCode::BAD_REQUEST,
            AuthError::Delivery(_)
            | AuthError::RedisError(_)
            | AuthError::TokenError(_)
            | AuthError::SerializationError(_)
            | AuthError::ConfigError(_)
            | AuthError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let msg = match &error {
            AuthError::Delivery(_) => "Failed to send OTP. Please try again later".to_string(),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("Request failed: {}", error);
                "Internal server error".to_string()
            }
            _ => error.to_string(),
        };

        let mut body = serde_json::json!({
            "success": false,
            "msg": msg,
        });
        if let AuthError::OtpRejected {
            remaining_attempts,
            can_request_new,
            retry_after,
            ..
        } = &error
        {
            body["remainingAttempts"] = serde_json::json!(remaining_attempts);
            body["canRequestNew"] = serde_json::json!(can_request_new);
            body["retryAfter"] = serde_json::json!(retry_after);
        } else if let Some(retry_after) = error.retry_after() {
            body["retryAfter"] = serde_json::json!(retry_after);
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(retry_after) = error.retry_after() {
                let seconds = (retry_after - now).num_seconds().max(0);
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
        }
        response
    }
}

fn body_or_validation<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AuthError::Validation(rejection.body_text()))
}

pub async fn send_otp(
    State(state): State<AppState>,
    payload: Result<Json<SendOtpRequest>, JsonRejection>,
) -> Result<Json<SendOtpBody>, ApiError> {
    let payload = body_or_validation(payload).map_err(|e| state.reject(e))?;
    let response = state
        .auth_service
        .send_otp(&payload.phone_number, payload.purpose.unwrap_or_default())
        .await
        .map_err(|e| state.reject(e))?;
    Ok(Json(response.into()))
}

pub async fn resend_otp(
    State(state): State<AppState>,
    payload: Result<Json<SendOtpRequest>, JsonRejection>,
) -> Result<Json<SendOtpBody>, ApiError> {
    let payload = body_or_validation(payload).map_err(|e| state.reject(e))?;
    let response = state
        .auth_service
        .resend_otp(&payload.phone_number, payload.purpose.unwrap_or_default())
        .await
        .map_err(|e| state.reject(e))?;
    Ok(Json(response.into()))
}

pub async fn verify_otp(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<VerifyOtpBody>, ApiError> {
    let payload = body_or_validation(payload).map_err(|e| state.reject(e))?;
    let response = state
        .auth_service
        .verify_otp(&payload.phone_number, &payload.otp)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(VerifyOtpBody {
        success: true,
        msg: response.msg,
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        user: response.user,
        is_phone_verified: true,
    }))
}

pub fn auth_router(auth_service: Arc<AuthService>) -> Router {
    let state = AppState { auth_service };
    Router::new()
        .route("/otp/send", post(send_otp))
        .route("/otp/verify", post(verify_otp))
        .route("/otp/resend", post(resend_otp))
        .with_state(state)
}
