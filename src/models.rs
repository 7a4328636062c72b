use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The passcode currently issued to a user.
///
/// `attempts` only means something while `code` is set. Clearing the code
/// may leave a stale count behind; the next generation resets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    pub code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

impl OtpRecord {
    pub fn clear(&mut self) {
        self.code = None;
        self.expires_at = None;
    }
}

/// How many codes were generated in the current quota window, anchored to
/// the most recent generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequestQuota {
    pub count: u32,
    pub last_request: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_phone_verified: bool,
    #[serde(default)]
    pub otp: OtpRecord,
    #[serde(default)]
    pub otp_request_count: OtpRequestQuota,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh active account. `phone_number` should already be normalized.
    pub fn new(name: &str, phone_number: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            email: None,
            is_active: true,
            is_phone_verified: false,
            otp: OtpRecord::default(),
            otp_request_count: OtpRequestQuota::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the API hands back about a user. Never includes OTP state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub is_phone_verified: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            phone_number: user.phone_number.clone(),
            email: user.email.clone(),
            is_phone_verified: user.is_phone_verified,
        }
    }
}
