use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::models::User;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub phone: String,
    pub exp: usize,
    pub jti: String,
    pub typ: String, // "access" or "refresh"
}

pub struct TokenService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    fn create_token(&self, user: &User, lifetime: Duration, typ: &str) -> Result<String, AuthError> {
        let expiration = (Utc::now() + lifetime).timestamp() as usize;

        let claims = Claims {
            sub: user.id.to_string(),
            phone: user.phone_number.clone(),
            exp: expiration,
            jti: Uuid::new_v4().to_string(),
            typ: typ.to_string(),
        };

        let header = Header::new(self.config.jwt_algorithm);
        let token = encode(&header, &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn create_access_token(&self, user: &User) -> Result<String, AuthError> {
        self.create_token(
            user,
            Duration::minutes(self.config.access_token_expire_minutes),
            "access",
        )
    }

    pub fn create_refresh_token(&self, user: &User) -> Result<String, AuthError> {
        self.create_token(
            user,
            Duration::days(self.config.refresh_token_expire_days),
            "refresh",
        )
    }

    pub fn verify_token(&self, token: &str, expected_type: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(self.config.jwt_algorithm);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if token_data.claims.typ != expected_type {
            return Err(AuthError::TokenError(jsonwebtoken::errors::Error::from(
                jsonwebtoken::errors::ErrorKind::InvalidToken,
            )));
        }

        Ok(token_data.claims)
    }
}
