use crate::errors::AuthError;
use crate::models::User;
use crate::storage::UserStore;
use async_trait::async_trait;
use redis::AsyncCommands;

/// Keeps each user as a JSON document under `user:<phone>`.
pub struct RedisUserStore {
    client: redis::Client,
}

impl RedisUserStore {
    pub fn new(redis_url: &str) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn key(phone_number: &str) -> String {
        format!("user:{}", phone_number)
    }
}

#[async_trait]
impl UserStore for RedisUserStore {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>, AuthError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let doc: Option<String> = conn.get(Self::key(phone_number)).await?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, user: User) -> Result<(), AuthError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let doc = serde_json::to_string(&user)?;
        let created: bool = conn.set_nx(Self::key(&user.phone_number), doc).await?;
        if !created {
            return Err(AuthError::StorageError(format!(
                "User with phone {} already exists",
                user.phone_number
            )));
        }
        Ok(())
    }

    async fn save(&self, user: &User) -> Result<(), AuthError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let doc = serde_json::to_string(user)?;
        conn.set::<_, _, ()>(Self::key(&user.phone_number), doc)
            .await?;
        Ok(())
    }
}
