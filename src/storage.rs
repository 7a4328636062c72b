use crate::errors::AuthError;
use crate::models::User;
use async_trait::async_trait;

pub mod memory;

/// Where user documents live, keyed by normalized phone number.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>, AuthError>;

    /// Adds a new user. Fails if the phone number is already taken.
    async fn insert(&self, user: User) -> Result<(), AuthError>;

    /// Overwrites the stored document for `user.phone_number`.
    async fn save(&self, user: &User) -> Result<(), AuthError>;
}

pub mod redis;
pub use self::memory::InMemoryUserStore;
pub use self::redis::RedisUserStore;
