use crate::errors::AuthError;
use crate::models::User;
use crate::storage::UserStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>, AuthError> {
        let map = self
            .users
            .read()
            .map_err(|_| AuthError::StorageError("Lock poisoned".into()))?;
        Ok(map.get(phone_number).cloned())
    }

    async fn insert(&self, user: User) -> Result<(), AuthError> {
        let mut map = self
            .users
            .write()
            .map_err(|_| AuthError::StorageError("Lock poisoned".into()))?;
        if map.contains_key(&user.phone_number) {
            return Err(AuthError::StorageError(format!(
                "User with phone {} already exists",
                user.phone_number
            )));
        }
        map.insert(user.phone_number.clone(), user);
        Ok(())
    }

    async fn save(&self, user: &User) -> Result<(), AuthError> {
        let mut map = self
            .users
            .write()
            .map_err(|_| AuthError::StorageError("Lock poisoned".into()))?;
        map.insert(user.phone_number.clone(), user.clone());
        Ok(())
    }
}
