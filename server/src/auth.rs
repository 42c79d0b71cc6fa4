//! In-memory credential store.
//!
//! Nothing is persisted and passwords are compared as plain strings; the
//! store exists so connections can identify themselves with a stable
//! username.

use crate::error::AuthError;
use log::info;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, String>>,
}

/// Usernames end up in space- and comma-separated protocol lines, so they
/// must not contain those separators.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let valid = !username.is_empty()
        && !username
            .chars()
            .any(|c| c.is_whitespace() || c == ',' || c == ':');
    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidUsername)
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        validate_username(username)?;
        if password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }

        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(AuthError::UsernameTaken(username.to_string()));
        }
        users.insert(username.to_string(), password.to_string());
        info!("Registered user {}", username);
        Ok(())
    }

    pub async fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let users = self.users.read().await;
        match users.get(username) {
            Some(stored) if stored == password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}
