use chrono::{DateTime, Utc};
use relay_common::protocol::{ApiKeyView, UserView};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Tier assigned to self-registered accounts.
pub const DEFAULT_TIER: &str = "free";

/// Account created by `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Stable identifier, never rotated
    pub account_id: String,
    /// Unique login name
    pub username: String,
    pub email: String,
    /// `salt$hex(sha256(salt || password))`
    pub password_hash: String,
    /// Current credential; unique across accounts
    pub api_key: String,
    pub tier: String,
    /// Per-account quota; the configured default applies when unset
    pub max_requests_per_minute: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn new(
        username: &str,
        email: &str,
        password: &str,
        api_key: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        Self {
            account_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&salt, password),
            api_key,
            tier: DEFAULT_TIER.to_string(),
            max_requests_per_minute: None,
            created_at,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        match self.password_hash.split_once('$') {
            Some((salt, _)) => hash_password(salt, password) == self.password_hash,
            None => false,
        }
    }

    pub fn user_view(&self) -> UserView {
        UserView {
            id: Some(self.account_id.clone()),
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: Some(self.created_at),
        }
    }

    pub fn key_view(&self) -> ApiKeyView {
        ApiKeyView {
            key: Some(self.api_key.clone()),
            tier: self.tier.clone(),
            active: Some(true),
            max_requests_per_minute: self.max_requests_per_minute,
            created_at: Some(self.created_at),
        }
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{}${}", salt, hex::encode(hasher.finalize()))
}

/// Fresh opaque API key.
pub fn generate_api_key() -> String {
    Uuid::new_v4().to_string()
}
