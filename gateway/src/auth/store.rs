//! Credential storage: account records and the API key index.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::AccountRecord;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Owner of account records.
///
/// Implementations keep the username and API key indexes consistent with each
/// other: creating an account and rotating a key are single atomic steps.
pub trait CredentialStore: Send + Sync {
    /// Insert a new account, failing if the username is taken.
    fn create_account(&self, account: AccountRecord) -> Result<(), CredentialError>;

    fn find_by_key(&self, api_key: &str) -> Result<Option<AccountRecord>, CredentialError>;

    fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>, CredentialError>;

    /// Check `password` and swap the account's key for `new_key`.
    /// Returns the key that was replaced.
    fn rotate_key(
        &self,
        username: &str,
        password: &str,
        new_key: &str,
    ) -> Result<String, CredentialError>;
}

#[derive(Debug, Default)]
struct Accounts {
    by_username: HashMap<String, AccountRecord>,
    /// api key -> username
    by_key: HashMap<String, String>,
}

/// In-memory store. One lock covers both indexes.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: RwLock<Accounts>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn create_account(&self, account: AccountRecord) -> Result<(), CredentialError> {
        let mut accounts = self.accounts.write();
        if accounts.by_username.contains_key(&account.username) {
            return Err(CredentialError::DuplicateUsername);
        }
        accounts
            .by_key
            .insert(account.api_key.clone(), account.username.clone());
        accounts
            .by_username
            .insert(account.username.clone(), account);
        Ok(())
    }

    fn find_by_key(&self, api_key: &str) -> Result<Option<AccountRecord>, CredentialError> {
        let accounts = self.accounts.read();
        Ok(accounts
            .by_key
            .get(api_key)
            .and_then(|username| accounts.by_username.get(username))
            .cloned())
    }

    fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>, CredentialError> {
        Ok(self.accounts.read().by_username.get(username).cloned())
    }

    fn rotate_key(
        &self,
        username: &str,
        password: &str,
        new_key: &str,
    ) -> Result<String, CredentialError> {
        let mut guard = self.accounts.write();
        let accounts = &mut *guard;

        let account = accounts
            .by_username
            .get_mut(username)
            .filter(|a| a.verify_password(password))
            .ok_or(CredentialError::InvalidCredentials)?;

        let old_key = std::mem::replace(&mut account.api_key, new_key.to_string());
        accounts.by_key.remove(&old_key);
        accounts
            .by_key
            .insert(new_key.to_string(), username.to_string());
        Ok(old_key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::models::generate_api_key;

    fn alice(key: &str) -> AccountRecord {
        AccountRecord::new("alice", "alice@example.com", "pw", key.to_string(), Utc::now())
    }

    #[test]
    fn test_create_and_lookup() {
        let store = MemoryCredentialStore::new();
        store.create_account(alice("key-1")).unwrap();

        let by_key = store.find_by_key("key-1").unwrap().unwrap();
        assert_eq!(by_key.username, "alice");
        let by_name = store.find_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.api_key, "key-1");
        assert!(store.find_by_key("nope").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = MemoryCredentialStore::new();
        store.create_account(alice("key-1")).unwrap();
        assert_eq!(
            store.create_account(alice("key-2")),
            Err(CredentialError::DuplicateUsername)
        );
        assert!(store.find_by_key("key-2").unwrap().is_none());
    }

    #[test]
    fn test_rotate_key_swaps_index() {
        let store = MemoryCredentialStore::new();
        store.create_account(alice("key-1")).unwrap();

        let old = store.rotate_key("alice", "pw", "key-2").unwrap();
        assert_eq!(old, "key-1");
        assert!(store.find_by_key("key-1").unwrap().is_none());
        assert_eq!(
            store.find_by_key("key-2").unwrap().unwrap().username,
            "alice"
        );
    }

    #[test]
    fn test_rotate_key_wrong_password() {
        let store = MemoryCredentialStore::new();
        store.create_account(alice("key-1")).unwrap();

        assert_eq!(
            store.rotate_key("alice", "bad", "key-2"),
            Err(CredentialError::InvalidCredentials)
        );
        assert_eq!(
            store.rotate_key("bob", "pw", "key-2"),
            Err(CredentialError::InvalidCredentials)
        );
        assert!(store.find_by_key("key-1").unwrap().is_some());
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let store = Arc::new(MemoryCredentialStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.create_account(alice(&generate_api_key())))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_rotation_never_shows_both_or_neither() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.create_account(alice("key-0")).unwrap();

        let rotator = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..200 {
                    store
                        .rotate_key("alice", "pw", &format!("key-{}", i))
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            let account = store.find_by_username("alice").unwrap().unwrap();
            let current = store.find_by_key(&account.api_key).unwrap();
            // The key read a moment ago may already be rotated away, but a
            // lookup never resolves to a different account.
            if let Some(found) = current {
                assert_eq!(found.username, "alice");
            }
        }
        rotator.join().unwrap();

        let account = store.find_by_username("alice").unwrap().unwrap();
        assert_eq!(account.api_key, "key-199");
        assert!(store.find_by_key("key-198").unwrap().is_none());
    }
}
