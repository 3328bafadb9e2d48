//! Account registration, API-key validation, admission and usage accounting.
//!
//! [`AuthGateway`] is the auth worker's logic. It never fails on the read
//! paths: `validate` fails closed, `check_rate_limit` fails open, and
//! `stats`, `profile` and `usage_summary` fail closed to zeroed or `Unknown`
//! values. Those outcomes are typed so callers can tell them apart.

pub mod remote;
pub mod sqlite;
pub mod store;
pub mod worker;

pub use remote::{AuthCallError, AuthClient};
pub use sqlite::SqliteCredentialStore;
pub use store::{CredentialError, CredentialStore, MemoryCredentialStore};
pub use worker::AuthWorker;

use std::sync::Arc;

use relay_common::protocol::{UsageSummary, UsageTotals};
use relay_common::{Profile, UsageStats};

use crate::clock::Clock;
use crate::limiter::RateLimiter;
use crate::models::{generate_api_key, AccountRecord};
use crate::usage::{UsageError, UsageRecorder};

/// Result of `validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid { account_id: String },
    Invalid { reason: String },
}

impl ValidationOutcome {
    fn invalid(reason: &str) -> Self {
        ValidationOutcome::Invalid {
            reason: reason.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
    /// The check itself failed; the request is let through.
    FailedOpen { reason: String },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Denied)
    }
}

pub struct AuthGateway {
    credentials: Arc<dyn CredentialStore>,
    limiter: Arc<dyn RateLimiter>,
    usage: Arc<dyn UsageRecorder>,
    clock: Arc<dyn Clock>,
    default_max_requests: u32,
}

impl AuthGateway {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        limiter: Arc<dyn RateLimiter>,
        usage: Arc<dyn UsageRecorder>,
        clock: Arc<dyn Clock>,
        default_max_requests: u32,
    ) -> Self {
        Self {
            credentials,
            limiter,
            usage,
            clock,
            default_max_requests,
        }
    }

    /// Create an account and its zeroed usage record; returns the API key.
    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<String, CredentialError> {
        if username.is_empty() {
            return Err(CredentialError::MissingField("Username"));
        }
        if email.is_empty() {
            return Err(CredentialError::MissingField("Email"));
        }
        if password.is_empty() {
            return Err(CredentialError::MissingField("Password"));
        }

        let api_key = generate_api_key();
        let account = AccountRecord::new(username, email, password, api_key.clone(), self.clock.now());
        self.credentials.create_account(account)?;
        self.usage.open(&api_key);

        tracing::info!(username = %username, "User registered");
        Ok(api_key)
    }

    pub fn validate(&self, api_key: Option<&str>) -> ValidationOutcome {
        let api_key = match api_key {
            Some(k) if !k.is_empty() => k,
            _ => return ValidationOutcome::invalid("API key is required"),
        };

        match self.credentials.find_by_key(api_key) {
            Ok(Some(account)) => ValidationOutcome::Valid {
                account_id: account.account_id,
            },
            Ok(None) => ValidationOutcome::invalid("Invalid API key"),
            Err(e) => {
                tracing::error!("Validation error: {}", e);
                ValidationOutcome::invalid("Validation error")
            }
        }
    }

    /// Replace the account's key. The old key stops validating in the same
    /// step the new one starts; usage history follows the account.
    pub fn rotate_key(&self, username: &str, password: &str) -> Result<String, CredentialError> {
        let new_key = generate_api_key();
        let old_key = self.credentials.rotate_key(username, password, &new_key)?;
        self.usage.rekey(&old_key, &new_key);

        tracing::info!(username = %username, "API key rotated");
        Ok(new_key)
    }

    pub fn check_rate_limit(&self, api_key: &str) -> Admission {
        let max = match self.credentials.find_by_key(api_key) {
            Ok(account) => account
                .and_then(|a| a.max_requests_per_minute)
                .unwrap_or(self.default_max_requests),
            Err(e) => return Self::fail_open(e.to_string()),
        };

        match self.limiter.check(api_key, max, self.clock.now()) {
            Ok(true) => Admission::Allowed,
            Ok(false) => Admission::Denied,
            Err(e) => Self::fail_open(e.to_string()),
        }
    }

    fn fail_open(reason: String) -> Admission {
        tracing::warn!("Rate limit check failed, allowing request: {}", reason);
        Admission::FailedOpen { reason }
    }

    /// Counters are in memory while accounts may be persisted, so a known
    /// account without a record (after a restart, or a key rotated but not
    /// yet rekeyed) gets one opened on first use.
    pub fn track_usage(&self, api_key: &str, tokens: u64, model: &str) -> Result<(), UsageError> {
        let now = self.clock.now();
        match self.usage.record(api_key, tokens, model, now) {
            Err(UsageError::UnknownKey(_)) if self.is_known_key(api_key) => {
                tracing::debug!("Opening usage record for persisted account");
                self.usage.open(api_key);
                self.usage.record(api_key, tokens, model, now)
            }
            result => result,
        }
    }

    fn is_known_key(&self, api_key: &str) -> bool {
        match self.credentials.find_by_key(api_key) {
            Ok(account) => account.is_some(),
            Err(e) => {
                tracing::error!("Account lookup for usage failed: {}", e);
                false
            }
        }
    }

    pub fn stats(&self, api_key: &str) -> UsageStats {
        self.usage.snapshot(api_key).unwrap_or_default()
    }

    pub fn profile(&self, api_key: &str) -> Profile {
        match self.credentials.find_by_key(api_key) {
            Ok(Some(account)) => Profile {
                user: account.user_view(),
                api_key: account.key_view(),
                usage: self.stats(api_key),
            },
            Ok(None) => {
                tracing::warn!("Profile requested for unknown API key");
                Profile::unknown()
            }
            Err(e) => {
                tracing::error!("Failed to get user profile: {}", e);
                Profile::unknown()
            }
        }
    }

    pub fn usage_summary(&self, api_key: &str) -> UsageSummary {
        let account = match self.credentials.find_by_key(api_key) {
            Ok(Some(account)) => account,
            Ok(None) => return UsageSummary::unknown("Invalid API key"),
            Err(e) => {
                tracing::error!("Get usage error: {}", e);
                return UsageSummary::unknown(e.to_string());
            }
        };

        let stats = self.stats(api_key);
        UsageSummary {
            error: None,
            username: account.username,
            email: account.email,
            created_at: account.created_at,
            usage: UsageTotals {
                total_requests: stats.total_requests,
                total_tokens_used: stats.total_tokens,
                last_request: stats.request_history.last().map(|h| h.timestamp),
            },
        }
    }

    /// Drop rate-limit windows with no recent requests.
    pub fn evict_idle(&self) -> usize {
        self.limiter.evict_idle(self.clock.now())
    }
}
