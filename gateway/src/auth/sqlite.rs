use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::store::{CredentialError, CredentialStore};
use crate::models::AccountRecord;

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

const ACCOUNT_COLUMNS: &str = "account_id, username, email, password_hash, api_key, tier, \
                               max_requests_per_minute, created_at";

impl SqliteCredentialStore {
    pub fn new(database_url: &str) -> Result<Self, CredentialError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| CredentialError::Storage(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(storage)?;
        Self::init(conn, path)
    }

    /// Store that lives only as long as the connection.
    pub fn in_memory() -> Result<Self, CredentialError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, path: &str) -> Result<Self, CredentialError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                account_id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                api_key TEXT NOT NULL UNIQUE,
                tier TEXT NOT NULL,
                max_requests_per_minute INTEGER,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(storage)?;

        tracing::info!("Credential store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<AccountRecord>, CredentialError> {
        let conn = self.conn.lock().map_err(|e| CredentialError::Storage(e.to_string()))?;
        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE {} = ?1", ACCOUNT_COLUMNS, column),
            params![value],
            read_account,
        )
        .optional()
        .map_err(storage)
    }
}

fn storage(e: rusqlite::Error) -> CredentialError {
    CredentialError::Storage(e.to_string())
}

fn read_account(row: &Row<'_>) -> rusqlite::Result<AccountRecord> {
    let created_at: String = row.get(7)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(AccountRecord {
        account_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        api_key: row.get(4)?,
        tier: row.get(5)?,
        max_requests_per_minute: row.get(6)?,
        created_at,
    })
}

impl CredentialStore for SqliteCredentialStore {
    fn create_account(&self, account: AccountRecord) -> Result<(), CredentialError> {
        let conn = self.conn.lock().map_err(|e| CredentialError::Storage(e.to_string()))?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM accounts WHERE username = ?1)",
                params![account.username],
                |row| row.get(0),
            )
            .map_err(storage)?;
        if exists {
            return Err(CredentialError::DuplicateUsername);
        }

        conn.execute(
            &format!(
                "INSERT INTO accounts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                ACCOUNT_COLUMNS
            ),
            params![
                account.account_id,
                account.username,
                account.email,
                account.password_hash,
                account.api_key,
                account.tier,
                account.max_requests_per_minute,
                account.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => CredentialError::DuplicateUsername,
            _ => storage(e),
        })?;

        Ok(())
    }

    fn find_by_key(&self, api_key: &str) -> Result<Option<AccountRecord>, CredentialError> {
        self.find_one("api_key", api_key)
    }

    fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>, CredentialError> {
        self.find_one("username", username)
    }

    fn rotate_key(
        &self,
        username: &str,
        password: &str,
        new_key: &str,
    ) -> Result<String, CredentialError> {
        let mut conn = self.conn.lock().map_err(|e| CredentialError::Storage(e.to_string()))?;
        let tx = conn.transaction().map_err(storage)?;

        let account = tx
            .query_row(
                &format!("SELECT {} FROM accounts WHERE username = ?1", ACCOUNT_COLUMNS),
                params![username],
                read_account,
            )
            .optional()
            .map_err(storage)?
            .filter(|a| a.verify_password(password))
            .ok_or(CredentialError::InvalidCredentials)?;

        tx.execute(
            "UPDATE accounts SET api_key = ?1 WHERE username = ?2",
            params![new_key, username],
        )
        .map_err(storage)?;
        tx.commit().map_err(storage)?;

        Ok(account.api_key)
    }
}
