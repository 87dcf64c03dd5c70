//! Key-value configuration storage backed by SQLite, and the typed
//! [`Settings`] view the rest of the crate consumes.
//!
//! Shares a database with [`SqliteStorage`](crate::storage::sqlite::SqliteStorage).
//! Pass the same path to both.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use secrecy::SecretString;

use crate::auth::AuthMethod;
use crate::consts::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_WEBHOOK_PATH};
use crate::error::{Error, Result};

pub const KEY_BASE_URL: &str = "aiStudioBaseUrl";
pub const KEY_AUTH_METHOD: &str = "authenticationMethod";
pub const KEY_API_TOKEN: &str = "apiToken";
pub const KEY_EMAIL: &str = "email";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_CHECK_SIGNATURE: &str = "checkWebhooksSignature";
pub const KEY_SIGNING_SECRET: &str = "webhooksSigningSecret";
pub const KEY_WEBHOOK_PATH: &str = "webhookPath";
pub const KEY_REQUEST_TIMEOUT: &str = "requestTimeoutSecs";

/// Every key [`Settings::load`] understands, with its environment override.
pub const KNOWN_KEYS: &[(&str, &str)] = &[
    (KEY_BASE_URL, "AISTUDIO_BASE_URL"),
    (KEY_AUTH_METHOD, "AISTUDIO_AUTHENTICATION_METHOD"),
    (KEY_API_TOKEN, "AISTUDIO_API_TOKEN"),
    (KEY_EMAIL, "AISTUDIO_EMAIL"),
    (KEY_PASSWORD, "AISTUDIO_PASSWORD"),
    (KEY_CHECK_SIGNATURE, "AISTUDIO_CHECK_WEBHOOKS_SIGNATURE"),
    (KEY_SIGNING_SECRET, "AISTUDIO_WEBHOOKS_SIGNING_SECRET"),
    (KEY_WEBHOOK_PATH, "AISTUDIO_WEBHOOK_PATH"),
    (KEY_REQUEST_TIMEOUT, "AISTUDIO_REQUEST_TIMEOUT_SECS"),
];

/// String settings persisted in the `config` table.
pub struct Config {
    conn: Mutex<Connection>,
}

impl Config {
    /// Open the database at `path`, creating the `config` table on first use.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Stored value for `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Insert or replace `key`.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Delete `key`; missing keys are ignored.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(())
    }

    /// All stored entries, ordered by key.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key ASC")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resolved package configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub auth: AuthMethod,
    pub check_webhooks_signature: bool,
    pub webhooks_signing_secret: Option<SecretString>,
    pub webhook_path: String,
    pub request_timeout: Duration,
}

impl Settings {
    /// Settings for `base_url` with API-token auth and every other value at
    /// its default.
    pub fn new(base_url: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            check_webhooks_signature: true,
            webhooks_signing_secret: None,
            webhook_path: DEFAULT_WEBHOOK_PATH.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Load settings from the config store. Environment variables listed in
    /// [`KNOWN_KEYS`] take precedence over stored values.
    pub fn load(config: &Config) -> Result<Self> {
        Self::resolve(|key| {
            let env_var = KNOWN_KEYS
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, env)| *env);
            if let Some(env_var) = env_var
                && let Ok(value) = std::env::var(env_var)
                && !value.is_empty()
            {
                return Ok(Some(value));
            }
            config.get(key)
        })
    }

    fn resolve(lookup: impl Fn(&str) -> Result<Option<String>>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)?
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("missing required setting `{key}`")))
        };

        let base_url = required(KEY_BASE_URL)?.trim_end_matches('/').to_string();

        let auth = match lookup(KEY_AUTH_METHOD)?.as_deref() {
            None | Some("apiToken") => AuthMethod::ApiToken(required(KEY_API_TOKEN)?.into()),
            Some("credentials") => AuthMethod::Credentials {
                email: required(KEY_EMAIL)?,
                password: required(KEY_PASSWORD)?.into(),
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "unknown {KEY_AUTH_METHOD} `{other}` (expected apiToken or credentials)"
                )));
            }
        };

        let check_webhooks_signature = match lookup(KEY_CHECK_SIGNATURE)?.as_deref() {
            None => true,
            Some(v) => parse_bool(v)
                .ok_or_else(|| Error::Config(format!("{KEY_CHECK_SIGNATURE} must be a boolean")))?,
        };

        let webhook_path = match lookup(KEY_WEBHOOK_PATH)? {
            Some(path) if path.starts_with('/') => path,
            Some(path) => format!("/{path}"),
            None => DEFAULT_WEBHOOK_PATH.to_string(),
        };

        let request_timeout = match lookup(KEY_REQUEST_TIMEOUT)? {
            Some(secs) => Duration::from_secs(secs.parse().map_err(|_| {
                Error::Config(format!("{KEY_REQUEST_TIMEOUT} must be a whole number of seconds"))
            })?),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        Ok(Self {
            base_url,
            auth,
            check_webhooks_signature,
            webhooks_signing_secret: lookup(KEY_SIGNING_SECRET)?.map(SecretString::from),
            webhook_path,
            request_timeout,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
