//! Expiring key-value storage shared by task submitters and the webhook
//! listener.
//!
//! Every entry belonging to a task is keyed by its task id, so independent
//! tasks never contend for the same rows. [`Storage::take`] is the only way
//! to consume an entry: it reads and deletes in one step, which keeps a
//! registration from being delivered twice.

pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a live entry without consuming it.
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    /// Insert or replace an entry that expires after `ttl`.
    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Atomically read and delete an entry. Expired entries yield `None`.
    async fn take(&self, key: &str) -> Result<Option<Value>>;
}
