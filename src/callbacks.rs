//! Named task callbacks.
//!
//! Submitting a task with a callback stores only the handler's name (plus
//! optional JSON data) next to the task id. When the webhook for that task
//! arrives, the name is looked up here and the handler runs in the process
//! that received the webhook.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

pub const LOG_CALLBACK: &str = "log";

/// Something to run when a task finishes.
#[async_trait]
pub trait TaskCallback: Send + Sync {
    /// `payload` is the task response on success, or its errors on failure.
    async fn call(&self, task_id: &str, payload: &Value, data: Option<&Value>) -> Result<()>;
}

#[async_trait]
impl<F> TaskCallback for F
where
    F: Fn(&str, &Value, Option<&Value>) -> Result<()> + Send + Sync,
{
    async fn call(&self, task_id: &str, payload: &Value, data: Option<&Value>) -> Result<()> {
        self(task_id, payload, data)
    }
}

/// Writes the task outcome to the log. Registered as `log` by the listener.
pub struct LogCallback;

#[async_trait]
impl TaskCallback for LogCallback {
    async fn call(&self, task_id: &str, payload: &Value, data: Option<&Value>) -> Result<()> {
        tracing::info!(task_id, %payload, data = ?data, "task ready");
        Ok(())
    }
}

/// Callback registration attached to a task submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackSpec {
    /// Handler invoked when the task succeeds, and on failure when no
    /// `on_error` handler is given.
    pub handler: String,
    pub on_error: Option<String>,
    pub data: Option<Value>,
}

impl CallbackSpec {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            on_error: None,
            data: None,
        }
    }

    pub fn on_error(mut self, handler: impl Into<String>) -> Self {
        self.on_error = Some(handler.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Handlers available to incoming webhooks, keyed by name.
pub struct CallbackRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskCallback>>>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn TaskCallback>) {
        self.handlers.write().await.insert(name.into(), handler);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn TaskCallback>> {
        self.handlers.read().await.get(name).cloned()
    }

    /// Run the handler registered as `name`. Returns `None` when nothing is
    /// registered under that name.
    ///
    /// The handler runs on its own task, so a panic comes back as an error
    /// instead of unwinding into the caller.
    pub async fn invoke(
        &self,
        name: &str,
        task_id: &str,
        payload: Value,
        data: Option<Value>,
    ) -> Option<Result<()>> {
        let handler = self.get(name).await?;
        let task_id = task_id.to_string();
        let run = tokio::spawn(async move { handler.call(&task_id, &payload, data.as_ref()).await });
        Some(match run.await {
            Ok(result) => result,
            Err(e) => Err(anyhow!("callback `{name}` panicked: {e}")),
        })
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
