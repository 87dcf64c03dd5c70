//! Incoming AI Studio webhooks.
//!
//! A `taskReady` delivery moves a task from submitted to ready. Handling it
//! runs three independent steps, none of which may stop the next:
//!
//! 1. consume the callback registration and run the named handler;
//! 2. store the response for anyone blocked in `wait_to_be_ready`;
//! 3. emit `aistudio:webhook` on the event bus.

pub mod server;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::callbacks::CallbackRegistry;
use crate::config::Settings;
use crate::consts::{
    TASK_ENTRY_TTL, task_callback_data_key, task_callback_key, task_error_callback_key,
    task_response_key,
};
use crate::error::Result;
use crate::events::{Event, EventBus, WebhookEvent};
use crate::storage::Storage;
use crate::tasks::TaskResponse;
use crate::utils::verify_webhook_secret;

pub const TASK_READY: &str = "taskReady";

/// Body of a webhook call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub response: Option<Value>,
    pub errors: Option<Value>,
}

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Secret verification failed; nothing was touched.
    Rejected,
    /// A task reached its final state.
    TaskReady {
        task_id: String,
        callback_executed: bool,
    },
    /// Some other event, forwarded to the bus only.
    Forwarded,
}

pub struct WebhookHandler {
    settings: Settings,
    storage: Arc<dyn Storage>,
    callbacks: Arc<CallbackRegistry>,
    events: Arc<EventBus>,
}

impl WebhookHandler {
    pub fn new(
        settings: Settings,
        storage: Arc<dyn Storage>,
        callbacks: Arc<CallbackRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            storage,
            callbacks,
            events,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process one delivery. `secret` is the value of the
    /// `AI-Studio-Webhook-Secret` header, if present; `body` is the raw JSON.
    ///
    /// Only a failure to cache the response surfaces as an error, and only
    /// after the event has been emitted. Callback and registration failures
    /// are logged and swallowed.
    pub async fn handle(&self, secret: Option<&str>, body: Value) -> Result<WebhookOutcome> {
        if !verify_webhook_secret(&self.settings, secret) {
            warn!("invalid webhook secret, ignoring delivery");
            return Ok(WebhookOutcome::Rejected);
        }

        let payload: WebhookPayload = match serde_json::from_value(body.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "webhook body is not a task event");
                self.events.emit(Event::Webhook(WebhookEvent::new(body, false)));
                return Ok(WebhookOutcome::Forwarded);
            }
        };

        let task_id = match (payload.kind.as_str(), payload.task_id.as_deref()) {
            (TASK_READY, Some(task_id)) => task_id.to_string(),
            (kind, task_id) => {
                debug!(kind, ?task_id, "forwarding webhook without task state change");
                self.events.emit(Event::Webhook(WebhookEvent::new(body, false)));
                return Ok(WebhookOutcome::Forwarded);
            }
        };

        let response = TaskResponse {
            task_id: task_id.clone(),
            status: payload.status.unwrap_or_default(),
            response: payload.response,
            errors: payload.errors,
        };

        let callback_executed = self.run_callback(&response).await;

        let cached = self.cache_response(&response).await;
        if let Err(e) = &cached {
            error!(%task_id, error = %e, "failed to cache task response");
        }

        self.events
            .emit(Event::Webhook(WebhookEvent::new(body, callback_executed)));

        cached?;
        info!(%task_id, status = %response.status, callback_executed, "task ready");
        Ok(WebhookOutcome::TaskReady {
            task_id,
            callback_executed,
        })
    }

    async fn cache_response(&self, response: &TaskResponse) -> Result<()> {
        let value = serde_json::to_value(response)?;
        self.storage
            .put(&task_response_key(&response.task_id), &value, TASK_ENTRY_TTL)
            .await
    }

    /// Consume the task's callback registration and run the matching
    /// handler. Returns whether a handler was found and invoked.
    async fn run_callback(&self, response: &TaskResponse) -> bool {
        let task_id = response.task_id.as_str();
        let mut taken: HashMap<&str, Value> = HashMap::new();
        for (slot, key) in [
            ("handler", task_callback_key(task_id)),
            ("on_error", task_error_callback_key(task_id)),
            ("data", task_callback_data_key(task_id)),
        ] {
            match self.storage.take(&key).await {
                Ok(Some(value)) => {
                    taken.insert(slot, value);
                }
                Ok(None) => {}
                Err(e) => error!(task_id, %key, error = %e, "failed to consume callback entry"),
            }
        }

        let handler_name = |slot: &str| taken.get(slot).and_then(Value::as_str);
        let name = if response.is_error() {
            handler_name("on_error").or_else(|| handler_name("handler"))
        } else {
            handler_name("handler")
        };
        let Some(name) = name else {
            return false;
        };

        debug!(task_id, handler = name, "running task callback");
        let data = taken.get("data").cloned();
        match self
            .callbacks
            .invoke(name, task_id, response.payload(), data)
            .await
        {
            None => {
                warn!(task_id, handler = name, "no callback registered under this name");
                return false;
            }
            Some(Ok(())) => {}
            Some(Err(e)) => error!(task_id, handler = name, error = %e, "task callback failed"),
        }
        true
    }
}
