//! Task orchestration: submit tasks and chat turns, register callbacks, and
//! wait for results.
//!
//! Submission is fire-and-forget: `execute` and `chat` return the task id as
//! soon as AI Studio accepts the request. The outcome arrives later through
//! the webhook, which either runs the registered callback or leaves the
//! response in storage for [`TaskService::wait_to_be_ready`].

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, RequestOptions};
use crate::callbacks::CallbackSpec;
use crate::consts::{
    AGENT_CACHE_TTL, DEFAULT_WAIT_TIMEOUT, TASK_ENTRY_TTL, WAIT_POLL_INTERVAL, agent_cache_key,
    task_callback_data_key, task_callback_key, task_error_callback_key, task_response_key,
};
use crate::error::{Error, Result};
use crate::files::FileSource;
use crate::storage::Storage;
use crate::utils::upload_file;

pub use types::{Agent, AgentInput, ChatOptions, FileRef, InputKind, TaskInput, TaskResponse};

const AGENTS_PATH: &str = "/data/agents";
const MODELS_PATH: &str = "/data/models";
const TASKS_PATH: &str = "/data/tasks";

pub struct TaskService {
    api: Arc<ApiClient>,
    storage: Arc<dyn Storage>,
    files: Arc<dyn FileSource>,
}

impl TaskService {
    pub fn new(api: Arc<ApiClient>, storage: Arc<dyn Storage>, files: Arc<dyn FileSource>) -> Self {
        Self {
            api,
            storage,
            files,
        }
    }

    /// Start a task for `agent_code` in `project_code` and return its id.
    ///
    /// `inputs` maps input names to values; file inputs take a file id (or a
    /// list of them), which is uploaded before the task is created. Every
    /// input is validated against the agent before anything is uploaded.
    pub async fn execute(
        &self,
        project_code: &str,
        agent_code: &str,
        inputs: &Map<String, Value>,
        callback: Option<&CallbackSpec>,
    ) -> Result<String> {
        let agent = self.resolve_agent(project_code, agent_code).await?;

        let mut planned = Vec::with_capacity(inputs.len());
        for (name, value) in inputs {
            let definition = agent
                .input(name)
                .ok_or_else(|| Error::UnknownInput(name.clone()))?;
            let planned_input = match definition.kind {
                InputKind::File => PlannedInput::File(
                    name,
                    FileRef::from_value(value)
                        .ok_or_else(|| Error::InvalidInputType(name.clone()))?,
                ),
                InputKind::Text => PlannedInput::Value(name, value),
            };
            planned.push(planned_input);
        }

        let mut task_inputs = Vec::with_capacity(planned.len());
        for input in planned {
            task_inputs.push(match input {
                PlannedInput::Value(name, value) => TaskInput::Value {
                    name: name.clone(),
                    value: value.clone(),
                },
                PlannedInput::File(name, file) => TaskInput::File {
                    name: name.clone(),
                    file: self.upload_ref(&file).await?,
                },
            });
        }

        let body = json!({
            "agent": agent.id,
            "inputs": task_inputs,
        });
        let resp = self.api.post(TASKS_PATH, &body).await?;
        let task_id = resp
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::remote(None, format!("task creation returned no id: {resp}")))?
            .to_string();

        self.register_callback(&task_id, callback).await?;
        info!(%task_id, project_code, agent_code, "task submitted");
        Ok(task_id)
    }

    /// Send a chat message to an existing task and return the task id.
    ///
    /// Any previously cached response for the task is discarded and the
    /// callback registered before the message is sent, so a later
    /// [`wait_to_be_ready`](Self::wait_to_be_ready) sees this turn's result
    /// even when its webhook beats the reply.
    pub async fn chat(
        &self,
        task_id: &str,
        files: &[Value],
        message: &str,
        options: &ChatOptions,
        callback: Option<&CallbackSpec>,
    ) -> Result<String> {
        let file_ids = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                file.as_str()
                    .ok_or_else(|| Error::InvalidInputType(format!("files[{i}]")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut uploaded = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            uploaded.push(upload_file(&self.api, self.files.as_ref(), file_id).await?);
        }

        let model = match options.model.as_deref() {
            Some(code) => Some(self.resolve_model(code).await?),
            None => None,
        };

        let mut body = json!({
            "message": message,
            "files": uploaded,
        });
        if let Some(model) = model {
            body["model"] = Value::String(model);
        }

        // The webhook for this turn can land before the PUT returns.
        self.storage.remove(&task_response_key(task_id)).await?;
        self.register_callback(task_id, callback).await?;

        let resp = self
            .api
            .put(&format!("{TASKS_PATH}/{task_id}/chat"), &body)
            .await?;
        let chat_task_id = match resp.get("id").and_then(Value::as_str) {
            Some(id) if id != task_id => {
                self.register_callback(id, callback).await?;
                id.to_string()
            }
            _ => task_id.to_string(),
        };

        info!(task_id = %chat_task_id, "chat message submitted");
        Ok(chat_task_id)
    }

    /// Block until the webhook delivers the task's response, polling storage
    /// every 100 ms. `None` waits up to five minutes.
    ///
    /// The cached response is consumed, so each delivery is returned once.
    pub async fn wait_to_be_ready(
        &self,
        task_id: &str,
        timeout: Option<Duration>,
    ) -> Result<TaskResponse> {
        let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let key = task_response_key(task_id);
        let start = Instant::now();

        loop {
            if let Some(value) = self.storage.take(&key).await? {
                debug!(task_id, elapsed_ms = start.elapsed().as_millis() as u64, "task ready");
                return Ok(serde_json::from_value(value)?);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::Timeout {
                    task_id: task_id.to_string(),
                    timeout,
                });
            }
            sleep(WAIT_POLL_INTERVAL.min(timeout - elapsed)).await;
        }
    }

    /// [`execute`](Self::execute) followed by
    /// [`wait_to_be_ready`](Self::wait_to_be_ready).
    pub async fn execute_and_wait(
        &self,
        project_code: &str,
        agent_code: &str,
        inputs: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<TaskResponse> {
        let task_id = self
            .execute(project_code, agent_code, inputs, None)
            .await?;
        self.wait_to_be_ready(&task_id, timeout).await
    }

    /// [`chat`](Self::chat) followed by
    /// [`wait_to_be_ready`](Self::wait_to_be_ready).
    pub async fn chat_and_wait(
        &self,
        task_id: &str,
        files: &[Value],
        message: &str,
        options: &ChatOptions,
        timeout: Option<Duration>,
    ) -> Result<TaskResponse> {
        let task_id = self.chat(task_id, files, message, options, None).await?;
        self.wait_to_be_ready(&task_id, timeout).await
    }

    /// Look up an agent, reusing a definition fetched in the last five minutes.
    pub async fn resolve_agent(&self, project_code: &str, agent_code: &str) -> Result<Agent> {
        let key = agent_cache_key(project_code, agent_code);
        if let Some(cached) = self.storage.get(&key).await? {
            match serde_json::from_value(cached) {
                Ok(agent) => return Ok(agent),
                Err(e) => warn!(%key, error = %e, "discarding unreadable cached agent"),
            }
        }

        let options = RequestOptions::query([("project.code", project_code), ("code", agent_code)]);
        let resp = self.api.get(AGENTS_PATH, &options).await?;
        let agent: Agent = match first_item(&resp) {
            Some(item) => serde_json::from_value(item.clone())?,
            None => {
                return Err(Error::AgentNotFound {
                    project: project_code.to_string(),
                    agent: agent_code.to_string(),
                });
            }
        };

        self.storage
            .put(&key, &serde_json::to_value(&agent)?, AGENT_CACHE_TTL)
            .await?;
        Ok(agent)
    }

    async fn resolve_model(&self, code: &str) -> Result<String> {
        let resp = self
            .api
            .get(MODELS_PATH, &RequestOptions::query([("code", code)]))
            .await?;
        first_item(&resp)
            .and_then(|model| model.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::ModelNotFound(code.to_string()))
    }

    async fn upload_ref(&self, file: &FileRef) -> Result<FileRef> {
        let files = self.files.as_ref();
        Ok(match file {
            FileRef::One(id) => FileRef::One(upload_file(&self.api, files, id).await?),
            FileRef::Many(ids) => {
                let mut uploaded = Vec::with_capacity(ids.len());
                for id in ids {
                    uploaded.push(upload_file(&self.api, files, id).await?);
                }
                FileRef::Many(uploaded)
            }
        })
    }

    /// Store a callback registration for `task_id`, replacing any previous one.
    async fn register_callback(&self, task_id: &str, callback: Option<&CallbackSpec>) -> Result<()> {
        let Some(spec) = callback else {
            return Ok(());
        };

        self.storage
            .put(
                &task_callback_key(task_id),
                &Value::String(spec.handler.clone()),
                TASK_ENTRY_TTL,
            )
            .await?;

        let error_key = task_error_callback_key(task_id);
        match &spec.on_error {
            Some(handler) => {
                self.storage
                    .put(&error_key, &Value::String(handler.clone()), TASK_ENTRY_TTL)
                    .await?
            }
            None => self.storage.remove(&error_key).await?,
        }

        let data_key = task_callback_data_key(task_id);
        match &spec.data {
            Some(data) => self.storage.put(&data_key, data, TASK_ENTRY_TTL).await?,
            None => self.storage.remove(&data_key).await?,
        }

        debug!(task_id, handler = %spec.handler, "callback registered");
        Ok(())
    }
}

enum PlannedInput<'a> {
    Value(&'a String, &'a Value),
    File(&'a String, FileRef),
}

fn first_item(resp: &Value) -> Option<&Value> {
    resp.get("items").and_then(Value::as_array)?.first()
}
