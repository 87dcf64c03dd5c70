//! In-process stand-in for the AI Studio REST API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde_json::{Value, json};

use aistudio::api::ApiClient;
use aistudio::auth::AuthMethod;
use aistudio::config::Settings;
use aistudio::consts::{TASK_ENTRY_TTL, task_response_key};
use aistudio::storage::Storage;

pub const STATIC_TOKEN: &str = "static-token";
pub const EMAIL: &str = "dev@example.com";
pub const PASSWORD: &str = "right-password";

/// A request the mock received, minus anything auth-related.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

#[derive(Default)]
pub struct MockState {
    pub requests: Mutex<Vec<Recorded>>,
    pub agents: Mutex<Vec<Value>>,
    pub models: Mutex<Vec<Value>>,
    /// Token the mock currently accepts in the `token` header.
    pub valid_token: Mutex<String>,
    pub logins: AtomicUsize,
    /// While set, `/auth/login` refuses every attempt.
    pub reject_logins: AtomicBool,
    /// Requests turned away for a missing or stale token.
    pub rejected: AtomicUsize,
    pub uploads: AtomicUsize,
    pub agent_lookups: AtomicUsize,
    pub slow_hits: AtomicUsize,
    /// How many `/slow` calls still stall before answering.
    pub slow_remaining: AtomicUsize,
    /// Overrides the `/files` response when set.
    pub upload_response: Mutex<Option<Value>>,
    /// When set, a chat turn's result is written here before the chat reply
    /// is sent, as a webhook that outruns the reply would.
    pub deliver_before_reply: Mutex<Option<Arc<dyn Storage>>>,
}

impl MockState {
    pub fn recorded(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    /// Invalidate the current session token, as if it expired.
    pub fn expire_token(&self) {
        *self.valid_token.lock().unwrap() = "expired".to_string();
    }

    fn record(&self, method: &str, path: &str, query: HashMap<String, String>, body: Value) {
        self.requests.lock().unwrap().push(Recorded {
            method: method.to_string(),
            path: path.to_string(),
            query,
            body,
        });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = self.valid_token.lock().unwrap().clone();
        let ok = headers
            .get("token")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|token| token == expected);
        if !ok {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }
}

pub struct MockStudio {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockStudio {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        *state.valid_token.lock().unwrap() = STATIC_TOKEN.to_string();

        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/data/agents", get(agents))
            .route("/data/models", get(models))
            .route("/data/tasks", post(create_task))
            .route("/data/tasks/{id}/chat", put(chat))
            .route("/files", post(upload))
            .route("/slow", get(slow))
            .route("/boom", get(boom))
            .route(
                "/echo",
                get(echo).post(echo).put(echo).patch(echo).delete(echo),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn add_agent(&self, agent: Value) {
        self.state.agents.lock().unwrap().push(agent);
    }

    pub fn add_model(&self, model: Value) {
        self.state.models.lock().unwrap().push(model);
    }

    pub fn api_token_settings(&self) -> Settings {
        Settings::new(
            self.base_url.clone(),
            AuthMethod::ApiToken(STATIC_TOKEN.into()),
        )
    }

    pub fn credentials_settings(&self) -> Settings {
        Settings::new(
            self.base_url.clone(),
            AuthMethod::Credentials {
                email: EMAIL.to_string(),
                password: PASSWORD.into(),
            },
        )
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.api_token_settings()).unwrap()
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
}

async fn login(State(state): State<Arc<MockState>>, body: axum::Json<Value>) -> Response {
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    if state.reject_logins.load(Ordering::SeqCst)
        || body["email"] != EMAIL
        || body["password"] != PASSWORD
    {
        return unauthorized();
    }
    let token = format!("session-{n}");
    *state.valid_token.lock().unwrap() = token.clone();
    axum::Json(json!({ "token": token })).into_response()
}

async fn agents(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.agent_lookups.fetch_add(1, Ordering::SeqCst);
    state.record("GET", "/data/agents", query.clone(), Value::Null);
    let items: Vec<Value> = state
        .agents
        .lock()
        .unwrap()
        .iter()
        .filter(|a| {
            Some(a["code"].as_str().unwrap_or_default()) == query.get("code").map(String::as_str)
                && Some(a["project"].as_str().unwrap_or_default())
                    == query.get("project.code").map(String::as_str)
        })
        .cloned()
        .collect();
    axum::Json(json!({ "items": items })).into_response()
}

async fn models(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.record("GET", "/data/models", query.clone(), Value::Null);
    let items: Vec<Value> = state
        .models
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m["code"].as_str() == query.get("code").map(String::as_str))
        .cloned()
        .collect();
    axum::Json(json!({ "items": items })).into_response()
}

async fn create_task(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: axum::Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let n = state.recorded("POST", "/data/tasks").len() + 1;
    state.record("POST", "/data/tasks", HashMap::new(), body.0);
    axum::Json(json!({ "id": format!("task-{n}") })).into_response()
}

async fn chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: axum::Json<Value>,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.record(
        "PUT",
        &format!("/data/tasks/{id}/chat"),
        HashMap::new(),
        body.0,
    );
    let early = state.deliver_before_reply.lock().unwrap().clone();
    if let Some(storage) = early {
        let result = json!({
            "taskId": id,
            "status": "success",
            "response": {"text": "early answer"}
        });
        storage
            .put(&task_response_key(&id), &result, TASK_ENTRY_TTL)
            .await
            .unwrap();
    }
    axum::Json(json!({ "id": id })).into_response()
}

async fn upload(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.uploads.fetch_add(1, Ordering::SeqCst);
    let text = String::from_utf8_lossy(&body);
    let file_name = text
        .split("filename=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or("unknown")
        .to_string();
    state.record(
        "POST",
        "/files",
        HashMap::new(),
        json!({ "fileName": file_name }),
    );
    let response = state
        .upload_response
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| json!({ "fileId": format!("remote-{file_name}") }));
    axum::Json(response).into_response()
}

async fn slow(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.slow_hits.fetch_add(1, Ordering::SeqCst);
    let stall = state
        .slow_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if stall {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    axum::Json(json!({ "ok": true })).into_response()
}

async fn boom(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.record("GET", "/boom", HashMap::new(), Value::Null);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn echo(
    State(state): State<Arc<MockState>>,
    method: axum::http::Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.record(method.as_str(), "/echo", query.clone(), body.clone());
    axum::Json(json!({
        "method": method.as_str(),
        "query": query,
        "extra": headers.get("x-extra").and_then(|v| v.to_str().ok()),
        "body": body,
    }))
    .into_response()
}
