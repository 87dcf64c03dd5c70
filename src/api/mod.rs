//! HTTP client for the AI Studio REST API.
//!
//! Every call goes through [`ApiClient::request`], which resolves the URL
//! against the configured base, injects the `token` header and applies the
//! retry policy:
//!
//! - `401` with credential auth: renew the bearer token once and retry;
//! - timeout: retry once;
//! - anything else: fail with [`Error::Remote`].

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{self, AuthMethod, TokenCache};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::files::LocalFile;

const TOKEN_HEADER: &str = "token";

/// Extra query parameters and headers for a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What goes in the request body. Rebuilt on every attempt because
/// multipart forms cannot be cloned.
#[derive(Clone, Copy)]
enum Payload<'a> {
    Empty,
    Json(&'a Value),
    File(&'a LocalFile),
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    auth: AuthMethod,
    tokens: TokenCache,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth: settings.auth.clone(),
            tokens: TokenCache::new(),
        })
    }

    /// Send a request and decode the JSON response. Empty bodies decode to
    /// `Value::Null`; bodies that are not JSON come back as a string.
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let payload = body.map_or(Payload::Empty, Payload::Json);
        self.dispatch(method, target, payload, options).await
    }

    pub async fn get(&self, path: &str, options: &RequestOptions) -> Result<Value> {
        self.request(Method::GET, path, None, options).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PATCH, path, Some(body), &RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None, &RequestOptions::default())
            .await
    }

    pub async fn head(&self, path: &str) -> Result<Value> {
        self.request(Method::HEAD, path, None, &RequestOptions::default())
            .await
    }

    pub async fn options(&self, path: &str) -> Result<Value> {
        self.request(Method::OPTIONS, path, None, &RequestOptions::default())
            .await
    }

    /// `POST` a file as multipart field `file`, under the same auth and
    /// retry policy as [`request`](Self::request).
    pub async fn upload(&self, path: &str, file: &LocalFile) -> Result<Value> {
        self.dispatch(
            Method::POST,
            path,
            Payload::File(file),
            &RequestOptions::default(),
        )
        .await
    }

    async fn dispatch(
        &self,
        method: Method,
        target: &str,
        payload: Payload<'_>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let url = self.resolve_url(target);
        debug!(%method, %url, "sending AI Studio request");

        match self.send(&method, &url, payload, options).await {
            Err(Error::AuthExpired) if self.auth.is_credentials() => {
                debug!(%url, "token expired, renewing token");
                self.refresh_token().await?;
                self.send(&method, &url, payload, options)
                    .await
                    .map_err(Error::surfaced)
            }
            Err(Error::ConnectionTimeout(reason)) => {
                warn!(%method, %url, %reason, "connection timeout, retrying");
                self.send(&method, &url, payload, options)
                    .await
                    .map_err(Error::surfaced)
            }
            other => other.map_err(Error::surfaced),
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        payload: Payload<'_>,
        options: &RequestOptions,
    ) -> Result<Value> {
        let mut req = self.http.request(method.clone(), url);
        if !options.query.is_empty() {
            req = req.query(&options.query);
        }
        for (name, value) in &options.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(token) = self.current_token().await? {
            req = req.header(TOKEN_HEADER, token.expose_secret());
        }
        req = attach(req, payload)?;

        let resp = req.send().await.map_err(classify)?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::remote(Some(status.as_u16()), text));
        }

        let bytes = resp.bytes().await.map_err(classify)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }

    async fn current_token(&self) -> Result<Option<SecretString>> {
        match &self.auth {
            AuthMethod::ApiToken(token) => Ok(Some(token.clone())),
            AuthMethod::Credentials { .. } => {
                if let Some(token) = self.tokens.get().await {
                    return Ok(Some(token));
                }
                self.refresh_token().await.map(Some)
            }
        }
    }

    async fn refresh_token(&self) -> Result<SecretString> {
        let AuthMethod::Credentials { email, password } = &self.auth else {
            return Err(Error::Auth(
                "token refresh requires credentials authentication".to_string(),
            ));
        };
        // A rejected session must not be reused if logging in again fails.
        self.tokens.clear().await;
        let token = auth::login(&self.http, &self.base_url, email, password).await?;
        self.tokens.set(token.clone()).await;
        Ok(token)
    }

    fn resolve_url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else if target.starts_with('/') || target.is_empty() {
            format!("{}{}", self.base_url, target)
        } else {
            format!("{}/{}", self.base_url, target)
        }
    }
}

fn attach(req: RequestBuilder, payload: Payload<'_>) -> Result<RequestBuilder> {
    Ok(match payload {
        Payload::Empty => req,
        Payload::Json(body) => req.json(body),
        Payload::File(file) => {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.name.clone())
                .mime_str(&file.content_type)
                .map_err(|e| Error::Upload {
                    file_id: file.name.clone(),
                    reason: format!("invalid content type: {e}"),
                })?;
            req.multipart(Form::new().part("file", part))
        }
    })
}

fn classify(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::ConnectionTimeout(err.to_string())
    } else {
        Error::remote(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(&Settings::new(base_url, AuthMethod::ApiToken("t".into()))).unwrap()
    }

    #[test]
    fn relative_paths_join_base_url() {
        let api = client("https://studio.example/api/");
        assert_eq!(
            api.resolve_url("/data/tasks"),
            "https://studio.example/api/data/tasks"
        );
        assert_eq!(
            api.resolve_url("data/tasks"),
            "https://studio.example/api/data/tasks"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        let api = client("https://studio.example/api");
        assert_eq!(
            api.resolve_url("http://other.example/files/1"),
            "http://other.example/files/1"
        );
    }

    #[test]
    fn request_options_builder() {
        let options = RequestOptions::query([("code", "a")]).header("x-trace", "1");
        assert_eq!(options.query, vec![("code".to_string(), "a".to_string())]);
        assert_eq!(options.headers, vec![("x-trace".to_string(), "1".to_string())]);
    }
}
