use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};

const LOGIN_PATH: &str = "/auth/login";

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Exchange email and password for a bearer token.
pub async fn login(
    client: &Client,
    base_url: &str,
    email: &str,
    password: &SecretString,
) -> Result<SecretString> {
    let body = serde_json::json!({
        "email": email,
        "password": password.expose_secret(),
    });

    let resp = client
        .post(format!("{base_url}{LOGIN_PATH}"))
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Auth(format!("login request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::Auth(format!("login rejected ({status}): {text}")));
    }

    let data: LoginResponse = resp
        .json()
        .await
        .map_err(|e| Error::Auth(format!("invalid login response: {e}")))?;

    data.token
        .filter(|t| !t.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| Error::Auth("login response has no token".to_string()))
}
