//! Webhook secret verification and file upload.

use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::files::FileSource;

const FILES_PATH: &str = "/files";

/// Check the `AI-Studio-Webhook-Secret` header value against configuration.
///
/// With verification disabled every call succeeds. Otherwise the header must
/// be present and equal to the configured secret.
pub fn verify_webhook_secret(settings: &Settings, header: Option<&str>) -> bool {
    if !settings.check_webhooks_signature {
        warn!("webhook signature verification is disabled");
        return true;
    }
    let Some(expected) = settings.webhooks_signing_secret.as_ref() else {
        warn!("webhook signature verification is enabled but no signing secret is configured");
        return false;
    };
    match header {
        Some(received) => received == expected.expose_secret(),
        None => false,
    }
}

/// Upload a local file to AI Studio and return the remote file id.
pub async fn upload_file(api: &ApiClient, files: &dyn FileSource, file_id: &str) -> Result<String> {
    let file = files.open(file_id).await?;
    debug!(file_id, name = %file.name, size = file.bytes.len(), "uploading file");

    let resp = api.upload(FILES_PATH, &file).await?;
    match resp.get("fileId").and_then(Value::as_str) {
        Some(remote_id) if !remote_id.is_empty() => Ok(remote_id.to_string()),
        _ => Err(Error::Upload {
            file_id: file_id.to_string(),
            reason: format!("response has no fileId: {resp}"),
        }),
    }
}
