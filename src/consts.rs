//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");

/// Default timeout applied to every outbound AI Studio request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How long callback registrations and task responses survive in storage.
pub const TASK_ENTRY_TTL: Duration = Duration::from_secs(10 * 60);

/// How long a resolved agent definition is reused before asking the API again.
pub const AGENT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default bound for [`TaskService::wait_to_be_ready`](crate::tasks::TaskService::wait_to_be_ready).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Interval between response-cache checks while waiting on a task.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Route the webhook listener binds to when none is configured.
pub const DEFAULT_WEBHOOK_PATH: &str = "/aistudio";

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "AI-Studio-Webhook-Secret";

/// Name of the event emitted for every accepted webhook.
pub const WEBHOOK_EVENT: &str = "aistudio:webhook";

/// Default database path: `~/.aistudio/aistudio.db`.
/// Single DB for config and task storage.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".aistudio")
        .join("aistudio.db")
}

pub fn task_callback_key(task_id: &str) -> String {
    format!("aistudio_task_callback_{task_id}")
}

pub fn task_error_callback_key(task_id: &str) -> String {
    format!("aistudio_task_error_callback_{task_id}")
}

pub fn task_callback_data_key(task_id: &str) -> String {
    format!("aistudio_task_callback_data_{task_id}")
}

pub fn task_response_key(task_id: &str) -> String {
    format!("aistudio_task_response_{task_id}")
}

pub fn agent_cache_key(project: &str, agent: &str) -> String {
    format!("aistudio_agent_{project}_{agent}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consts_are_non_empty() {
        assert!(!AUTHOR.is_empty());
        assert!(!HOMEPAGE.is_empty());
        assert!(!DEFAULT_WEBHOOK_PATH.is_empty());
    }

    #[test]
    fn default_db_path_ends_with_db_file() {
        let path = default_db_path();
        assert!(path.ends_with(".aistudio/aistudio.db"));
    }

    #[test]
    fn task_keys_are_distinct() {
        let keys = [
            task_callback_key("t1"),
            task_error_callback_key("t1"),
            task_callback_data_key("t1"),
            task_response_key("t1"),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn task_keys_are_scoped_by_id() {
        assert_ne!(task_response_key("a"), task_response_key("b"));
        assert_eq!(task_response_key("abc"), "aistudio_task_response_abc");
    }

    #[test]
    fn agent_key_includes_project_and_code() {
        assert_eq!(agent_cache_key("proj1", "agentA"), "aistudio_agent_proj1_agentA");
    }
}
