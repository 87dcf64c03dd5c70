//! Client and webhook listener for the AI Studio agent-execution service.
//!
//! [`tasks::TaskService`] submits tasks and chat turns through
//! [`api::ApiClient`]; [`webhook::WebhookHandler`] receives completion
//! notifications, runs named callbacks from [`callbacks::CallbackRegistry`],
//! caches responses in [`storage::Storage`] and announces them on
//! [`events::EventBus`].

pub mod api;
pub mod auth;
pub mod banner;
pub mod callbacks;
pub mod config;
pub mod consts;
pub mod error;
pub mod events;
pub mod files;
pub mod spinner;
pub mod storage;
pub mod tasks;
pub mod utils;
pub mod webhook;

pub use error::{Error, Result};
