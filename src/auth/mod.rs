//! How requests to AI Studio are authenticated.
//!
//! Two modes are supported: a static API token sent on every request, or an
//! email/password pair exchanged for a bearer token that is cached for the
//! lifetime of the process and renewed when the service reports it expired.

pub mod login;

use secrecy::SecretString;
use tokio::sync::RwLock;

pub use login::login;

#[derive(Debug, Clone)]
pub enum AuthMethod {
    ApiToken(SecretString),
    Credentials {
        email: String,
        password: SecretString,
    },
}

impl AuthMethod {
    pub fn is_credentials(&self) -> bool {
        matches!(self, Self::Credentials { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ApiToken(_) => "apiToken",
            Self::Credentials { .. } => "credentials",
        }
    }
}

/// Process-lifetime bearer token obtained through [`login`].
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<SecretString>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<SecretString> {
        self.token.read().await.clone()
    }

    pub async fn set(&self, token: SecretString) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }
}
