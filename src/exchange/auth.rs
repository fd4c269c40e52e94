use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;

/// Supplies short-lived bearer tokens for private REST calls and the user socket
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// A pre-built token handed in through configuration
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("configured", &!self.token.is_empty())
            .finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(OrchestratorError::Config(
                "no bearer token configured".to_string(),
            ));
        }
        Ok(self.token.clone())
    }
}
