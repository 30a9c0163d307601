//! One-shot retrieval of the initial session state

use super::errors::LoadError;
use super::types::{Credential, SessionSnapshot};
use crate::config::ServerConfig;
use crate::metrics::{self, SNAPSHOT_FAILURES, SNAPSHOT_LOADS};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Path of the snapshot resource below the server base URL
pub const SNAPSHOT_PATH: &str = "/api/v1/data";

/// Fetches the bulk state a session starts from. Called once per session;
/// retrying is the caller's decision.
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    async fn load(&self, credential: Option<&Credential>) -> Result<SessionSnapshot, LoadError>;
}

/// Loads the snapshot over HTTP with a bearer token
#[derive(Debug, Clone)]
pub struct HttpSnapshotLoader {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotLoader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Transport(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), SNAPSHOT_PATH),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, LoadError> {
        Self::new(&config.http_url, config.request_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self, credential: Option<&Credential>) -> Result<SessionSnapshot, LoadError> {
        let credential = credential
            .filter(|c| !c.token.trim().is_empty())
            .ok_or_else(|| LoadError::Auth("no credential".to_string()))?;

        debug!(url = %self.url, username = %credential.username, "Requesting snapshot");
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&credential.token)
            .send()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(LoadError::Auth(format!("server answered {}", response.status())))
            }
            status if !status.is_success() => {
                Err(LoadError::Transport(format!("server answered {}", status)))
            }
            _ => response
                .json::<SessionSnapshot>()
                .await
                .map_err(|e| LoadError::Transport(format!("invalid snapshot body: {}", e))),
        }
    }
}

#[async_trait]
impl SnapshotLoader for HttpSnapshotLoader {
    async fn load(&self, credential: Option<&Credential>) -> Result<SessionSnapshot, LoadError> {
        match self.fetch(credential).await {
            Ok(snapshot) => {
                info!(
                    channels = snapshot.channels.len(),
                    messages = snapshot.messages.len(),
                    "Snapshot loaded"
                );
                metrics::record(SNAPSHOT_LOADS);
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Snapshot load failed");
                metrics::record(SNAPSHOT_FAILURES);
                Err(e)
            }
        }
    }
}
