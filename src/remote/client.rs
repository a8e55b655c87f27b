//! HTTP client for the diet backend.

use reqwest::StatusCode;
use std::time::Duration;

use super::{RemoteDietRecord, RemoteError, RemoteStore};
use crate::config::SyncConfig;
use crate::models::{DietRecord, RemoteDiet, RemoteStamp};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to `dietsync-server` (or any backend with the same routes):
/// `GET /diets/{user_id}` and `PUT /diets/{user_id}`.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    server_url: String,
    api_key: String,
}

impl HttpRemoteClient {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Returns `None` if sync is not configured.
    pub fn from_config(config: &SyncConfig) -> Option<Self> {
        config
            .endpoint()
            .map(|(url, key)| Self::new(url, key.expose()))
    }

    fn diet_url(&self, user_id: &str) -> String {
        format!(
            "{}/diets/{}",
            self.server_url,
            urlencoding::encode(user_id)
        )
    }

    /// Checks `GET /health`.
    pub async fn check_server(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.server_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

impl RemoteStore for HttpRemoteClient {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteDiet>, RemoteError> {
        let response = self
            .http
            .get(self.diet_url(user_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let wire: RemoteDietRecord = parse_response(response).await?;
        Ok(Some(wire.into()))
    }

    async fn push(&self, user_id: &str, record: &DietRecord) -> Result<RemoteStamp, RemoteError> {
        let response = self
            .http
            .put(self.diet_url(user_id))
            .bearer_auth(&self.api_key)
            .json(record)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        let wire: RemoteDietRecord = parse_response(response).await?;
        Ok(wire.updated_at)
    }
}

async fn parse_response(response: reqwest::Response) -> Result<RemoteDietRecord, RemoteError> {
    let status = response.status();

    if status.is_server_error() {
        return Err(RemoteError::Unavailable(format!("server error {}", status)));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}
