//! HTTP client for the remote single-record-per-owner snapshot store.

use std::collections::BTreeSet;
use std::time::Duration;

use lexiread_core::types::{ContentRecord, Snapshot};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Fixed timeout for every remote call. A timeout is a transient failure
/// retried on the next natural cycle, never in a tight loop.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Remote store errors.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not authenticated - register this device first")]
    NotAuthenticated,
}

impl RemoteError {
    /// Transient failures are retried by the orchestrator's natural
    /// cadence; permanent ones are surfaced once.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout => true,
            RemoteError::Backend { status, .. } => *status >= 500,
            RemoteError::Parse(_) | RemoteError::NotAuthenticated => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

type Result<T> = std::result::Result<T, RemoteError>;

/// The owner's cloud record: a full snapshot of syncable entities plus a
/// last-write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub snapshot: Snapshot,
    pub updated_at: i64,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    snapshot: &'a Snapshot,
    /// Record keys explicitly deleted locally since the last push. The
    /// backend unions the records map by key, so omissions (evictions)
    /// never delete the remote copy; only this list prunes.
    removed_record_keys: &'a [String],
    updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct RecordKeysResponse {
    keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    device_id: String,
    token: String,
}

/// Client for the remote store. Cheap to clone; holds no mutable state.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(RemoteError::NotAuthenticated)
    }

    /// Check if the backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(err) => Err(RemoteError::from_reqwest(err)),
        }
    }

    /// Register this device; returns `(token, device_id)`.
    pub async fn register(&self, name: Option<&str>) -> Result<(String, String)> {
        let url = format!("{}/api/device/register", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&RegisterRequest { name })
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        let resp = Self::check_status(resp).await?;
        let body: RegisterResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok((body.token, body.device_id))
    }

    /// Fetch this owner's record, or `None` if no backup exists yet.
    pub async fn pull(&self) -> Result<Option<RemoteRecord>> {
        let url = format!("{}/api/sync/pull", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        let resp = Self::check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    /// Upsert this owner's record. Idempotent by owner id.
    pub async fn push(
        &self,
        snapshot: &Snapshot,
        removed_record_keys: &[String],
        updated_at: i64,
    ) -> Result<i64> {
        let url = format!("{}/api/sync/push", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.token()?)
            .json(&PushRequest {
                snapshot,
                removed_record_keys,
                updated_at,
            })
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        let resp = Self::check_status(resp).await?;
        let body: PushResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok(body.updated_at)
    }

    /// Enumerate the content-record keys the remote currently backs up.
    /// Gates eviction sweeps when no directory mirror is configured.
    pub async fn record_keys(&self) -> Result<BTreeSet<String>> {
        let url = format!("{}/api/sync/records", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        let resp = Self::check_status(resp).await?;
        let body: RecordKeysResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        Ok(body.keys.into_iter().collect())
    }

    /// Fetch one content record; the restore path's network fallback.
    pub async fn fetch_record(&self, key: &str) -> Result<Option<ContentRecord>> {
        let url = format!("{}/api/sync/records/{}", self.base_url, key);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RemoteError::NotAuthenticated);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(RemoteError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Network("refused".to_string()).is_transient());
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Backend {
            status: 503,
            message: String::new()
        }
        .is_transient());

        assert!(!RemoteError::Backend {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!RemoteError::NotAuthenticated.is_transient());
        assert!(!RemoteError::Parse("bad json".to_string()).is_transient());
    }

    #[test]
    fn unauthenticated_client_refuses_calls() {
        let client = RemoteClient::new("http://localhost:3000/", None);
        assert!(!client.is_authenticated());
        assert!(matches!(client.token(), Err(RemoteError::NotAuthenticated)));

        let client = client.with_token("tok".to_string());
        assert!(client.is_authenticated());
    }
}
