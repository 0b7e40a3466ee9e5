//! HTTP implementation of [`RowStore`] and [`BlobStore`].
//!
//! Speaks the REST dialect of a hosted Postgres + object storage backend:
//!
//! | Operation | Request |
//! |---|---|
//! | select | `GET /rest/v1/{table}?col=eq.v&order=col.desc&limit=n` |
//! | insert | `POST /rest/v1/{table}` with `Prefer: return=representation` |
//! | update | `PATCH /rest/v1/{table}?col=eq.v` |
//! | delete | `DELETE /rest/v1/{table}?col=eq.v` |
//! | upload | `POST /storage/v1/object/{bucket}/{path}` with `x-upsert` |
//! | public URL | `{base}/storage/v1/object/public/{bucket}/{path}` (computed) |
//!
//! Every request carries the API key both as `apikey` and as a bearer token.
//! Error bodies are JSON objects whose `message` field is surfaced as the
//! backend message.

use super::{BlobStore, BlobUpload, Filter, Query, RowStore};
use crate::config::StoreConfig;
use crate::error::{FolioError, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// REST client for the hosted backend.
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, FolioError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("folio-kit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FolioError::InvalidConfig(format!("Could not build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            bucket: config.bucket.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = self.authorized(req).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Transport(format!("request timed out after {}s", self.timeout_secs))
            } else {
                StoreError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status.as_u16(), &body))
    }
}

/// Map an error response to [`StoreError`], keeping the backend's message.
fn error_from_body(status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty());
    match message {
        Some(message) => StoreError::Rejected { status, message },
        None => StoreError::Status { status },
    }
}

/// PostgREST query parameters for a filter list.
fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| (f.column.clone(), format!("eq.{}", scalar_text(&f.value))))
        .collect()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

async fn json_rows(response: reqwest::Response) -> Result<Vec<Value>, StoreError> {
    let body = response
        .text()
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&body).map_err(|e| StoreError::Decode(e.to_string()))? {
        Value::Array(rows) => Ok(rows),
        other => Err(StoreError::Decode(format!("expected a JSON array, got {}", other))),
    }
}

#[async_trait]
impl RowStore for RestStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        debug!("GET {} ({} filters)", table, query.filters.len());
        let req = self.client.get(self.rest_url(table)).query(&query_params(query));
        json_rows(self.send(req).await?).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        debug!("POST {} ({} rows)", table, rows.len());
        let req = self
            .client
            .post(self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(&rows);
        json_rows(self.send(req).await?).await
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> Result<(), StoreError> {
        debug!("PATCH {} ({} filters)", table, filters.len());
        let req = self
            .client
            .patch(self.rest_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=minimal")
            .json(&patch);
        self.send(req).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        debug!("DELETE {} ({} filters)", table, filters.len());
        let req = self
            .client
            .delete(self.rest_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=minimal");
        self.send(req).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for RestStore {
    async fn upload_by_path(&self, bucket: &str, path: &str, upload: BlobUpload) -> Result<(), StoreError> {
        let size = upload.bytes.len();
        let mut req = self
            .client
            .post(self.object_url(bucket, path))
            .header(reqwest::header::CONTENT_TYPE, upload.content_type)
            .header("x-upsert", if upload.upsert { "true" } else { "false" })
            .body(upload.bytes);
        if let Some(secs) = upload.cache_control {
            req = req.header(reqwest::header::CACHE_CONTROL, format!("max-age={}", secs));
        }
        self.send(req).await?;
        info!("Uploaded {}/{} ({} bytes)", bucket, path, size);
        Ok(())
    }

    async fn public_url(&self, bucket: &str, path: &str) -> Result<String, StoreError> {
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, path
        ))
    }

    fn bucket(&self) -> Option<&str> {
        Some(&self.bucket)
    }
}
