//! In-process stores.
//!
//! Used as test doubles and by the CLI's dry runs. Both mirror the observable
//! behaviour of the hosted backend closely enough for the rest of the crate:
//! the blob store refuses to overwrite without `upsert`, the row store fills
//! in `id` and `created_at` on insert.

use super::{BlobStore, BlobUpload, Filter, Query, RowStore};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tracing::debug;

// ── Blob store ───────────────────────────────────────────────────────────

/// An object held by [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cache_control: Option<String>,
}

/// Blob store backed by a `HashMap`.
///
/// Failures can be injected with [`fail_next_upload`](Self::fail_next_upload)
/// and [`fail_next_public_url`](Self::fail_next_public_url).
pub struct MemoryBlobStore {
    public_base: String,
    bucket: Option<String>,
    objects: Mutex<HashMap<(String, String), StoredBlob>>,
    upload_failure: Mutex<Option<StoreError>>,
    url_failure: Mutex<Option<StoreError>>,
    uploads: AtomicUsize,
    url_lookups: AtomicUsize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl MemoryBlobStore {
    /// Public URLs are `{public_base}/{bucket}/{path}`.
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            bucket: None,
            objects: Mutex::new(HashMap::new()),
            upload_failure: Mutex::new(None),
            url_failure: Mutex::new(None),
            uploads: AtomicUsize::new(0),
            url_lookups: AtomicUsize::new(0),
        }
    }

    /// Report `bucket` as this store's configured bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Make the next `upload_by_path` call fail with `err`.
    pub fn fail_next_upload(&self, err: StoreError) {
        *self.upload_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    /// Make the next `public_url` call fail with `err`.
    pub fn fail_next_public_url(&self, err: StoreError) {
        *self.url_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<StoredBlob> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths stored in `bucket`, sorted.
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let mut paths: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Number of `upload_by_path` calls, successful or not.
    pub fn upload_calls(&self) -> usize {
        self.uploads.load(AtomicOrdering::SeqCst)
    }

    /// Number of `public_url` calls, successful or not.
    pub fn public_url_calls(&self) -> usize {
        self.url_lookups.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_by_path(&self, bucket: &str, path: &str, upload: BlobUpload) -> Result<(), StoreError> {
        self.uploads.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(err) = self.upload_failure.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(err);
        }

        let key = (bucket.to_string(), path.to_string());
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        if !upload.upsert && objects.contains_key(&key) {
            return Err(StoreError::Rejected {
                status: 409,
                message: "The resource already exists".into(),
            });
        }
        debug!("Stored {}/{} ({} bytes)", bucket, path, upload.bytes.len());
        objects.insert(
            key,
            StoredBlob {
                bytes: upload.bytes,
                content_type: upload.content_type,
                cache_control: upload.cache_control,
            },
        );
        Ok(())
    }

    async fn public_url(&self, bucket: &str, path: &str) -> Result<String, StoreError> {
        self.url_lookups.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(err) = self.url_failure.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(err);
        }
        Ok(format!("{}/{}/{}", self.public_base, bucket, path))
    }

    fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }
}

// ── Row store ────────────────────────────────────────────────────────────

struct Tables {
    rows: HashMap<String, Vec<Value>>,
    last_created: Option<DateTime<Utc>>,
}

/// Row store backed by a `HashMap` of tables.
///
/// Inserted rows get a UUID `id` and a strictly increasing `created_at`
/// when they lack one, so "newest first" ordering is deterministic.
pub struct MemoryRowStore {
    tables: Mutex<Tables>,
}

impl Default for MemoryRowStore {
    fn default() -> Self {
        Self {
            tables: Mutex::new(Tables {
                rows: HashMap::new(),
                last_created: None,
            }),
        }
    }
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put rows into `table` exactly as given, bypassing insert defaults.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.rows.entry(table.to_string()).or_default().extend(rows);
    }

    /// Snapshot of every row in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.rows.get(table).cloned().unwrap_or_default()
    }
}

impl Tables {
    fn next_created_at(&mut self) -> String {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

fn matches_all(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

/// Total order over JSON scalars: nulls first, then numbers, then strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Value> = tables
            .rows
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_all(r, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(mut map) = row else {
                return Err(StoreError::Rejected {
                    status: 400,
                    message: format!("Rows inserted into '{}' must be JSON objects", table),
                });
            };
            if !map.contains_key("id") {
                map.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
            if !map.contains_key("created_at") {
                map.insert("created_at".into(), Value::String(tables.next_created_at()));
            }
            stored.push(Value::Object(map));
        }
        tables
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> Result<(), StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::Rejected {
                status: 400,
                message: "Update patch must be a JSON object".into(),
            });
        };
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rows) = tables.rows.get_mut(table) {
            for row in rows.iter_mut().filter(|r| matches_all(r, filters)) {
                if let Value::Object(map) = row {
                    for (k, v) in &patch {
                        map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rows) = tables.rows.get_mut(table) {
            rows.retain(|r| !matches_all(r, filters));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Order;
    use serde_json::json;

    #[tokio::test]
    async fn blob_upload_refuses_overwrite_without_upsert() {
        let store = MemoryBlobStore::default();
        let upload = BlobUpload::new(vec![1, 2, 3], "image/jpeg");
        store.upload_by_path("images", "a.jpg", upload.clone()).await.unwrap();

        let err = store.upload_by_path("images", "a.jpg", upload.clone()).await.unwrap_err();
        assert_eq!(err.backend_message(), Some("The resource already exists"));

        store
            .upload_by_path("images", "a.jpg", upload.upsert(true))
            .await
            .unwrap();
        assert_eq!(store.upload_calls(), 3);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = MemoryBlobStore::default();
        store.fail_next_upload(StoreError::Status { status: 500 });
        let upload = BlobUpload::new(vec![1], "image/jpeg");
        assert!(store.upload_by_path("b", "x", upload.clone()).await.is_err());
        assert!(store.upload_by_path("b", "x", upload).await.is_ok());
    }

    #[tokio::test]
    async fn public_url_joins_base_bucket_and_path() {
        let store = MemoryBlobStore::new("https://cdn.example/");
        let url = store.public_url("images", "abc.jpg").await.unwrap();
        assert_eq!(url, "https://cdn.example/images/abc.jpg");
    }

    #[tokio::test]
    async fn insert_fills_id_and_increasing_created_at() {
        let store = MemoryRowStore::new();
        let rows = store
            .insert("skills", vec![json!({"name": "a"}), json!({"name": "b"})])
            .await
            .unwrap();
        assert!(rows[0]["id"].is_string());
        let (a, b) = (rows[0]["created_at"].as_str().unwrap(), rows[1]["created_at"].as_str().unwrap());
        assert!(a < b, "{a} !< {b}");
    }

    #[tokio::test]
    async fn select_filters_orders_and_limits() {
        let store = MemoryRowStore::new();
        store.seed(
            "t",
            vec![
                json!({"k": 1, "g": "x"}),
                json!({"k": 3, "g": "x"}),
                json!({"k": 2, "g": "y"}),
                json!({"k": 5, "g": "x"}),
            ],
        );
        let q = Query::new().eq("g", "x").order(Order::desc("k")).limit(2);
        let rows = store.select("t", &q).await.unwrap();
        let ks: Vec<i64> = rows.iter().map(|r| r["k"].as_i64().unwrap()).collect();
        assert_eq!(ks, vec![5, 3]);
    }

    #[tokio::test]
    async fn update_and_delete_by_filter() {
        let store = MemoryRowStore::new();
        store.seed("t", vec![json!({"id": 1, "v": "a"}), json!({"id": 2, "v": "b"})]);

        store
            .update("t", json!({"v": "z"}), &[Filter::eq("id", 2)])
            .await
            .unwrap();
        store.delete("t", &[Filter::eq("id", 1)]).await.unwrap();

        assert_eq!(store.rows("t"), vec![json!({"id": 2, "v": "z"})]);
    }

    #[tokio::test]
    async fn insert_rejects_non_objects() {
        let store = MemoryRowStore::new();
        assert!(store.insert("t", vec![json!([1, 2])]).await.is_err());
    }
}
