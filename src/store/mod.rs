//! Collaborator traits for the hosted backend.
//!
//! The application talks to two remote services: a row store (tables of
//! JSON rows, filtered by column equality) and a blob store (buckets of
//! files addressed by path, each with a public URL). Both are injected as
//! trait objects so every component can be exercised against the in-memory
//! doubles in [`memory`].
//!
//! - [`rest::RestStore`] implements both traits over HTTP.
//! - [`memory::MemoryBlobStore`] / [`memory::MemoryRowStore`] keep
//!   everything in process.

pub mod memory;
pub mod rest;

use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

// ── Blob store ───────────────────────────────────────────────────────────

/// One file to write to the blob store.
#[derive(Clone)]
pub struct BlobUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Cache lifetime in seconds, sent as `cache-control: max-age=<n>`.
    pub cache_control: Option<String>,
    /// Replace an existing object at the same path instead of failing.
    pub upsert: bool,
}

impl BlobUpload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            cache_control: None,
            upsert: false,
        }
    }

    pub fn cache_control(mut self, secs: impl Into<String>) -> Self {
        self.cache_control = Some(secs.into());
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

impl fmt::Debug for BlobUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobUpload")
            .field("bytes", &self.bytes.len())
            .field("content_type", &self.content_type)
            .field("cache_control", &self.cache_control)
            .field("upsert", &self.upsert)
            .finish()
    }
}

/// Object storage addressed by bucket and path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `upload` at `bucket/path`.
    ///
    /// Without `upsert`, writing to an occupied path fails.
    async fn upload_by_path(&self, bucket: &str, path: &str, upload: BlobUpload) -> Result<(), StoreError>;

    /// Resolve the stable public URL of `bucket/path`.
    async fn public_url(&self, bucket: &str, path: &str) -> Result<String, StoreError>;

    /// The bucket every upload through this store belongs in, when the
    /// store was configured with one.
    fn bucket(&self) -> Option<&str> {
        None
    }
}

// ── Row store ────────────────────────────────────────────────────────────

/// Column-equality filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub(crate) fn matches(&self, row: &Value) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// Sort order on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// A `select` request: filters, optional ordering, optional row limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Relational store of JSON rows.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Insert `rows`, returning them as stored (with generated columns).
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError>;

    /// Merge `patch` into every row matching all `filters`.
    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> Result<(), StoreError>;

    /// Delete every row matching all `filters`.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;
}
