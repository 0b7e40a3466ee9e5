//! # folio-kit
//!
//! Content and media core for a personal portfolio site: the blog-body
//! markup renderer, the image intake pipeline used by the admin panel, and
//! typed access to the hosted row and blob stores behind both.
//!
//! ## Image Intake Overview
//!
//! ```text
//! selected file
//!  │
//!  ├─ 1. Validate   size ≤ 2 MiB, JPEG / PNG / WEBP
//!  ├─ 2. Preview    temporary local reference, released on every exit path
//!  ├─ 3. Crop       aspect-locked region over the displayed image
//!  ├─ 4. Rasterize  sample at natural resolution, JPEG @ 95 (spawn_blocking)
//!  ├─ 5. Upload     random base-36 path, overwrite disabled
//!  └─ 6. Done       public URL handed to the callback exactly once
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use folio_kit::{intake, IntakeCallback, RestStore, SelectedFile, StoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(RestStore::new(&StoreConfig::from_env()?)?);
//!     let on_done: Arc<dyn IntakeCallback> = Arc::new(|url: &str| println!("{url}"));
//!
//!     let mut session = intake(16.0 / 9.0, store, on_done)?;
//!     session.select_file(SelectedFile::from_path("photo.jpg").await?)?;
//!     session.resize_width(80.0)?;
//!     session.confirm(None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Blog Markup
//!
//! ```rust
//! let html = folio_kit::markup::render_safe("**Hello**\n\n    An indented paragraph.");
//! assert!(html.starts_with("<strong>Hello</strong>"));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `folio` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod content;
pub mod error;
pub mod intake;
pub mod markup;
pub mod pipeline;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IntakeConfig, IntakeConfigBuilder, StoreConfig, StoreConfigBuilder};
pub use content::{ContentRepository, MessageFilter, SiteInfoField, TableNames};
pub use error::{FolioError, IntakeError, IntakeErrorKind, StoreError};
pub use intake::{intake, transition, IntakeCallback, IntakeEvent, IntakeSession, Phase};
pub use pipeline::crop::{CropRegion, CropUnit, DisplaySize};
pub use pipeline::preview::{PreviewHandle, PreviewLease, PreviewProvider, TempFilePreviews};
pub use pipeline::rasterize::{rasterize, RasterizedImage};
pub use pipeline::upload::{generate_storage_path, store_document, store_image, UploadedAsset};
pub use pipeline::validate::{validate_file, MediaType, SelectedFile};
pub use store::memory::{MemoryBlobStore, MemoryRowStore};
pub use store::rest::RestStore;
pub use store::{BlobStore, BlobUpload, Filter, Order, Query, RowStore};
