//! Temporary local previews of a selected file.
//!
//! While the user crops, the editor needs something it can display: a
//! browser would mint an object URL, a native UI a file path. Either way the
//! reference is backed by a native resource that must be released
//! explicitly, on every exit path, not left to a garbage collector.
//!
//! [`PreviewLease`] owns one [`PreviewHandle`] and releases it through its
//! [`PreviewProvider`] when dropped. The intake session keeps the lease for
//! exactly as long as the file is being cropped or uploaded, so cancel,
//! success, failure, session drop and an abandoned `confirm` future all end
//! in the same release call.

use crate::error::IntakeError;
use crate::pipeline::validate::{MediaType, SelectedFile};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A reference to a temporary preview of the selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewHandle {
    id: u64,
    location: Option<PathBuf>,
    media_type: MediaType,
}

impl PreviewHandle {
    pub fn new(id: u64, location: Option<PathBuf>, media_type: MediaType) -> Self {
        Self {
            id,
            location,
            media_type,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Where the preview can be read from, when the provider backs it with
    /// a file.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }
}

/// Creates and releases preview references.
///
/// Implementations must tolerate `release` being called for a handle they
/// no longer track.
pub trait PreviewProvider: Send + Sync {
    fn create(&self, file: &SelectedFile, media_type: MediaType) -> Result<PreviewHandle, IntakeError>;

    fn release(&self, handle: &PreviewHandle);
}

/// Owns one preview and releases it on drop.
pub struct PreviewLease {
    provider: Arc<dyn PreviewProvider>,
    handle: PreviewHandle,
}

impl PreviewLease {
    pub fn acquire(
        provider: Arc<dyn PreviewProvider>,
        file: &SelectedFile,
        media_type: MediaType,
    ) -> Result<Self, IntakeError> {
        let handle = provider.create(file, media_type)?;
        debug!("Preview {} created for '{}'", handle.id(), file.name());
        Ok(Self { provider, handle })
    }

    pub fn handle(&self) -> &PreviewHandle {
        &self.handle
    }

    /// Release now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PreviewLease {
    fn drop(&mut self) {
        debug!("Preview {} released", self.handle.id());
        self.provider.release(&self.handle);
    }
}

impl fmt::Debug for PreviewLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewLease")
            .field("handle", &self.handle)
            .finish()
    }
}

/// Default provider: writes each preview to a named temporary file that is
/// deleted on release.
pub struct TempFilePreviews {
    dir: Option<PathBuf>,
    next_id: AtomicU64,
    files: Mutex<HashMap<u64, NamedTempFile>>,
}

impl Default for TempFilePreviews {
    fn default() -> Self {
        Self {
            dir: None,
            next_id: AtomicU64::new(1),
            files: Mutex::new(HashMap::new()),
        }
    }
}

impl TempFilePreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place preview files in `dir` instead of the system temp directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Number of previews created and not yet released.
    pub fn active(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl PreviewProvider for TempFilePreviews {
    fn create(&self, file: &SelectedFile, media_type: MediaType) -> Result<PreviewHandle, IntakeError> {
        let suffix = format!(".{}", media_type.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("folio-preview-").suffix(&suffix);
        let created = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };

        let mut tmp = created.map_err(|e| IntakeError::PreviewUnavailable {
            detail: e.to_string(),
        })?;
        tmp.write_all(file.bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| IntakeError::PreviewUnavailable {
                detail: e.to_string(),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = PreviewHandle::new(id, Some(tmp.path().to_path_buf()), media_type);
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tmp);
        Ok(handle)
    }

    fn release(&self, handle: &PreviewHandle) {
        let removed = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle.id());
        match removed {
            // Dropping the NamedTempFile deletes it.
            Some(tmp) => {
                if let Err(e) = tmp.close() {
                    warn!("Could not delete preview {}: {}", handle.id(), e);
                }
            }
            None => debug!("Preview {} was already released", handle.id()),
        }
    }
}
