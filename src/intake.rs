//! The image intake session: an explicit state machine over the pipeline
//! stages.
//!
//! ```text
//!            FileSelected           Accepted              Confirmed
//!   Idle ───────────────▶ Validating ───────▶ Cropping ──────────────▶ Rasterizing
//!    ▲ ▲                     │                 │  ▲ │                      │
//!    │ │      Rejected/Failed│       Cancelled │  └─┘ CropAdjusted       │ Rasterized
//!    │ └─────────────────────┘◀────────────────┘                         ▼
//!    │                                                 Failed      Uploading
//!    └─────────────────────────────────────────────────────────────────┤
//!                                                                      │ Uploaded
//!   Done ◀─────────────────────────────────────────────────────────────┘
//!    │ FileSelected ──▶ Validating
//! ```
//!
//! [`transition`] is the whole table; [`IntakeSession`] drives it. Every
//! failure is terminal for the attempt and returns the session to `Idle`;
//! nothing is retried.
//!
//! A selected file holds a [`PreviewLease`] from acceptance until the
//! attempt ends, so the temporary preview is released on cancel, success,
//! failure, when the session is dropped, and when a `confirm` future is
//! dropped before it finishes.

use crate::config::IntakeConfig;
use crate::error::{FolioError, IntakeError};
use crate::pipeline::crop::{CropRegion, DisplaySize};
use crate::pipeline::preview::{PreviewHandle, PreviewLease, PreviewProvider, TempFilePreviews};
use crate::pipeline::rasterize::rasterize;
use crate::pipeline::upload::{store_image, UploadedAsset};
use crate::pipeline::validate::{validate_file, MediaType, SelectedFile};
use crate::store::BlobStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where an intake session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Validating,
    Cropping,
    Rasterizing,
    Uploading,
    Done,
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntakeEvent {
    FileSelected,
    Accepted,
    Rejected,
    CropAdjusted,
    Cancelled,
    Confirmed,
    Rasterized,
    Failed,
    Uploaded,
}

/// The transition table.
pub fn transition(from: Phase, event: IntakeEvent) -> Result<Phase, IntakeError> {
    use IntakeEvent as E;
    use Phase as P;

    let to = match (from, event) {
        (P::Idle | P::Done, E::FileSelected) => P::Validating,
        (P::Validating, E::Accepted) => P::Cropping,
        (P::Validating, E::Rejected | E::Failed) => P::Idle,
        (P::Cropping, E::CropAdjusted) => P::Cropping,
        (P::Cropping, E::Cancelled) => P::Idle,
        (P::Cropping, E::Confirmed) => P::Rasterizing,
        (P::Rasterizing, E::Rasterized) => P::Uploading,
        (P::Rasterizing | P::Uploading, E::Failed) => P::Idle,
        (P::Uploading, E::Uploaded) => P::Done,
        _ => return Err(IntakeError::InvalidTransition { from, event }),
    };
    Ok(to)
}

/// Receives the outcome of intake attempts.
///
/// `on_complete` is called at most once per selected file, only after the
/// upload and the public-URL lookup have both succeeded. The other methods
/// default to no-ops.
///
/// Any `Fn(&str) + Send + Sync` closure is an `IntakeCallback`.
pub trait IntakeCallback: Send + Sync {
    fn on_complete(&self, url: &str);

    /// Called once for every attempt that ends in an error.
    fn on_error(&self, error: &IntakeError) {
        let _ = error;
    }

    fn on_phase_change(&self, from: Phase, to: Phase) {
        let _ = (from, to);
    }
}

impl<F> IntakeCallback for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_complete(&self, url: &str) {
        self(url)
    }
}

fn step(phase: &mut Phase, event: IntakeEvent, callback: &dyn IntakeCallback) -> Result<Phase, IntakeError> {
    let from = *phase;
    let to = transition(from, event)?;
    *phase = to;
    if from != to {
        debug!("Intake {:?} --{:?}--> {:?}", from, event, to);
        callback.on_phase_change(from, to);
    }
    Ok(to)
}

/// The phases of one `confirm` call. Resets the session to `Idle` if the
/// future is dropped while rasterizing or uploading.
struct InFlight<'a> {
    phase: &'a mut Phase,
    callback: Arc<dyn IntakeCallback>,
}

impl InFlight<'_> {
    fn advance(&mut self, event: IntakeEvent) -> Result<Phase, IntakeError> {
        step(self.phase, event, self.callback.as_ref())
    }

    fn fail(&mut self, error: IntakeError) -> IntakeError {
        warn!("Intake attempt failed in {:?}: {}", self.phase, error);
        if let Err(e) = self.advance(IntakeEvent::Failed) {
            debug!("Ignoring {}", e);
        }
        self.callback.on_error(&error);
        error
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if matches!(*self.phase, Phase::Rasterizing | Phase::Uploading) {
            debug!("Confirm abandoned while {:?}", self.phase);
            *self.phase = Phase::Idle;
        }
    }
}

/// The file currently being cropped, with its preview.
struct ActiveCrop {
    file: SelectedFile,
    media_type: MediaType,
    region: CropRegion,
    lease: PreviewLease,
}

/// Handle to one intake site: select a file, adjust the crop, confirm or
/// cancel, repeat.
///
/// Collaborators are injected; use [`intake`] for the common setup.
pub struct IntakeSession {
    config: IntakeConfig,
    blob: Arc<dyn BlobStore>,
    previews: Arc<dyn PreviewProvider>,
    callback: Arc<dyn IntakeCallback>,
    phase: Phase,
    active: Option<ActiveCrop>,
}

impl std::fmt::Debug for IntakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeSession")
            .field("phase", &self.phase)
            .field("file", &self.active.as_ref().map(|a| a.file.name()))
            .field("region", &self.active.as_ref().map(|a| a.region))
            .finish()
    }
}

/// Open an intake session with default settings and temp-file previews.
///
/// Uploads go to the blob store's configured bucket when it has one, so
/// images land next to documents stored through the same store.
pub fn intake(
    aspect_ratio: f64,
    blob: Arc<dyn BlobStore>,
    callback: Arc<dyn IntakeCallback>,
) -> Result<IntakeSession, FolioError> {
    let mut builder = IntakeConfig::builder().aspect_ratio(aspect_ratio);
    if let Some(bucket) = blob.bucket() {
        builder = builder.bucket(bucket);
    }
    Ok(IntakeSession::new(builder.build()?, blob, callback))
}

impl IntakeSession {
    pub fn new(config: IntakeConfig, blob: Arc<dyn BlobStore>, callback: Arc<dyn IntakeCallback>) -> Self {
        Self {
            config,
            blob,
            previews: Arc::new(TempFilePreviews::new()),
            callback,
            phase: Phase::Idle,
            active: None,
        }
    }

    /// Replace the preview provider.
    pub fn with_previews(mut self, previews: Arc<dyn PreviewProvider>) -> Self {
        self.previews = previews;
        self
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The preview of the file being cropped.
    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.active.as_ref().map(|a| a.lease.handle())
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.active.as_ref().map(|a| &a.file)
    }

    pub fn media_type(&self) -> Option<MediaType> {
        self.active.as_ref().map(|a| a.media_type)
    }

    /// The current crop region, while cropping.
    pub fn crop(&self) -> Option<&CropRegion> {
        self.active.as_ref().map(|a| &a.region)
    }

    fn apply(&mut self, event: IntakeEvent) -> Result<Phase, IntakeError> {
        step(&mut self.phase, event, self.callback.as_ref())
    }

    fn reject(&mut self, event: IntakeEvent, error: IntakeError) -> IntakeError {
        if let Err(e) = self.apply(event) {
            debug!("Ignoring {}", e);
        }
        self.callback.on_error(&error);
        error
    }

    /// Validate `file` and start cropping it.
    ///
    /// Only allowed in `Idle` or `Done`; anywhere else the call is refused
    /// with [`IntakeError::Busy`] and the file in progress is kept.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), IntakeError> {
        if !matches!(self.phase, Phase::Idle | Phase::Done) {
            warn!("Refusing '{}': session is {:?}", file.name(), self.phase);
            return Err(IntakeError::Busy { phase: self.phase });
        }
        self.apply(IntakeEvent::FileSelected)?;

        let media_type = match validate_file(&file, &self.config) {
            Ok(m) => m,
            Err(e) => return Err(self.reject(IntakeEvent::Rejected, e)),
        };
        let lease = match PreviewLease::acquire(Arc::clone(&self.previews), &file, media_type) {
            Ok(l) => l,
            Err(e) => return Err(self.reject(IntakeEvent::Failed, e)),
        };

        info!("Cropping '{}' ({}, {} bytes)", file.name(), media_type, file.size());
        self.active = Some(ActiveCrop {
            file,
            media_type,
            region: CropRegion::initial(self.config.aspect_ratio),
            lease,
        });
        self.apply(IntakeEvent::Accepted)?;
        Ok(())
    }

    fn adjust(&mut self, f: impl FnOnce(&mut CropRegion)) -> Result<(), IntakeError> {
        let to = transition(self.phase, IntakeEvent::CropAdjusted)?;
        let active = self.active.as_mut().ok_or(IntakeError::InvalidTransition {
            from: self.phase,
            event: IntakeEvent::CropAdjusted,
        })?;
        f(&mut active.region);
        self.phase = to;
        Ok(())
    }

    /// Replace the crop region as given.
    ///
    /// Explicit dimensions are kept even when they do not match the
    /// session's aspect ratio; the next resize locks the ratio again.
    pub fn set_crop(&mut self, region: CropRegion) -> Result<(), IntakeError> {
        region.validate()?;
        self.adjust(|r| *r = region)
    }

    /// Width-driven resize, locked to the region's aspect ratio or, if it
    /// has none, the session's.
    pub fn resize_width(&mut self, width: f64) -> Result<(), IntakeError> {
        let aspect = self.config.aspect_ratio;
        self.adjust(|r| {
            r.aspect.get_or_insert(aspect);
            r.resize_width(width)
        })
    }

    /// Height-driven counterpart of [`resize_width`](Self::resize_width).
    pub fn resize_height(&mut self, height: f64) -> Result<(), IntakeError> {
        let aspect = self.config.aspect_ratio;
        self.adjust(|r| {
            r.aspect.get_or_insert(aspect);
            r.resize_height(height)
        })
    }

    pub fn move_to(&mut self, x: f64, y: f64) -> Result<(), IntakeError> {
        self.adjust(|r| r.move_to(x, y))
    }

    /// Abandon the file being cropped and release its preview.
    ///
    /// A no-op in `Idle` and `Done`.
    pub fn cancel(&mut self) -> Result<(), IntakeError> {
        if matches!(self.phase, Phase::Idle | Phase::Done) {
            return Ok(());
        }
        self.apply(IntakeEvent::Cancelled)?;
        if let Some(active) = self.active.take() {
            info!("Crop of '{}' cancelled", active.file.name());
            active.lease.release();
        }
        Ok(())
    }

    /// Rasterize the current crop, upload it and report the public URL.
    ///
    /// `display` is the size the image is shown at in the editor; `None`
    /// means natural size. On success the session is `Done` and
    /// [`IntakeCallback::on_complete`] has been called with the URL. On
    /// failure the session is `Idle` and [`IntakeCallback::on_error`] has
    /// been called.
    pub async fn confirm(&mut self, display: Option<DisplaySize>) -> Result<UploadedAsset, IntakeError> {
        transition(self.phase, IntakeEvent::Confirmed)?;
        let active = self.active.take().ok_or(IntakeError::InvalidTransition {
            from: self.phase,
            event: IntakeEvent::Confirmed,
        })?;
        let ActiveCrop {
            file,
            region,
            lease,
            ..
        } = active;

        let blob = Arc::clone(&self.blob);
        let callback = Arc::clone(&self.callback);
        let config = self.config.clone();
        let mut flight = InFlight {
            phase: &mut self.phase,
            callback: Arc::clone(&callback),
        };
        flight.advance(IntakeEvent::Confirmed)?;

        let name = file.name().to_string();
        let source = file.into_bytes();
        let quality = config.jpeg_quality;
        let rasterized = tokio::task::spawn_blocking(move || rasterize(&source, &region, display, quality))
            .await
            .map_err(|e| IntakeError::Rasterization {
                detail: format!("rasterization task failed: {}", e),
            })
            .and_then(|r| r);
        let image = match rasterized {
            Ok(image) => image,
            Err(e) => return Err(flight.fail(e)),
        };
        debug!("Rasterized '{}' to {:?}", name, image);
        flight.advance(IntakeEvent::Rasterized)?;

        let asset = match store_image(blob.as_ref(), &config, image).await {
            Ok(asset) => asset,
            Err(e) => return Err(flight.fail(e)),
        };

        lease.release();
        flight.advance(IntakeEvent::Uploaded)?;
        drop(flight);

        info!("Intake of '{}' complete: {}", name, asset.public_url);
        callback.on_complete(&asset.public_url);
        Ok(asset)
    }
}
