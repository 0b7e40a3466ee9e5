//! Error types for the folio-kit library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`IntakeError`] — **Per attempt**: one run of the image intake pipeline
//!   failed (file rejected, crop could not be rasterised, upload refused).
//!   The session is back in `Idle` and the user starts over from file
//!   selection. Nothing is retried automatically.
//!
//! * [`StoreError`] — **Collaborator**: the row store or blob store answered
//!   with an error, or could not be reached. Carries the backend's own
//!   message when one was sent so callers can show it verbatim.
//!
//! * [`FolioError`] — **Fatal**: bad configuration, malformed rows at the
//!   store boundary, missing records. Returned by the typed content
//!   repository and by constructors.

use crate::intake::{IntakeEvent, Phase};
use thiserror::Error;

/// Fallback text shown when an upload fails without a backend message.
pub const GENERIC_UPLOAD_ERROR: &str = "An error occurred while uploading the image";

/// Errors that end a single intake attempt.
///
/// Every variant is terminal for the attempt that produced it: the session
/// releases its preview, returns to [`Phase::Idle`] and waits for a new file.
#[derive(Debug, Clone, Error)]
pub enum IntakeError {
    // ── Validation ────────────────────────────────────────────────────────
    /// The selected file is larger than the configured limit.
    #[error("File is too large: {size} bytes (limit is {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    /// The declared media type is not one of the accepted image types.
    #[error("Unsupported file type '{declared}'. Only JPG, PNG and WEBP images are accepted")]
    UnsupportedType { declared: String },

    /// A document upload was attempted with something other than a PDF.
    #[error("Only PDF documents can be uploaded here, got '{declared}'")]
    NotADocument { declared: String },

    /// The crop rectangle is empty, negative or not a finite number.
    ///
    /// Raised while cropping; the same problem found after confirmation is
    /// reported as [`IntakeError::Rasterization`].
    #[error("Invalid crop region: {detail}")]
    InvalidCrop { detail: String },

    // ── Rasterization ─────────────────────────────────────────────────────
    /// Decoding, sampling or re-encoding the crop failed.
    #[error("Could not crop the image: {detail}")]
    Rasterization { detail: String },

    // ── Upload ────────────────────────────────────────────────────────────
    /// The blob store refused the write or could not resolve the public URL.
    #[error("{message}")]
    Upload { message: String },

    // ── State ─────────────────────────────────────────────────────────────
    /// A new file was selected while another one is still being processed.
    #[error("A file is already being processed (current phase: {phase:?})")]
    Busy { phase: Phase },

    /// The requested operation does not exist in the current phase.
    #[error("Cannot apply {event:?} while in phase {from:?}")]
    InvalidTransition { from: Phase, event: IntakeEvent },

    // ── Internal ──────────────────────────────────────────────────────────
    /// The temporary preview reference could not be created.
    #[error("Could not create image preview: {detail}")]
    PreviewUnavailable { detail: String },
}

/// Coarse classification of an [`IntakeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeErrorKind {
    Validation,
    Rasterization,
    Upload,
    State,
    Internal,
}

impl IntakeError {
    pub fn kind(&self) -> IntakeErrorKind {
        match self {
            IntakeError::FileTooLarge { .. }
            | IntakeError::UnsupportedType { .. }
            | IntakeError::NotADocument { .. }
            | IntakeError::InvalidCrop { .. } => IntakeErrorKind::Validation,
            IntakeError::Rasterization { .. } => IntakeErrorKind::Rasterization,
            IntakeError::Upload { .. } => IntakeErrorKind::Upload,
            IntakeError::Busy { .. } | IntakeError::InvalidTransition { .. } => {
                IntakeErrorKind::State
            }
            IntakeError::PreviewUnavailable { .. } => IntakeErrorKind::Internal,
        }
    }

    /// Build an upload error, preferring the backend's own message.
    pub fn from_store(err: &StoreError) -> Self {
        let message = err
            .backend_message()
            .map(str::to_string)
            .unwrap_or_else(|| GENERIC_UPLOAD_ERROR.to_string());
        IntakeError::Upload { message }
    }
}

/// Failures reported by the row store or blob store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend answered with an error status and an explanatory message.
    #[error("Store rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend answered with an error status and no usable body.
    #[error("Store returned HTTP {status}")]
    Status { status: u16 },

    /// The request never reached the backend (DNS, TLS, timeout, …).
    #[error("Could not reach the store: {0}")]
    Transport(String),

    /// The backend answered but the body was not what was expected.
    #[error("Unexpected store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// The message the backend sent, if it sent one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            StoreError::Rejected { message, .. } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }
}

/// All fatal errors returned by the folio-kit library.
#[derive(Debug, Error)]
pub enum FolioError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required environment variable is not set.
    #[error("Environment variable {var} is not set.\n{hint}")]
    MissingEnv { var: &'static str, hint: &'static str },

    // ── Store errors ──────────────────────────────────────────────────────
    /// A row-store operation failed.
    #[error("Store operation on '{table}' failed: {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },

    /// A row came back from the store with a shape the record type rejects.
    #[error("Malformed row in '{table}': {detail}")]
    InvalidRecord { table: String, detail: String },

    /// A lookup by key returned no row.
    #[error("No row in '{table}' matches {key}")]
    NotFound { table: String, key: String },

    // ── Intake ────────────────────────────────────────────────────────────
    #[error(transparent)]
    Intake(#[from] IntakeError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FolioError {
    pub(crate) fn store(table: &str, source: StoreError) -> Self {
        FolioError::Store {
            table: table.to_string(),
            source,
        }
    }
}
