//! Pipeline stages for image intake.
//!
//! Each submodule implements exactly one step. The stages know nothing about
//! the session state machine in [`crate::intake`]; they take plain values
//! and return plain values, so each is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ preview ──▶ crop ──▶ rasterize ──▶ upload
//! (size/type)  (temp ref)  (region)  (JPEG 95)     (blob store)
//! ```
//!
//! 1. [`validate`]  — check declared size and media type of the selected file
//! 2. [`preview`]   — create the temporary local reference the editor shows,
//!    owned by a lease that releases it on drop
//! 3. [`crop`]      — aspect-locked crop geometry in percent or pixels
//! 4. [`rasterize`] — sample the region from the source at natural
//!    resolution and JPEG-encode it; CPU-bound, runs in `spawn_blocking`
//! 5. [`upload`]    — write to the blob store under a random path and
//!    resolve the public URL; the only stage with network I/O

pub mod crop;
pub mod preview;
pub mod rasterize;
pub mod upload;
pub mod validate;
