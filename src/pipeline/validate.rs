//! File selection and validation: the first gate of the intake pipeline.
//!
//! Validation looks only at what the browser (or caller) declared: byte size
//! and media type. The bytes themselves are not sniffed here; a file that
//! claims to be a JPEG but is not one fails later, at rasterisation, when it
//! cannot be decoded.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Media types the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Jpeg,
    Png,
    Webp,
    Pdf,
}

impl MediaType {
    /// Parse a declared MIME type. Case-insensitive; parameters after `;`
    /// are ignored. `image/jpg` is accepted as an alias of `image/jpeg`.
    pub fn from_mime(mime: &str) -> Option<MediaType> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "image/webp" => Some(MediaType::Webp),
            "application/pdf" => Some(MediaType::Pdf),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
            MediaType::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
            MediaType::Webp => "webp",
            MediaType::Pdf => "pdf",
        }
    }

    pub fn is_image(self) -> bool {
        !matches!(self, MediaType::Pdf)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// An in-memory handle to a file the user picked.
///
/// Lives from selection until cropping completes or is cancelled.
#[derive(Clone)]
pub struct SelectedFile {
    name: String,
    declared_type: String,
    bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes,
        }
    }

    /// Build a `SelectedFile` from a path on disk, declaring the media type
    /// from the file extension the way a browser file picker does.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let declared = mime_for_name(&name).unwrap_or("application/octet-stream");
        Ok(Self::new(name, declared, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Map a file name's extension to a MIME type.
pub fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let media = match ext.as_str() {
        "jpg" | "jpeg" => MediaType::Jpeg,
        "png" => MediaType::Png,
        "webp" => MediaType::Webp,
        "pdf" => MediaType::Pdf,
        _ => return None,
    };
    Some(media.mime())
}

/// Check a selected file against the size limit and the allowed types.
///
/// Size is checked first, so an oversized file of the wrong type reports
/// the size problem.
pub fn validate_file(file: &SelectedFile, config: &IntakeConfig) -> Result<MediaType, IntakeError> {
    if file.size() > config.max_file_size {
        warn!(
            "Rejected '{}': {} bytes exceeds the {} byte limit",
            file.name(),
            file.size(),
            config.max_file_size
        );
        return Err(IntakeError::FileTooLarge {
            size: file.size(),
            max: config.max_file_size,
        });
    }

    let media = MediaType::from_mime(file.declared_type())
        .filter(|m| config.allowed_types.contains(m))
        .ok_or_else(|| {
            warn!(
                "Rejected '{}': type '{}' is not accepted",
                file.name(),
                file.declared_type()
            );
            IntakeError::UnsupportedType {
                declared: file.declared_type().to_string(),
            }
        })?;

    debug!("Accepted '{}' ({}, {} bytes)", file.name(), media, file.size());
    Ok(media)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(size: usize, mime: &str) -> SelectedFile {
        SelectedFile::new("photo", mime, vec![0u8; size])
    }

    #[test]
    fn accepts_allowed_types_up_to_the_limit() {
        let config = IntakeConfig::default();
        for mime in ["image/jpeg", "image/png", "image/webp"] {
            for size in [0, 1, 1024 * 1024, config.max_file_size] {
                assert!(
                    validate_file(&file(size, mime), &config).is_ok(),
                    "{mime} @ {size} should pass"
                );
            }
        }
    }

    #[test]
    fn rejects_one_byte_over_the_limit() {
        let config = IntakeConfig::default();
        let err = validate_file(&file(config.max_file_size + 1, "image/png"), &config).unwrap_err();
        assert!(matches!(err, IntakeError::FileTooLarge { .. }));
    }

    #[test]
    fn rejects_other_types() {
        let config = IntakeConfig::default();
        for mime in ["image/gif", "application/pdf", "text/plain", "", "image/svg+xml"] {
            let err = validate_file(&file(10, mime), &config).unwrap_err();
            assert!(
                matches!(err, IntakeError::UnsupportedType { .. }),
                "{mime:?} should be rejected"
            );
        }
    }

    #[test]
    fn size_is_reported_before_type() {
        let config = IntakeConfig::default();
        let err = validate_file(&file(config.max_file_size * 2, "image/gif"), &config).unwrap_err();
        assert!(matches!(err, IntakeError::FileTooLarge { .. }));
    }

    #[test]
    fn mime_parsing_is_lenient() {
        assert_eq!(MediaType::from_mime("IMAGE/JPEG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("image/jpg"), Some(MediaType::Jpeg));
        assert_eq!(
            MediaType::from_mime("image/png; charset=binary"),
            Some(MediaType::Png)
        );
        assert_eq!(MediaType::from_mime("image/gif"), None);
    }

    #[test]
    fn mime_from_file_name() {
        assert_eq!(mime_for_name("a.JPG"), Some("image/jpeg"));
        assert_eq!(mime_for_name("cv.pdf"), Some("application/pdf"));
        assert_eq!(mime_for_name("noext"), None);
        assert_eq!(mime_for_name("x.gif"), None);
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        let dbg = format!("{:?}", file(4096, "image/png"));
        assert!(dbg.contains("4096"));
        assert!(dbg.len() < 200);
    }
}
