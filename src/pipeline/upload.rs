//! Upload: write encoded bytes to the blob store and resolve a public URL.
//!
//! Image crops are stored under a fresh random path and never overwrite
//! anything. CV documents are stored under a timestamped name with
//! overwrite enabled. Both land in the same bucket.

use crate::config::IntakeConfig;
use crate::error::{IntakeError, StoreError};
use crate::pipeline::rasterize::RasterizedImage;
use crate::pipeline::validate::{MediaType, SelectedFile};
use crate::store::{BlobStore, BlobUpload};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A successfully stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub bucket: String,
    pub path: String,
    pub public_url: String,
    pub content_type: String,
    pub size: usize,
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(25);
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `<random base-36 token>.<extension of file_name>`.
///
/// The token comes from 128 random bits, never from the file's name or
/// content. A name without an extension yields the bare token.
pub fn generate_storage_path(file_name: &str) -> String {
    let token = to_base36(rand::random::<u128>());
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!("{}.{}", token, ext),
        _ => token,
    }
}

/// Storage path for a CV document: `cv_<unix millis>.pdf`.
pub fn document_path() -> String {
    format!("cv_{}.pdf", chrono::Utc::now().timestamp_millis())
}

fn upload_error(bucket: &str, path: &str, err: StoreError) -> IntakeError {
    warn!("Upload of {}/{} failed: {}", bucket, path, err);
    IntakeError::from_store(&err)
}

/// Upload a rasterised crop with overwrite disabled.
pub async fn store_image(
    blob: &dyn BlobStore,
    config: &IntakeConfig,
    image: RasterizedImage,
) -> Result<UploadedAsset, IntakeError> {
    let bucket = config.bucket.as_str();
    let path = generate_storage_path(&config.output_file_name);
    let content_type = image.content_type().to_string();
    let size = image.bytes.len();

    let upload = BlobUpload::new(image.bytes, content_type.clone())
        .cache_control(config.cache_control.clone())
        .upsert(false);
    blob.upload_by_path(bucket, &path, upload)
        .await
        .map_err(|e| upload_error(bucket, &path, e))?;

    let public_url = blob
        .public_url(bucket, &path)
        .await
        .map_err(|e| upload_error(bucket, &path, e))?;

    info!("Stored crop {}x{} at {}", image.width, image.height, public_url);
    Ok(UploadedAsset {
        bucket: bucket.to_string(),
        path,
        public_url,
        content_type,
        size,
    })
}

/// Upload a PDF document, replacing any object at the same path.
pub async fn store_document(
    blob: &dyn BlobStore,
    bucket: &str,
    file: &SelectedFile,
) -> Result<UploadedAsset, IntakeError> {
    if MediaType::from_mime(file.declared_type()) != Some(MediaType::Pdf) {
        warn!("Rejected document '{}' ({})", file.name(), file.declared_type());
        return Err(IntakeError::NotADocument {
            declared: file.declared_type().to_string(),
        });
    }

    let path = document_path();
    let content_type = MediaType::Pdf.mime().to_string();
    let upload = BlobUpload::new(file.bytes().to_vec(), content_type.clone()).upsert(true);
    blob.upload_by_path(bucket, &path, upload)
        .await
        .map_err(|e| upload_error(bucket, &path, e))?;

    let public_url = blob
        .public_url(bucket, &path)
        .await
        .map_err(|e| upload_error(bucket, &path, e))?;

    info!("Stored document '{}' at {}", file.name(), public_url);
    Ok(UploadedAsset {
        bucket: bucket.to_string(),
        path,
        public_url,
        content_type,
        size: file.size(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GENERIC_UPLOAD_ERROR;
    use crate::store::memory::MemoryBlobStore;
    use std::collections::HashSet;

    fn image() -> RasterizedImage {
        RasterizedImage {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 2,
            height: 1,
        }
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(u128::MAX).len(), 25);
    }

    #[test]
    fn storage_path_keeps_extension_only() {
        let p = generate_storage_path("cropped-image.jpg");
        let (token, ext) = p.rsplit_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert!(!token.contains("cropped"));
        assert!(token.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn storage_paths_do_not_collide() {
        let paths: HashSet<String> = (0..1000).map(|_| generate_storage_path("a.png")).collect();
        assert_eq!(paths.len(), 1000);
    }

    #[test]
    fn storage_path_without_extension() {
        assert!(!generate_storage_path("noext").contains('.'));
    }

    #[test]
    fn document_path_shape() {
        let p = document_path();
        assert!(p.starts_with("cv_") && p.ends_with(".pdf"));
        assert!(p[3..p.len() - 4].parse::<i64>().is_ok());
    }

    #[test]
    fn image_upload_sends_options_and_resolves_url() {
        let blob = MemoryBlobStore::new("https://cdn.test");
        let config = IntakeConfig::default();
        let asset = tokio_test::block_on(store_image(&blob, &config, image())).unwrap();

        assert_eq!(asset.bucket, "images");
        assert_eq!(asset.public_url, format!("https://cdn.test/images/{}", asset.path));
        let stored = blob.get("images", &asset.path).unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
        assert_eq!(stored.cache_control.as_deref(), Some("3600"));
        assert_eq!(stored.bytes.len(), asset.size);
    }

    #[test]
    fn image_upload_error_prefers_backend_message() {
        let blob = MemoryBlobStore::default();
        blob.fail_next_upload(StoreError::Rejected {
            status: 413,
            message: "Payload too large".into(),
        });
        let err = tokio_test::block_on(store_image(&blob, &IntakeConfig::default(), image())).unwrap_err();
        assert_eq!(err.to_string(), "Payload too large");
        assert_eq!(blob.public_url_calls(), 0);
    }

    #[test]
    fn image_upload_error_without_message_is_generic() {
        let blob = MemoryBlobStore::default();
        blob.fail_next_upload(StoreError::Transport("connection reset".into()));
        let err = tokio_test::block_on(store_image(&blob, &IntakeConfig::default(), image())).unwrap_err();
        assert_eq!(err.to_string(), GENERIC_UPLOAD_ERROR);
    }

    #[test]
    fn document_upload_replaces_existing_object() {
        let blob = MemoryBlobStore::default();
        let pdf = SelectedFile::new("cv.pdf", "application/pdf", b"%PDF-1.7".to_vec());
        let first = tokio_test::block_on(store_document(&blob, "images", &pdf)).unwrap();
        assert!(first.path.starts_with("cv_"));
        assert_eq!(first.content_type, "application/pdf");

        // Back-to-back uploads often land on the same millisecond path.
        for _ in 0..3 {
            tokio_test::block_on(store_document(&blob, "images", &pdf)).unwrap();
        }
        assert_eq!(blob.upload_calls(), 4);
        assert!(blob.paths("images").iter().all(|p| p.starts_with("cv_") && p.ends_with(".pdf")));
    }

    #[test]
    fn document_upload_rejects_images() {
        let blob = MemoryBlobStore::default();
        let jpg = SelectedFile::new("cv.jpg", "image/jpeg", vec![1]);
        let err = tokio_test::block_on(store_document(&blob, "images", &jpg)).unwrap_err();
        assert!(matches!(err, IntakeError::NotADocument { .. }));
        assert_eq!(blob.upload_calls(), 0);
    }
}
