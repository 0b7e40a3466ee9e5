//! Configuration types for image intake and content-store access.
//!
//! Intake behaviour is controlled through [`IntakeConfig`], built via its
//! [`IntakeConfigBuilder`]. Store connection details live in
//! [`StoreConfig`], which can be filled from the environment so the same
//! binary runs against a local stack or a hosted one.

use crate::error::FolioError;
use crate::pipeline::validate::MediaType;
use std::fmt;

/// Two mebibytes: the largest file the intake pipeline accepts.
pub const DEFAULT_MAX_FILE_SIZE: usize = 2 * 1024 * 1024;

/// Default crop aspect ratio (width / height).
pub const DEFAULT_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// Configuration for one image intake session.
///
/// # Example
/// ```rust
/// use folio_kit::IntakeConfig;
///
/// let config = IntakeConfig::builder()
///     .aspect_ratio(1.0)
///     .bucket("avatars")
///     .build()
///     .unwrap();
/// assert_eq!(config.jpeg_quality, 95);
/// ```
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Largest accepted file, in bytes. Default: 2 MiB.
    pub max_file_size: usize,

    /// Declared media types accepted at selection time. Default: JPEG, PNG, WEBP.
    pub allowed_types: Vec<MediaType>,

    /// Crop aspect ratio as width / height. Default: 16 / 9.
    pub aspect_ratio: f64,

    /// JPEG quality (1–100) for the re-encoded crop. Default: 95.
    pub jpeg_quality: u8,

    /// Bucket that receives uploads. Default: `"images"`.
    pub bucket: String,

    /// Cache lifetime in seconds sent with each upload. Default: `"3600"`.
    pub cache_control: String,

    /// File name the rasterised crop is wrapped in before upload; its
    /// extension becomes the extension of the storage path.
    /// Default: `"cropped-image.jpg"`.
    pub output_file_name: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_types: vec![MediaType::Jpeg, MediaType::Png, MediaType::Webp],
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            jpeg_quality: 95,
            bucket: "images".to_string(),
            cache_control: "3600".to_string(),
            output_file_name: "cropped-image.jpg".to_string(),
        }
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn allowed_types(mut self, types: impl IntoIterator<Item = MediaType>) -> Self {
        self.config.allowed_types = types.into_iter().collect();
        self
    }

    pub fn aspect_ratio(mut self, ratio: f64) -> Self {
        self.config.aspect_ratio = ratio;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn cache_control(mut self, secs: impl Into<String>) -> Self {
        self.config.cache_control = secs.into();
        self
    }

    pub fn output_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_file_name = name.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, FolioError> {
        let c = &self.config;
        if !c.aspect_ratio.is_finite() || c.aspect_ratio <= 0.0 {
            return Err(FolioError::InvalidConfig(format!(
                "Aspect ratio must be a positive number, got {}",
                c.aspect_ratio
            )));
        }
        if c.max_file_size == 0 {
            return Err(FolioError::InvalidConfig(
                "Maximum file size must be at least 1 byte".into(),
            ));
        }
        if c.allowed_types.is_empty() {
            return Err(FolioError::InvalidConfig(
                "At least one media type must be allowed".into(),
            ));
        }
        if c.bucket.trim().is_empty() {
            return Err(FolioError::InvalidConfig("Bucket name is empty".into()));
        }
        if !c.output_file_name.contains('.') {
            return Err(FolioError::InvalidConfig(format!(
                "Output file name '{}' has no extension",
                c.output_file_name
            )));
        }
        Ok(self.config)
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Connection details for the hosted row store and blob store.
///
/// Both share one base URL and one API key; the bucket is fixed for every
/// upload (images and documents land in the same one).
#[derive(Clone)]
pub struct StoreConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`. No trailing slash.
    pub base_url: String,

    /// API key sent as both `apikey` and bearer token.
    pub api_key: String,

    /// Bucket for all uploads.
    pub bucket: String,

    /// Per-request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl StoreConfig {
    pub const ENV_URL: &'static str = "FOLIO_STORE_URL";
    pub const ENV_KEY: &'static str = "FOLIO_STORE_KEY";
    pub const ENV_BUCKET: &'static str = "FOLIO_BUCKET";
    pub const ENV_TIMEOUT: &'static str = "FOLIO_STORE_TIMEOUT";

    pub fn builder(base_url: impl Into<String>, api_key: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder {
            config: StoreConfig {
                base_url: base_url.into(),
                api_key: api_key.into(),
                bucket: "images".to_string(),
                timeout_secs: 30,
            },
        }
    }

    /// Read the configuration from `FOLIO_STORE_URL`, `FOLIO_STORE_KEY`,
    /// and optionally `FOLIO_BUCKET` / `FOLIO_STORE_TIMEOUT`.
    pub fn from_env() -> Result<StoreConfig, FolioError> {
        let base_url = non_empty_env(Self::ENV_URL).ok_or(FolioError::MissingEnv {
            var: Self::ENV_URL,
            hint: "Set it to the project URL, e.g. https://<project>.supabase.co",
        })?;
        let api_key = non_empty_env(Self::ENV_KEY).ok_or(FolioError::MissingEnv {
            var: Self::ENV_KEY,
            hint: "Set it to the project's API key.",
        })?;

        let mut builder = Self::builder(base_url, api_key);
        if let Some(bucket) = non_empty_env(Self::ENV_BUCKET) {
            builder = builder.bucket(bucket);
        }
        if let Some(raw) = non_empty_env(Self::ENV_TIMEOUT) {
            let secs = raw.parse::<u64>().map_err(|_| {
                FolioError::InvalidConfig(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    Self::ENV_TIMEOUT,
                    raw
                ))
            })?;
            builder = builder.timeout_secs(secs);
        }
        builder.build()
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`StoreConfig`].
#[derive(Debug)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn build(mut self) -> Result<StoreConfig, FolioError> {
        let trimmed = self.config.base_url.trim().trim_end_matches('/').to_string();
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(FolioError::InvalidConfig(format!(
                "Store URL must start with http:// or https://, got '{}'",
                self.config.base_url
            )));
        }
        if self.config.api_key.trim().is_empty() {
            return Err(FolioError::InvalidConfig("Store API key is empty".into()));
        }
        if self.config.bucket.trim().is_empty() {
            return Err(FolioError::InvalidConfig("Bucket name is empty".into()));
        }
        self.config.base_url = trimmed;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intake_defaults() {
        let c = IntakeConfig::default();
        assert_eq!(c.max_file_size, 2_097_152);
        assert_eq!(c.jpeg_quality, 95);
        assert!((c.aspect_ratio - 16.0 / 9.0).abs() < f64::EPSILON);
        assert_eq!(c.allowed_types.len(), 3);
    }

    #[test]
    fn builder_rejects_bad_aspect_ratio() {
        for ratio in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            let err = IntakeConfig::builder().aspect_ratio(ratio).build();
            assert!(err.is_err(), "ratio {ratio} should be rejected");
        }
    }

    #[test]
    fn builder_clamps_quality() {
        let c = IntakeConfig::builder().jpeg_quality(0).build().unwrap();
        assert_eq!(c.jpeg_quality, 1);
        let c = IntakeConfig::builder().jpeg_quality(200).build().unwrap();
        assert_eq!(c.jpeg_quality, 100);
    }

    #[test]
    fn builder_requires_extension_on_output_name() {
        assert!(IntakeConfig::builder()
            .output_file_name("cropped")
            .build()
            .is_err());
    }

    #[test]
    fn store_config_trims_trailing_slash() {
        let c = StoreConfig::builder("https://demo.example.co/", "key")
            .build()
            .unwrap();
        assert_eq!(c.base_url, "https://demo.example.co");
    }

    #[test]
    fn store_config_rejects_non_http_url() {
        assert!(StoreConfig::builder("ftp://demo", "key").build().is_err());
        assert!(StoreConfig::builder("https://demo", " ").build().is_err());
    }

    #[test]
    fn store_config_debug_redacts_key() {
        let c = StoreConfig::builder("https://demo", "super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("redacted"));
    }
}
