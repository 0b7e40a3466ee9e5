//! Rasterisation: sample the confirmed crop out of the source image and
//! re-encode it as JPEG.
//!
//! The crop was drawn over a *displayed* copy of the image, usually smaller
//! than its natural size. Coordinates are therefore scaled by
//! `natural / displayed` on each axis before sampling, while the output
//! surface keeps the displayed size of the region. A 100 px wide selection
//! over a 4000 px photo shown at 800 px yields a 100 px wide JPEG sampled
//! from 500 source pixels.
//!
//! This is CPU-bound; async callers run it in `spawn_blocking`.

use crate::error::IntakeError;
use crate::pipeline::crop::{CropRegion, DisplaySize};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use std::fmt;
use tracing::debug;

/// An encoded crop, ready to upload.
#[derive(Clone)]
pub struct RasterizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RasterizedImage {
    pub fn content_type(&self) -> &'static str {
        "image/jpeg"
    }
}

impl fmt::Debug for RasterizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterizedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Crop `source` to `region` and encode the result as JPEG.
///
/// `display` is the size the image was shown at while the region was
/// drawn; `None` means it was shown at natural size. The output surface is
/// `round(width) × round(height)` of the region in displayed pixels.
pub fn rasterize(
    source: &[u8],
    region: &CropRegion,
    display: Option<DisplaySize>,
    quality: u8,
) -> Result<RasterizedImage, IntakeError> {
    // Once confirmed, a bad region is a rasterization failure.
    region.validate().map_err(|e| IntakeError::Rasterization {
        detail: e.to_string(),
    })?;

    let img = image::load_from_memory(source).map_err(|e| IntakeError::Rasterization {
        detail: format!("could not decode source image: {}", e),
    })?;
    let (natural_w, natural_h) = img.dimensions();
    if natural_w == 0 || natural_h == 0 {
        return Err(IntakeError::Rasterization {
            detail: "source image has no pixels".into(),
        });
    }

    let display = display.unwrap_or(DisplaySize::new(natural_w as f64, natural_h as f64));
    if !display.is_usable() {
        return Err(IntakeError::Rasterization {
            detail: format!("display size {} x {} is not usable", display.width, display.height),
        });
    }
    let scale_x = natural_w as f64 / display.width;
    let scale_y = natural_h as f64 / display.height;

    let region = region.constrain(display);
    let (out_w, out_h) = region.output_size();
    if out_w == 0 || out_h == 0 {
        return Err(IntakeError::Rasterization {
            detail: format!(
                "crop {:.2} x {:.2} at ({:.2}, {:.2}) leaves no pixels to draw",
                region.width, region.height, region.x, region.y
            ),
        });
    }

    let (sx, sy, sw, sh) = source_rect(&region, scale_x, scale_y, natural_w, natural_h);
    if sw == 0 || sh == 0 {
        return Err(IntakeError::Rasterization {
            detail: "crop lies outside the source image".into(),
        });
    }

    debug!(
        "Rasterizing {}x{} source px at ({}, {}) into {}x{} (scale {:.3} x {:.3})",
        sw, sh, sx, sy, out_w, out_h, scale_x, scale_y
    );

    let surface = img
        .crop_imm(sx, sy, sw, sh)
        .resize_exact(out_w, out_h, FilterType::Lanczos3)
        .to_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(&surface)
        .map_err(|e| IntakeError::Rasterization {
            detail: format!("JPEG encoding failed: {}", e),
        })?;
    if bytes.is_empty() {
        return Err(IntakeError::Rasterization {
            detail: "JPEG encoder produced no data".into(),
        });
    }

    Ok(RasterizedImage {
        bytes,
        width: out_w,
        height: out_h,
    })
}

/// Scale a displayed-pixel region into whole source pixels, clipped to the
/// source bounds.
fn source_rect(
    region: &CropRegion,
    scale_x: f64,
    scale_y: f64,
    natural_w: u32,
    natural_h: u32,
) -> (u32, u32, u32, u32) {
    let sx = to_px(region.x * scale_x).min(natural_w);
    let sy = to_px(region.y * scale_y).min(natural_h);
    let sw = to_px(region.width * scale_x).min(natural_w - sx);
    let sh = to_px(region.height * scale_y).min(natural_h - sy);
    (sx, sy, sw, sh)
}

fn to_px(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    const WIDE: f64 = 16.0 / 9.0;

    fn encode(img: RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    fn solid_jpeg(w: u32, h: u32) -> Vec<u8> {
        encode(RgbImage::from_pixel(w, h, Rgb([120, 80, 40])), ImageFormat::Jpeg)
    }

    #[test]
    fn output_matches_rounded_region() {
        let src = solid_jpeg(640, 360);
        let region = CropRegion::pixels(0.0, 0.0, 100.0, 56.25).with_aspect(WIDE);
        let out = rasterize(&src, &region, None, 95).unwrap();
        assert_eq!((out.width, out.height), (100, 56));

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (100, 56));
        assert_eq!(out.content_type(), "image/jpeg");
    }

    #[test]
    fn output_size_ignores_natural_resolution() {
        let region = CropRegion::pixels(10.0, 10.0, 200.0, 112.5);
        let display = DisplaySize::new(400.0, 225.0);
        for (w, h) in [(400, 225), (1600, 900), (3200, 1800), (200, 113)] {
            let out = rasterize(&solid_jpeg(w, h), &region, Some(display), 95).unwrap();
            assert_eq!((out.width, out.height), (200, 113), "natural {w}x{h}");
        }
    }

    #[test]
    fn samples_scaled_source_coordinates() {
        // Natural 200x100, left half red, right half blue, shown at 100x50.
        let mut img = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
        for x in 100..200 {
            for y in 0..100 {
                img.put_pixel(x, y, Rgb([0, 0, 255]));
            }
        }
        let src = encode(img, ImageFormat::Png);

        let region = CropRegion::pixels(50.0, 0.0, 50.0, 50.0);
        let out = rasterize(&src, &region, Some(DisplaySize::new(100.0, 50.0)), 95).unwrap();
        assert_eq!((out.width, out.height), (50, 50));

        let px = image::load_from_memory(&out.bytes).unwrap().to_rgb8();
        let Rgb([r, _, b]) = *px.get_pixel(25, 25);
        assert!(b > 200 && r < 60, "expected blue, got r={r} b={b}");
    }

    #[test]
    fn percent_region_uses_display_size() {
        let src = solid_jpeg(800, 450);
        let out = rasterize(
            &src,
            &CropRegion::initial(WIDE),
            Some(DisplaySize::new(400.0, 225.0)),
            95,
        )
        .unwrap();
        assert_eq!(out.width, 360);
        assert!((202..=203).contains(&out.height), "height {}", out.height);
    }

    #[test]
    fn undecodable_bytes_fail() {
        let region = CropRegion::pixels(0.0, 0.0, 10.0, 10.0);
        let err = rasterize(b"definitely not an image", &region, None, 95).unwrap_err();
        assert!(matches!(err, IntakeError::Rasterization { .. }));
    }

    #[test]
    fn sub_pixel_region_fails() {
        let src = solid_jpeg(64, 64);
        let region = CropRegion::pixels(0.0, 0.0, 0.3, 0.3);
        let err = rasterize(&src, &region, None, 95).unwrap_err();
        assert!(matches!(err, IntakeError::Rasterization { .. }));
    }

    #[test]
    fn region_outside_image_fails() {
        let src = solid_jpeg(64, 64);
        let region = CropRegion::pixels(500.0, 0.0, 10.0, 10.0);
        let err = rasterize(&src, &region, None, 95).unwrap_err();
        assert!(matches!(err, IntakeError::Rasterization { .. }));
    }

    #[test]
    fn empty_region_fails_as_rasterization() {
        let src = solid_jpeg(64, 64);
        let region = CropRegion::pixels(0.0, 0.0, 0.0, 10.0);
        let err = rasterize(&src, &region, None, 95).unwrap_err();
        assert!(matches!(err, IntakeError::Rasterization { .. }));
        assert_eq!(err.kind(), crate::error::IntakeErrorKind::Rasterization);
        assert!(err.to_string().contains("no area"), "got: {err}");
    }
}
