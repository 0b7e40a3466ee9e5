//! Crop geometry: the user's selection rectangle over the displayed image.
//!
//! A [`CropRegion`] is expressed either in percent of the displayed image or
//! in displayed pixels. The interactive editor mutates it continuously; when
//! an aspect ratio is set every resize keeps `width / height == aspect`.
//! Rasterisation always works in pixels, so [`CropRegion::to_pixels`] and
//! [`CropRegion::constrain`] run once, at confirmation.

use crate::error::IntakeError;
use serde::{Deserialize, Serialize};

/// Unit of a [`CropRegion`]'s coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropUnit {
    /// Percent (0–100) of the displayed width / height.
    Percent,
    /// Pixels of the displayed image.
    Pixel,
}

/// Size at which the source image is shown to the user.
///
/// Usually smaller than the natural size; the ratio between the two is the
/// scale factor applied when sampling the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub(crate) fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// A rectangle selected over the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub unit: CropUnit,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Locked width / height ratio, if any.
    pub aspect: Option<f64>,
}

impl CropRegion {
    /// The region an intake session opens with: 90 % wide, 5 % in from the
    /// top-left corner, height derived from the aspect ratio.
    pub fn initial(aspect: f64) -> Self {
        let width = 90.0;
        Self {
            unit: CropUnit::Percent,
            x: 5.0,
            y: 5.0,
            width,
            height: width / aspect,
            aspect: Some(aspect),
        }
    }

    /// A free-form region in displayed pixels.
    pub fn pixels(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Pixel,
            x,
            y,
            width,
            height,
            aspect: None,
        }
    }

    /// A free-form region in percent of the displayed image.
    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Percent,
            ..Self::pixels(x, y, width, height)
        }
    }

    /// Lock the aspect ratio. Existing dimensions are left as they are;
    /// the lock applies from the next resize on.
    pub fn with_aspect(mut self, aspect: f64) -> Self {
        self.aspect = Some(aspect);
        self
    }

    /// Width-driven resize.
    pub fn resize_width(&mut self, width: f64) {
        self.width = width;
        if let Some(aspect) = self.aspect {
            self.height = width / aspect;
        }
    }

    /// Height-driven resize.
    pub fn resize_height(&mut self, height: f64) {
        self.height = height;
        if let Some(aspect) = self.aspect {
            self.width = height * aspect;
        }
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    /// Reject empty, negative and non-finite rectangles.
    pub fn validate(&self) -> Result<(), IntakeError> {
        let fields = [self.x, self.y, self.width, self.height];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(IntakeError::InvalidCrop {
                detail: format!("non-finite coordinate in {:?}", self),
            });
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(IntakeError::InvalidCrop {
                detail: format!("{} x {} has no area", self.width, self.height),
            });
        }
        if let Some(aspect) = self.aspect {
            if !aspect.is_finite() || aspect <= 0.0 {
                return Err(IntakeError::InvalidCrop {
                    detail: format!("aspect ratio {aspect} is not positive"),
                });
            }
        }
        Ok(())
    }

    /// Express the region in displayed pixels.
    ///
    /// A percent region with a locked aspect has its height re-derived in
    /// pixel space, since percent-of-width and percent-of-height differ
    /// whenever the image is not square.
    pub fn to_pixels(&self, display: DisplaySize) -> CropRegion {
        match self.unit {
            CropUnit::Pixel => *self,
            CropUnit::Percent => {
                let width = self.width * display.width / 100.0;
                let height = match self.aspect {
                    Some(aspect) => width / aspect,
                    None => self.height * display.height / 100.0,
                };
                CropRegion {
                    unit: CropUnit::Pixel,
                    x: self.x * display.width / 100.0,
                    y: self.y * display.height / 100.0,
                    width,
                    height,
                    aspect: self.aspect,
                }
            }
        }
    }

    /// Clip a pixel region so it lies inside the displayed image.
    ///
    /// When clipping changes the size of an aspect-locked region, the
    /// longer side is shortened again until the ratio holds.
    pub fn constrain(&self, display: DisplaySize) -> CropRegion {
        let mut r = self.to_pixels(display);
        r.x = r.x.clamp(0.0, display.width);
        r.y = r.y.clamp(0.0, display.height);

        let max_w = display.width - r.x;
        let max_h = display.height - r.y;
        let clipped = r.width > max_w || r.height > max_h;
        r.width = r.width.min(max_w);
        r.height = r.height.min(max_h);

        if clipped {
            if let Some(aspect) = r.aspect {
                let height_for_width = r.width / aspect;
                if height_for_width > r.height {
                    r.width = r.height * aspect;
                } else {
                    r.height = height_for_width;
                }
            }
        }
        r
    }

    /// Pixel size of the surface this region rasterises to.
    pub fn output_size(&self) -> (u32, u32) {
        (round_px(self.width), round_px(self.height))
    }
}

fn round_px(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDE: f64 = 16.0 / 9.0;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn initial_region_is_centered_and_locked() {
        let r = CropRegion::initial(WIDE);
        assert_eq!(r.unit, CropUnit::Percent);
        assert_eq!((r.x, r.y, r.width), (5.0, 5.0, 90.0));
        assert!(close(r.height, 50.625));
        assert_eq!(r.aspect, Some(WIDE));
    }

    #[test]
    fn width_resize_derives_height_for_any_ratio() {
        for aspect in [0.25, 1.0, 4.0 / 3.0, WIDE, 3.0, 21.0 / 9.0] {
            let mut r = CropRegion::pixels(0.0, 0.0, 10.0, 10.0).with_aspect(aspect);
            for width in [1.0, 33.3, 100.0, 640.0] {
                r.resize_width(width);
                assert!(close(r.width / r.height, aspect), "aspect {aspect}, width {width}");
            }
        }
    }

    #[test]
    fn height_resize_derives_width() {
        let mut r = CropRegion::pixels(0.0, 0.0, 10.0, 10.0).with_aspect(WIDE);
        r.resize_height(90.0);
        assert!(close(r.width, 160.0));
    }

    #[test]
    fn free_resize_leaves_other_side() {
        let mut r = CropRegion::pixels(0.0, 0.0, 10.0, 20.0);
        r.resize_width(50.0);
        assert_eq!((r.width, r.height), (50.0, 20.0));
    }

    #[test]
    fn validate_rejects_empty_and_nan() {
        assert!(CropRegion::pixels(0.0, 0.0, 0.0, 5.0).validate().is_err());
        assert!(CropRegion::pixels(0.0, 0.0, 5.0, -1.0).validate().is_err());
        assert!(CropRegion::pixels(f64::NAN, 0.0, 5.0, 5.0).validate().is_err());
        assert!(CropRegion::pixels(0.0, 0.0, 5.0, 5.0).validate().is_ok());
    }

    #[test]
    fn percent_to_pixels_uses_display_size() {
        let r = CropRegion::percent(10.0, 20.0, 50.0, 25.0);
        let px = r.to_pixels(DisplaySize::new(800.0, 400.0));
        assert_eq!(px.unit, CropUnit::Pixel);
        assert_eq!((px.x, px.y, px.width, px.height), (80.0, 80.0, 400.0, 100.0));
    }

    #[test]
    fn locked_percent_region_keeps_ratio_in_pixels() {
        let px = CropRegion::initial(WIDE).to_pixels(DisplaySize::new(640.0, 480.0));
        assert!(close(px.width, 576.0));
        assert!(close(px.width / px.height, WIDE));
    }

    #[test]
    fn constrain_is_identity_inside_bounds() {
        let r = CropRegion::pixels(0.0, 0.0, 100.0, 56.25).with_aspect(WIDE);
        assert_eq!(r.constrain(DisplaySize::new(640.0, 360.0)), r);
    }

    #[test]
    fn constrain_clips_and_restores_ratio() {
        let r = CropRegion::pixels(600.0, 0.0, 160.0, 90.0).with_aspect(WIDE);
        let c = r.constrain(DisplaySize::new(640.0, 360.0));
        assert!(close(c.width, 40.0));
        assert!(close(c.width / c.height, WIDE));
        assert!(c.x + c.width <= 640.0);
    }

    #[test]
    fn constrain_clamps_negative_origin() {
        let r = CropRegion::pixels(-10.0, -5.0, 50.0, 50.0);
        let c = r.constrain(DisplaySize::new(100.0, 100.0));
        assert_eq!((c.x, c.y), (0.0, 0.0));
    }

    #[test]
    fn output_size_rounds() {
        assert_eq!(CropRegion::pixels(0.0, 0.0, 100.0, 56.25).output_size(), (100, 56));
        assert_eq!(CropRegion::pixels(0.0, 0.0, 99.5, 0.4).output_size(), (100, 0));
    }
}
