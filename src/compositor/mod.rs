//! Per-frame compositing.
//!
//! warp -> normalize -> smooth -> threshold -> select texture or background.
//! Every step runs on every frame, in that order.

use image::RgbImage;
use ndarray::{Array2, Zip};

use crate::calibration::{warp_depth, Homography};
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::filter::TemporalDepthFilter;
use crate::frame::DepthFrame;
use crate::scene::{Scene, NO_FOSSIL};

/// Clamp to `[0, max_depth]` and divide by `max_depth`.
///
/// Monotonic: 0 maps to 0.0, anything at or beyond `max_depth` maps to 1.0.
/// Non-finite readings count as out of range.
pub fn normalize_depth(depth: &Array2<f32>, max_depth: f32) -> Array2<f32> {
    depth.mapv(|d| {
        if d.is_finite() {
            d.clamp(0.0, max_depth) / max_depth
        } else {
            1.0
        }
    })
}

/// Pixels where the sand is dug down to (or past) the owning fossil's reveal
/// depth. Pixels without a fossil are never revealed.
pub fn reveal_mask(smoothed: &Array2<f32>, scene: &Scene) -> Array2<bool> {
    let mut mask = Array2::from_elem(smoothed.raw_dim(), false);
    Zip::from(&mut mask)
        .and(smoothed)
        .and(scene.depth_threshold())
        .and(scene.ids())
        .for_each(|m, &depth, &threshold, &id| {
            *m = id != NO_FOSSIL && depth <= threshold;
        });
    mask
}

/// Turns depth frames into projector images for one scene.
///
/// Owns the smoothing state; one compositor per session.
pub struct FrameCompositor {
    max_depth: f32,
    filter: TemporalDepthFilter,
}

impl FrameCompositor {
    pub fn new(config: &SandboxConfig) -> Self {
        let mut filter = TemporalDepthFilter::new(config.smoothing.alpha);
        if let Some(kernel) = config.smoothing.blur_kernel {
            filter = filter.with_blur(kernel);
        }
        Self::with_filter(config.max_depth, filter)
    }

    pub fn with_filter(max_depth: f32, filter: TemporalDepthFilter) -> Self {
        Self { max_depth, filter }
    }

    /// Forget smoothing history (e.g. after recalibration).
    pub fn reset(&mut self) {
        self.filter.reset();
    }

    /// Composite one frame.
    ///
    /// Without a homography the frame must already match the scene size.
    pub fn composite(
        &mut self,
        frame: &DepthFrame,
        scene: &Scene,
        homography: Option<&Homography>,
    ) -> Result<RgbImage> {
        let (width, height) = scene.size();

        let rectified = match homography {
            Some(h) => warp_depth(frame, h, width, height),
            None => frame.clone(),
        };
        if rectified.size() != (width, height) {
            return Err(SandboxError::FrameSizeMismatch {
                expected: (width, height),
                actual: rectified.size(),
            });
        }

        let normalized = normalize_depth(rectified.data(), self.max_depth);
        let smoothed = self.filter.apply(normalized);
        let mask = reveal_mask(&smoothed, scene);

        let texture = scene.texture();
        let background = scene.background();
        let output = RgbImage::from_fn(width, height, |x, y| {
            if mask[[y as usize, x as usize]] {
                *texture.get_pixel(x, y)
            } else {
                *background.get_pixel(x, y)
            }
        });

        tracing::trace!(
            frame = frame.frame_number,
            revealed = mask.iter().filter(|&&m| m).count(),
            "Frame composited"
        );

        Ok(output)
    }
}
