//! Temporal depth filter.
//!
//! First-order low-pass over successive frames: for a constant input held
//! across `n` frames the residual error decays as `(1 - alpha)^n`.

mod spatial;

use ndarray::Array2;

pub use spatial::GaussianKernel;

/// Exponential smoothing of depth maps with optional spatial pre-blur.
#[derive(Debug, Clone)]
pub struct TemporalDepthFilter {
    alpha: f32,
    blur: Option<GaussianKernel>,
    /// Most recent smoothed frame.
    previous: Option<Array2<f32>>,
}

impl TemporalDepthFilter {
    /// `alpha` is the weight of the newest frame and is clamped to (0, 1].
    pub fn new(alpha: f32) -> Self {
        let clamped = alpha.clamp(f32::MIN_POSITIVE, 1.0);
        if clamped != alpha {
            tracing::warn!(alpha, clamped, "Smoothing alpha out of range");
        }
        Self {
            alpha: clamped,
            blur: None,
            previous: None,
        }
    }

    /// Blur each incoming frame with a Gaussian of odd `kernel_size` before
    /// blending.
    pub fn with_blur(mut self, kernel_size: usize) -> Self {
        self.blur = Some(GaussianKernel::new(kernel_size));
        self
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn has_state(&self) -> bool {
        self.previous.is_some()
    }

    /// Forget history; the next frame passes through unchanged.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Blend `frame` into the history and return the smoothed result.
    pub fn apply(&mut self, frame: Array2<f32>) -> Array2<f32> {
        let current = match &self.blur {
            Some(kernel) => kernel.apply(&frame),
            None => frame,
        };

        let smoothed = match self.previous.take() {
            Some(previous) if previous.dim() == current.dim() => {
                let alpha = self.alpha;
                let mut blended = previous;
                blended.zip_mut_with(&current, |p, &c| *p = (1.0 - alpha) * *p + alpha * c);
                blended
            }
            Some(previous) => {
                tracing::warn!(
                    previous = ?previous.dim(),
                    current = ?current.dim(),
                    "Depth frame size changed, restarting smoothing"
                );
                current
            }
            None => current,
        };

        self.previous = Some(smoothed.clone());
        smoothed
    }
}
