//! Fixed-kernel Gaussian blur for single-frame speckle.

use ndarray::{Array2, Axis};

/// Normalized 1-D Gaussian kernel applied separably along both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Kernel of odd `size` with sigma derived from the size the way common
    /// imaging libraries do: `0.3 * ((size - 1) / 2 - 1) + 0.8`.
    pub fn new(size: usize) -> Self {
        let size = if size % 2 == 0 { size + 1 } else { size.max(1) };
        let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
        Self::with_sigma(size, sigma)
    }

    pub fn with_sigma(size: usize, sigma: f32) -> Self {
        let radius = (size / 2) as i32;
        let mut weights: Vec<f32> = (-radius..=radius)
            .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
            .collect();
        let sum: f32 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
        Self { weights }
    }

    pub fn size(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Blur rows then columns, mirroring at the borders without repeating
    /// the edge sample.
    pub fn apply(&self, input: &Array2<f32>) -> Array2<f32> {
        let horizontal = self.convolve_axis(input, Axis(1));
        self.convolve_axis(&horizontal, Axis(0))
    }

    fn convolve_axis(&self, input: &Array2<f32>, axis: Axis) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros(input.raw_dim());
        let radius = (self.weights.len() / 2) as isize;

        for (src_lane, mut dst_lane) in input.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
            let len = src_lane.len() as isize;
            for i in 0..len {
                let mut acc = 0.0;
                for (k, w) in self.weights.iter().enumerate() {
                    let j = reflect_101(i + k as isize - radius, len);
                    acc += src_lane[j] * w;
                }
                dst_lane[i as usize] = acc;
            }
        }

        out
    }
}

/// Mirror an out-of-range index back into `0..len` (`dcb|abcd|cba`).
fn reflect_101(mut i: isize, len: isize) -> usize {
    if len == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i as usize;
        }
    }
}
