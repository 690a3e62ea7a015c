//! Depth frames delivered by the sensor.
//!
//! Samples are stored row-major as `[[y, x]]`, the same axis order every
//! scene layer uses.

use std::time::Instant;

use ndarray::Array2;

/// One instant of per-pixel distance readings.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    /// Distance samples, shape `(height, width)`.
    data: Array2<f32>,
    /// Monotonic frame counter assigned by the source.
    pub frame_number: u64,
    /// Arrival time.
    pub timestamp: Instant,
}

impl DepthFrame {
    pub fn new(data: Array2<f32>) -> Self {
        Self {
            data,
            frame_number: 0,
            timestamp: Instant::now(),
        }
    }

    /// Frame with every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self::new(Array2::from_elem((height as usize, width as usize), value))
    }

    /// Build a frame from raw millimetre readings in row-major order.
    ///
    /// Returns `None` when `samples` does not hold exactly `width * height`
    /// values.
    pub fn from_millimetres(width: u32, height: u32, samples: &[u16]) -> Option<Self> {
        let values: Vec<f32> = samples.iter().map(|&mm| mm as f32).collect();
        Array2::from_shape_vec((height as usize, width as usize), values)
            .ok()
            .map(Self::new)
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    /// `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Sample at `(x, y)`, `None` outside the frame.
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.data.get((y as usize, x as usize)).copied()
    }
}
