//! Frame pipeline timing
//!
//! Keeps a rolling window of per-frame compositing durations.

use std::collections::VecDeque;
use std::time::Duration;

/// Timing statistics over the rolling window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Average frame time in milliseconds
    pub avg_ms: f64,
    /// Minimum frame time in milliseconds
    pub min_ms: f64,
    /// Maximum frame time in milliseconds
    pub max_ms: f64,
    /// 95th percentile frame time
    pub p95_ms: f64,
    /// Number of samples in the statistics
    pub sample_count: usize,
}

/// Rolling window of pipeline durations
pub struct PipelineTimer {
    samples: VecDeque<Duration>,
    max_samples: usize,
    total_frames: u64,
}

impl Default for PipelineTimer {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PipelineTimer {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            total_frames: 0,
        }
    }

    /// Record how long one frame took to composite
    pub fn record(&mut self, duration: Duration) {
        self.samples.push_back(duration);
        if self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        self.total_frames += 1;
    }

    /// Frames recorded since creation
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn stats(&self) -> PipelineStats {
        if self.samples.is_empty() {
            return PipelineStats::default();
        }

        let mut times: Vec<f64> = self
            .samples
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let sum: f64 = times.iter().sum();
        PipelineStats {
            avg_ms: sum / times.len() as f64,
            min_ms: times[0],
            max_ms: times[times.len() - 1],
            p95_ms: percentile(&times, 0.95),
            sample_count: times.len(),
        }
    }
}

/// Calculate percentile from sorted array
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx]
}
