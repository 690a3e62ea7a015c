//! Sandbox session: sensor in, projector out.
//!
//! The session owns the scene, the compositor and both endpoints. Control
//! point edits arrive through a shared [`CalibrationHandle`]; the homography
//! is read once at the start of each frame so a frame never mixes two.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::calibration::CalibrationHandle;
use crate::compositor::FrameCompositor;
use crate::display::DisplaySink;
use crate::error::Result;
use crate::scene::Scene;
use crate::sensor::DepthSource;
use crate::telemetry::PipelineTimer;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Cloneable stop request for a running session.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Why [`SandboxSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The depth source ran out of frames.
    StreamEnded,
    /// A [`StopHandle`] was triggered.
    Stopped,
}

pub struct SandboxSession<S: DepthSource, K: DisplaySink> {
    scene: Scene,
    compositor: FrameCompositor,
    calibration: CalibrationHandle,
    source: S,
    sink: K,
    stop: StopHandle,
    timer: PipelineTimer,
}

impl<S: DepthSource, K: DisplaySink> SandboxSession<S, K> {
    pub fn new(
        scene: Scene,
        compositor: FrameCompositor,
        calibration: CalibrationHandle,
        source: S,
        sink: K,
    ) -> Self {
        Self {
            scene,
            compositor,
            calibration,
            source,
            sink,
            stop: StopHandle::default(),
            timer: PipelineTimer::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn calibration(&self) -> &CalibrationHandle {
        &self.calibration
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn timer(&self) -> &PipelineTimer {
        &self.timer
    }

    /// Pull, composite and present one frame.
    ///
    /// Returns `Ok(false)` once the source has no more frames.
    pub fn process_frame(&mut self) -> Result<bool> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(false);
        };

        let started = Instant::now();
        let homography = self.calibration.current_homography();
        let output = self
            .compositor
            .composite(&frame, &self.scene, homography.as_ref())?;
        self.timer.record(started.elapsed());

        self.sink.present(&output)?;
        Ok(true)
    }

    /// Run until the stream ends, a stop is requested or a step fails.
    pub fn run(&mut self) -> Result<SessionEnd> {
        tracing::info!(
            width = self.scene.width(),
            height = self.scene.height(),
            fossils = self.scene.fossils().len(),
            "Session started"
        );
        let mut last_report = Instant::now();

        let end = loop {
            if self.stop.is_stopped() {
                break SessionEnd::Stopped;
            }
            if !self.process_frame()? {
                break SessionEnd::StreamEnded;
            }
            if last_report.elapsed() >= STATS_INTERVAL {
                self.log_stats();
                last_report = Instant::now();
            }
        };

        self.log_stats();
        tracing::info!(?end, frames = self.timer.total_frames(), "Session finished");
        Ok(end)
    }

    fn log_stats(&self) {
        let stats = self.timer.stats();
        if stats.sample_count == 0 {
            return;
        }
        tracing::info!(
            avg_ms = format!("{:.2}", stats.avg_ms),
            p95_ms = format!("{:.2}", stats.p95_ms),
            max_ms = format!("{:.2}", stats.max_ms),
            frames = self.timer.total_frames(),
            "Pipeline timing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PerspectiveCalibrator;
    use crate::display::MemorySink;
    use crate::error::SandboxError;
    use crate::filter::TemporalDepthFilter;
    use crate::frame::DepthFrame;
    use crate::sensor::FrameQueue;

    fn session(frames: Vec<DepthFrame>) -> SandboxSession<FrameQueue, MemorySink> {
        SandboxSession::new(
            Scene::empty(4, 3, [5, 5, 5]),
            FrameCompositor::with_filter(630.0, TemporalDepthFilter::new(0.5)),
            CalibrationHandle::new(PerspectiveCalibrator::new(4, 3)),
            FrameQueue::new(frames),
            MemorySink::new(),
        )
    }

    #[test]
    fn test_runs_until_stream_ends() {
        let frames = (0..3).map(|i| DepthFrame::filled(4, 3, 300.0).with_frame_number(i)).collect();
        let mut session = session(frames);
        assert_eq!(session.run().unwrap(), SessionEnd::StreamEnded);
        assert_eq!(session.sink().frames.len(), 3);
        assert_eq!(session.timer().total_frames(), 3);
    }

    #[test]
    fn test_stop_before_first_frame() {
        let mut session = session(vec![DepthFrame::filled(4, 3, 300.0)]);
        session.stop_handle().stop();
        assert_eq!(session.run().unwrap(), SessionEnd::Stopped);
        assert!(session.sink().frames.is_empty());
    }

    #[test]
    fn test_size_mismatch_aborts() {
        let mut session = session(vec![DepthFrame::filled(8, 8, 300.0)]);
        assert!(matches!(
            session.run(),
            Err(SandboxError::FrameSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_calibration_edits_apply_to_next_frame() {
        let mut session = session(vec![
            DepthFrame::filled(4, 3, 300.0),
            DepthFrame::filled(8, 6, 300.0),
        ]);
        assert!(session.process_frame().unwrap());

        // sensor resolution doubled; map the canonical corners onto it
        let calibration = session.calibration().clone();
        calibration.set_control_points([
            glam::Vec2::new(0.0, 0.0),
            glam::Vec2::new(8.0, 0.0),
            glam::Vec2::new(8.0, 6.0),
            glam::Vec2::new(0.0, 6.0),
        ]);
        assert!(session.process_frame().unwrap());
        assert_eq!(session.sink().frames.len(), 2);
        assert_eq!(session.sink().frames[1].dimensions(), (4, 3));
    }
}
