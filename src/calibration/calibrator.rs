//! Control point state and the shared calibration handle.

use std::sync::Arc;

use glam::Vec2;
use parking_lot::RwLock;

use super::homography::{solve_homography, CalibrationError, Homography};
use super::warp::warp_depth;
use crate::frame::DepthFrame;

/// Outcome of a recomputation triggered by a control point change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recompute {
    /// A new homography replaced the previous one.
    Updated,
    /// The points were degenerate; the previous homography (or none) stays.
    Retained,
}

/// Holds the four control points (top-left, top-right, bottom-right,
/// bottom-left) and the homography derived from them.
#[derive(Debug, Clone)]
pub struct PerspectiveCalibrator {
    control_points: [Vec2; 4],
    canonical_width: u32,
    canonical_height: u32,
    homography: Option<Homography>,
    /// Bumped on every successful recomputation.
    revision: u64,
}

impl PerspectiveCalibrator {
    /// Start with control points on the canonical corners and no homography.
    pub fn new(canonical_width: u32, canonical_height: u32) -> Self {
        let mut calibrator = Self {
            control_points: [Vec2::ZERO; 4],
            canonical_width,
            canonical_height,
            homography: None,
            revision: 0,
        };
        calibrator.control_points = calibrator.canonical_corners();
        calibrator
    }

    /// Canonical rectangle corners in control point order.
    pub fn canonical_corners(&self) -> [Vec2; 4] {
        let w = self.canonical_width as f32;
        let h = self.canonical_height as f32;
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(w, 0.0),
            Vec2::new(w, h),
            Vec2::new(0.0, h),
        ]
    }

    pub fn canonical_size(&self) -> (u32, u32) {
        (self.canonical_width, self.canonical_height)
    }

    pub fn control_points(&self) -> [Vec2; 4] {
        self.control_points
    }

    pub fn control_point(&self, index: usize) -> Option<Vec2> {
        self.control_points.get(index).copied()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Move one control point and recompute.
    ///
    /// The point is stored even when the resulting configuration is
    /// degenerate, so dragging through a collinear position and out again
    /// works.
    pub fn update_control_point(
        &mut self,
        index: usize,
        position: Vec2,
    ) -> Result<Recompute, CalibrationError> {
        let slot = self
            .control_points
            .get_mut(index)
            .ok_or(CalibrationError::InvalidIndex(index))?;
        *slot = position;
        Ok(self.recompute())
    }

    /// Replace all four control points at once and recompute.
    pub fn set_control_points(&mut self, points: [Vec2; 4]) -> Recompute {
        self.control_points = points;
        self.recompute()
    }

    fn recompute(&mut self) -> Recompute {
        match solve_homography(&self.control_points, &self.canonical_corners()) {
            Ok(h) => {
                self.homography = Some(h);
                self.revision += 1;
                tracing::debug!(revision = self.revision, matrix = ?h.to_rows(), "Homography updated");
                Recompute::Updated
            }
            Err(e) => {
                tracing::warn!(
                    points = ?self.control_points,
                    "Keeping previous homography: {}",
                    e
                );
                Recompute::Retained
            }
        }
    }

    pub fn current_homography(&self) -> Option<Homography> {
        self.homography
    }

    /// Drop the homography and move the points back to the canonical corners.
    pub fn reset(&mut self) {
        self.control_points = self.canonical_corners();
        self.homography = None;
        self.revision += 1;
    }

    /// Warp a frame into canonical coordinates, or return it unchanged when
    /// no homography is set.
    pub fn warp(&self, frame: &DepthFrame, width: u32, height: u32) -> DepthFrame {
        match &self.homography {
            Some(h) => warp_depth(frame, h, width, height),
            None => frame.clone(),
        }
    }
}

/// Thread-safe handle shared between the calibration UI and the frame loop.
///
/// Single writer, last value wins: the frame loop copies the homography at
/// the start of each frame.
#[derive(Debug, Clone)]
pub struct CalibrationHandle {
    inner: Arc<RwLock<PerspectiveCalibrator>>,
}

impl CalibrationHandle {
    pub fn new(calibrator: PerspectiveCalibrator) -> Self {
        Self {
            inner: Arc::new(RwLock::new(calibrator)),
        }
    }

    pub fn update_control_point(
        &self,
        index: usize,
        position: Vec2,
    ) -> Result<Recompute, CalibrationError> {
        self.inner.write().update_control_point(index, position)
    }

    pub fn set_control_points(&self, points: [Vec2; 4]) -> Recompute {
        self.inner.write().set_control_points(points)
    }

    pub fn current_homography(&self) -> Option<Homography> {
        self.inner.read().current_homography()
    }

    pub fn control_points(&self) -> [Vec2; 4] {
        self.inner.read().control_points()
    }

    pub fn reset(&self) {
        self.inner.write().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_uncalibrated() {
        let calibrator = PerspectiveCalibrator::new(640, 480);
        assert!(calibrator.current_homography().is_none());
        assert_eq!(calibrator.control_points(), calibrator.canonical_corners());
    }

    #[test]
    fn test_update_recomputes() {
        let mut calibrator = PerspectiveCalibrator::new(640, 480);
        let outcome = calibrator
            .update_control_point(0, Vec2::new(10.0, 12.0))
            .unwrap();
        assert_eq!(outcome, Recompute::Updated);

        let h = calibrator.current_homography().unwrap();
        let (x, y) = h.transform_point(10.0, 12.0).unwrap();
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
        let (x, y) = h.transform_point(640.0, 480.0).unwrap();
        assert!((x - 640.0).abs() < 1e-6 && (y - 480.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_update_keeps_previous() {
        let mut calibrator = PerspectiveCalibrator::new(640, 480);
        calibrator
            .update_control_point(0, Vec2::new(20.0, 20.0))
            .unwrap();
        let before = calibrator.current_homography();
        let revision = calibrator.revision();

        // top-left on the diagonal between top-right and bottom-left
        let outcome = calibrator
            .update_control_point(0, Vec2::new(320.0, 240.0))
            .unwrap();
        assert_eq!(outcome, Recompute::Retained);
        assert_eq!(calibrator.current_homography(), before);
        assert_eq!(calibrator.revision(), revision);
        assert_eq!(calibrator.control_point(0), Some(Vec2::new(320.0, 240.0)));
    }

    #[test]
    fn test_collinear_before_any_calibration_stays_none() {
        let mut calibrator = PerspectiveCalibrator::new(640, 480);
        let outcome = calibrator.set_control_points([
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(20.0, 0.0),
            Vec2::new(0.0, 10.0),
        ]);
        assert_eq!(outcome, Recompute::Retained);
        assert!(calibrator.current_homography().is_none());
    }

    #[test]
    fn test_invalid_index() {
        let mut calibrator = PerspectiveCalibrator::new(640, 480);
        assert_eq!(
            calibrator.update_control_point(4, Vec2::ZERO),
            Err(CalibrationError::InvalidIndex(4))
        );
    }

    #[test]
    fn test_warp_without_homography_is_identity() {
        let calibrator = PerspectiveCalibrator::new(4, 4);
        let frame = DepthFrame::filled(3, 2, 7.0);
        let out = calibrator.warp(&frame, 4, 4);
        assert_eq!(out.size(), (3, 2));
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn test_handle_is_shared() {
        let handle = CalibrationHandle::new(PerspectiveCalibrator::new(640, 480));
        let ui = handle.clone();
        let thread = std::thread::spawn(move || {
            ui.update_control_point(2, Vec2::new(600.0, 470.0)).unwrap()
        });
        assert_eq!(thread.join().unwrap(), Recompute::Updated);
        assert!(handle.current_homography().is_some());
        assert_eq!(handle.control_points()[2], Vec2::new(600.0, 470.0));
    }
}
