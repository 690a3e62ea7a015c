//! Perspective calibration from four control points to the canonical
//! rectangle.

mod calibrator;
mod homography;
mod preview;
mod warp;

pub use calibrator::{CalibrationHandle, PerspectiveCalibrator, Recompute};
pub use homography::{solve_homography, CalibrationError, Homography};
pub use preview::{calibration_preview, depth_preview, jet, DEFAULT_PREVIEW_SCALE};
pub use warp::{warp_depth, warp_rgb, UNSEEN_DEPTH};
