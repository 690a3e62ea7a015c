//! Depth visualisation for the calibration UI.

use image::{Rgb, RgbImage};

use super::calibrator::PerspectiveCalibrator;
use super::warp::warp_rgb;
use crate::frame::DepthFrame;

/// Millimetre-to-intensity scale that spreads a typical tabletop range
/// across the colormap.
pub const DEFAULT_PREVIEW_SCALE: f32 = 0.03;

/// Jet colormap for `t` in [0, 1]: blue for near, red for far.
pub fn jet(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |offset: f32| {
        let v = (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Color a raw depth frame. Each sample is multiplied by `scale`, saturated
/// to 0..=255 and passed through the jet colormap.
pub fn depth_preview(frame: &DepthFrame, scale: f32) -> RgbImage {
    let data = frame.data();
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let intensity = (data[[y as usize, x as usize]] * scale).abs().round().min(255.0);
        jet(intensity / 255.0)
    })
}

/// Depth preview rectified through the calibrator's current homography.
///
/// Without a homography the unwarped preview is returned.
pub fn calibration_preview(
    frame: &DepthFrame,
    calibrator: &PerspectiveCalibrator,
    scale: f32,
) -> RgbImage {
    let preview = depth_preview(frame, scale);
    match calibrator.current_homography() {
        Some(h) => {
            let (w, h_px) = calibrator.canonical_size();
            warp_rgb(&preview, &h, w, h_px)
        }
        None => preview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet(0.0), Rgb([0, 0, 128]));
        assert_eq!(jet(1.0), Rgb([128, 0, 0]));
        assert_eq!(jet(0.5), Rgb([128, 255, 128]));
    }

    #[test]
    fn test_preview_size_and_saturation() {
        let frame = DepthFrame::filled(4, 3, 100_000.0);
        let preview = depth_preview(&frame, DEFAULT_PREVIEW_SCALE);
        assert_eq!(preview.dimensions(), (4, 3));
        assert_eq!(*preview.get_pixel(0, 0), jet(1.0));
    }

    #[test]
    fn test_calibration_preview_uses_canonical_size() {
        let frame = DepthFrame::filled(8, 6, 0.0);
        let mut calibrator = PerspectiveCalibrator::new(4, 3);
        assert_eq!(calibration_preview(&frame, &calibrator, 1.0).dimensions(), (8, 6));

        calibrator.set_control_points([
            glam::Vec2::new(0.0, 0.0),
            glam::Vec2::new(8.0, 0.0),
            glam::Vec2::new(8.0, 6.0),
            glam::Vec2::new(0.0, 6.0),
        ]);
        let rectified = calibration_preview(&frame, &calibrator, 1.0);
        assert_eq!(rectified.dimensions(), (4, 3));
        assert_eq!(*rectified.get_pixel(1, 1), jet(0.0));
    }
}
