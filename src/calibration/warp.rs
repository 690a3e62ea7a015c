//! Inverse perspective mapping.
//!
//! Every output pixel is mapped back through `H^-1` and bilinearly sampled
//! from the source. Depth samples that land outside the source have no
//! reading and come out as [`UNSEEN_DEPTH`]; RGB samples come out black.

use image::{Rgb, RgbImage};
use ndarray::Array2;

use super::homography::Homography;
use crate::frame::DepthFrame;

/// Depth written where the sensor has no view. Normalizes to fully buried.
pub const UNSEEN_DEPTH: f32 = f32::INFINITY;

/// Bilinear sampling weights for one output pixel.
struct Sample {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    fx: f32,
    fy: f32,
}

impl Sample {
    fn weights(&self) -> [f32; 4] {
        [
            (1.0 - self.fx) * (1.0 - self.fy),
            self.fx * (1.0 - self.fy),
            (1.0 - self.fx) * self.fy,
            self.fx * self.fy,
        ]
    }
}

/// Row-major inverse matrix used per pixel.
fn inverse_rows(h: &Homography) -> [[f64; 3]; 3] {
    // A valid Homography is invertible; fall back to identity if rounding
    // says otherwise.
    h.inverse()
        .unwrap_or_else(Homography::identity)
        .to_rows()
}

fn locate(inv: &[[f64; 3]; 3], x: u32, y: u32, src_w: usize, src_h: usize) -> Option<Sample> {
    let (x, y) = (x as f64, y as f64);
    let w = inv[2][0] * x + inv[2][1] * y + inv[2][2];
    if w.abs() < 1e-12 {
        return None;
    }
    let sx = (inv[0][0] * x + inv[0][1] * y + inv[0][2]) / w;
    let sy = (inv[1][0] * x + inv[1][1] * y + inv[1][2]) / w;

    if !(sx >= 0.0 && sy >= 0.0 && sx <= (src_w - 1) as f64 && sy <= (src_h - 1) as f64) {
        return None;
    }

    let x0 = sx.floor() as usize;
    let y0 = sy.floor() as usize;
    Some(Sample {
        x0,
        y0,
        x1: (x0 + 1).min(src_w - 1),
        y1: (y0 + 1).min(src_h - 1),
        fx: (sx - x0 as f64) as f32,
        fy: (sy - y0 as f64) as f32,
    })
}

/// Warp a depth frame into a `width x height` canonical frame.
///
/// Pixels the sensor does not cover are set to [`UNSEEN_DEPTH`].
pub fn warp_depth(frame: &DepthFrame, h: &Homography, width: u32, height: u32) -> DepthFrame {
    let src = frame.data();
    let (src_h, src_w) = src.dim();
    let inv = inverse_rows(h);

    let mut out = Array2::from_elem((height as usize, width as usize), UNSEEN_DEPTH);
    if src_w == 0 || src_h == 0 {
        return DepthFrame::new(out).with_frame_number(frame.frame_number);
    }

    for ((y, x), value) in out.indexed_iter_mut() {
        if let Some(s) = locate(&inv, x as u32, y as u32, src_w, src_h) {
            let [w00, w10, w01, w11] = s.weights();
            *value = src[[s.y0, s.x0]] * w00
                + src[[s.y0, s.x1]] * w10
                + src[[s.y1, s.x0]] * w01
                + src[[s.y1, s.x1]] * w11;
        }
    }

    let mut warped = DepthFrame::new(out).with_frame_number(frame.frame_number);
    warped.timestamp = frame.timestamp;
    warped
}

/// Warp an RGB image into a `width x height` canonical image.
pub fn warp_rgb(image: &RgbImage, h: &Homography, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = (image.width() as usize, image.height() as usize);
    let inv = inverse_rows(h);

    let mut out = RgbImage::new(width, height);
    if src_w == 0 || src_h == 0 {
        return out;
    }

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if let Some(s) = locate(&inv, x, y, src_w, src_h) {
            let weights = s.weights();
            let taps = [
                image.get_pixel(s.x0 as u32, s.y0 as u32),
                image.get_pixel(s.x1 as u32, s.y0 as u32),
                image.get_pixel(s.x0 as u32, s.y1 as u32),
                image.get_pixel(s.x1 as u32, s.y1 as u32),
            ];
            let mut rgb = [0u8; 3];
            for (c, channel) in rgb.iter_mut().enumerate() {
                let v: f32 = taps
                    .iter()
                    .zip(weights.iter())
                    .map(|(p, w)| p[c] as f32 * w)
                    .sum();
                *channel = v.round().clamp(0.0, 255.0) as u8;
            }
            *pixel = Rgb(rgb);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identity_warp_preserves_frame() {
        let frame = DepthFrame::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let out = warp_depth(&frame, &Homography::identity(), 3, 2);
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn test_translation_shifts_and_marks_unseen() {
        // dst = src + (1, 0)
        let h = Homography::from_rows([[1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let frame = DepthFrame::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let out = warp_depth(&frame, &h, 3, 2);
        assert_eq!(out.data().column(0).to_vec(), vec![UNSEEN_DEPTH; 2]);
        assert_eq!(out.data()[[0, 1]], 1.0);
        assert_eq!(out.data()[[1, 2]], 5.0);
    }

    #[test]
    fn test_empty_source_is_all_unseen() {
        let frame = DepthFrame::new(Array2::zeros((0, 0)));
        let out = warp_depth(&frame, &Homography::identity(), 2, 2);
        assert!(out.data().iter().all(|d| *d == UNSEEN_DEPTH));
    }

    #[test]
    fn test_downscale_interpolates() {
        // dst = src / 2
        let h = Homography::from_rows([[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let frame = DepthFrame::new(array![[0.0, 10.0, 20.0], [0.0, 10.0, 20.0]]);
        let out = warp_depth(&frame, &h, 2, 1);
        assert!((out.data()[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((out.data()[[0, 1]] - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_rgb_identity_warp() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(1, 0, Rgb([10, 20, 30]));
        let out = warp_rgb(&img, &Homography::identity(), 2, 2);
        assert_eq!(out, img);
    }
}
