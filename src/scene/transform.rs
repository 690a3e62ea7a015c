//! Raster resizing and rotation for fossil textures.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Resize according to an explicit size or a uniform scale factor.
///
/// `size` wins when both are given. Dimensions never drop below one pixel.
pub fn resize(image: &RgbaImage, scale_factor: Option<f32>, size: Option<[u32; 2]>) -> RgbaImage {
    let (w, h) = image.dimensions();
    let target = match (size, scale_factor) {
        (Some([tw, th]), _) => (tw.max(1), th.max(1)),
        (None, Some(scale)) => (
            ((w as f32 * scale).round() as u32).max(1),
            ((h as f32 * scale).round() as u32).max(1),
        ),
        (None, None) => return image.clone(),
    };

    if target == (w, h) {
        return image.clone();
    }
    imageops::resize(image, target.0, target.1, FilterType::Triangle)
}

/// Snap sines and cosines of right angles to exact values.
fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < 1e-9 {
        r
    } else {
        v
    }
}

/// Bounding box of a `width x height` raster rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f32) -> (u32, u32) {
    let (s, c) = (degrees as f64).to_radians().sin_cos();
    let (s, c) = (snap(s).abs(), snap(c).abs());
    let (w, h) = (width as f64, height as f64);
    let new_w = (w * c + h * s - 1e-6).ceil().max(1.0);
    let new_h = (w * s + h * c - 1e-6).ceil().max(1.0);
    (new_w as u32, new_h as u32)
}

/// Whether rotating by `degrees` exposes empty corners.
pub fn rotation_pads(degrees: f32) -> bool {
    (degrees as f64).rem_euclid(90.0).abs() > 1e-6
        && (90.0 - (degrees as f64).rem_euclid(90.0)).abs() > 1e-6
}

/// Rotate counter-clockwise by `degrees`, growing the canvas so no corner is
/// clipped and keeping the content centred. Exposed corners are transparent.
pub fn rotate_expand(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 || (degrees as f64).rem_euclid(360.0).abs() < 1e-9 {
        return image.clone();
    }

    let (s, c) = (degrees as f64).to_radians().sin_cos();
    let (s, c) = (snap(s), snap(c));
    let (dst_w, dst_h) = rotated_bounds(src_w, src_h, degrees);

    let src_cx = src_w as f64 / 2.0;
    let src_cy = src_h as f64 / 2.0;
    let dst_cx = dst_w as f64 / 2.0;
    let dst_cy = dst_h as f64 / 2.0;

    RgbaImage::from_fn(dst_w, dst_h, |x, y| {
        let dx = x as f64 + 0.5 - dst_cx;
        let dy = y as f64 + 0.5 - dst_cy;
        // inverse of a counter-clockwise rotation in y-down coordinates
        let sx = c * dx - s * dy + src_cx - 0.5;
        let sy = s * dx + c * dy + src_cy - 0.5;
        sample_premultiplied(image, sx, sy)
    })
}

/// Bilinear sample with transparent black outside the raster.
fn sample_premultiplied(image: &RgbaImage, sx: f64, sy: f64) -> Rgba<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    if sx <= -1.0 || sy <= -1.0 || sx >= w as f64 || sy >= h as f64 {
        return Rgba([0, 0, 0, 0]);
    }

    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f64;
    let fy = sy - y0 as f64;

    let mut acc = [0.0f64; 4];
    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    for (tx, ty, weight) in taps {
        if weight == 0.0 || tx < 0 || ty < 0 || tx >= w || ty >= h {
            continue;
        }
        let p = image.get_pixel(tx as u32, ty as u32);
        let a = p[3] as f64 / 255.0;
        acc[0] += p[0] as f64 * a * weight;
        acc[1] += p[1] as f64 * a * weight;
        acc[2] += p[2] as f64 * a * weight;
        acc[3] += a * weight;
    }

    if acc[3] <= 1e-9 {
        return Rgba([0, 0, 0, 0]);
    }
    let unpremultiply = |v: f64| (v / acc[3]).round().clamp(0.0, 255.0) as u8;
    Rgba([
        unpremultiply(acc[0]),
        unpremultiply(acc[1]),
        unpremultiply(acc[2]),
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
