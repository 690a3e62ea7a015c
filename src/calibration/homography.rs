//! Four-point homography estimation.
//!
//! Normalized Direct Linear Transform: both point sets are shifted to zero
//! mean and scaled to an average distance of sqrt(2), `A h = 0` is solved via
//! SVD, and the result is de-normalized and scaled so `H[2,2] == 1`.

use glam::Vec2;
use nalgebra::{DMatrix, Matrix3, Vector3};
use thiserror::Error;

/// Errors from homography estimation and control point updates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Control point index {0} out of range (expected 0..4)")]
    InvalidIndex(usize),
    #[error("Degenerate point configuration: {0}")]
    Degenerate(String),
    #[error("Linear system is singular")]
    Singular,
}

/// Minimum |area| of a triangle of normalized points before it counts as
/// collinear.
const COLLINEAR_EPSILON: f64 = 1e-6;

/// Below this ratio to the largest singular value a singular value is zero.
const RANK_EPSILON: f64 = 1e-10;

/// Projective transform mapping sensor coordinates to canonical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Wrap a matrix. Returns `None` for non-finite or singular matrices.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        if matrix.determinant().abs() < 1e-12 {
            return None;
        }
        Some(Self { matrix })
    }

    /// Build from a row-major 3x3 array.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Option<Self> {
        Self::from_matrix(Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Row-major copy of the matrix.
    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Apply to a point. `None` when the point maps to infinity.
    pub fn transform_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = self.matrix * Vector3::new(x, y, 1.0);
        if p.z.abs() < 1e-12 {
            return None;
        }
        Some((p.x / p.z, p.y / p.z))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().and_then(Self::from_matrix)
    }
}

/// Solve for `H` such that `H * src[i] ~ dst[i]` for all four pairs.
///
/// Fails without side effects when any three points of either set are
/// collinear or the system does not have a unique solution.
pub fn solve_homography(src: &[Vec2; 4], dst: &[Vec2; 4]) -> Result<Homography, CalibrationError> {
    let src: Vec<(f64, f64)> = src.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let dst: Vec<(f64, f64)> = dst.iter().map(|p| (p.x as f64, p.y as f64)).collect();

    if src.iter().chain(dst.iter()).any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return Err(CalibrationError::Degenerate("non-finite coordinate".to_string()));
    }

    let (src_n, t_src) = normalize_points(&src)?;
    let (dst_n, t_dst) = normalize_points(&dst)?;

    check_not_collinear(&src_n, "source")?;
    check_not_collinear(&dst_n, "destination")?;

    // 8x9 design matrix padded to 9x9 so the SVD yields a full V.
    let mut a = DMatrix::<f64>::zeros(9, 9);
    for (i, ((x, y), (u, v))) in src_n.iter().zip(dst_n.iter()).enumerate() {
        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = *u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = *v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(CalibrationError::Singular)?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&i, &j| {
        svd.singular_values[i]
            .partial_cmp(&svd.singular_values[j])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let largest = svd.singular_values[order[order.len() - 1]];
    let second_smallest = svd.singular_values[order[1]];
    // The padded row guarantees one zero singular value; a second one means
    // the null space is not unique.
    if largest <= 0.0 || second_smallest / largest < RANK_EPSILON {
        return Err(CalibrationError::Singular);
    }

    let h = v_t.row(order[0]);
    let h_n = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst.try_inverse().ok_or(CalibrationError::Singular)?;
    let mut h_mat = t_dst_inv * h_n * t_src;

    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }

    Homography::from_matrix(h_mat).ok_or(CalibrationError::Singular)
}

/// Hartley normalization: zero mean, average distance sqrt(2).
fn normalize_points(
    points: &[(f64, f64)],
) -> Result<(Vec<(f64, f64)>, Matrix3<f64>), CalibrationError> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    if mean_dist < 1e-12 {
        return Err(CalibrationError::Degenerate("coincident points".to_string()));
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points.iter().map(|p| ((p.0 - cx) * s, (p.1 - cy) * s)).collect();
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    Ok((normalized, t))
}

fn check_not_collinear(points: &[(f64, f64)], which: &str) -> Result<(), CalibrationError> {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            for k in (j + 1)..points.len() {
                let (a, b, c) = (points[i], points[j], points[k]);
                let area = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
                if area.abs() < COLLINEAR_EPSILON {
                    return Err(CalibrationError::Degenerate(format!(
                        "{} points {}, {} and {} are collinear",
                        which, i, j, k
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical() -> [Vec2; 4] {
        [
            Vec2::new(0.0, 0.0),
            Vec2::new(640.0, 0.0),
            Vec2::new(640.0, 480.0),
            Vec2::new(0.0, 480.0),
        ]
    }

    fn assert_maps(h: &Homography, src: &[Vec2; 4], dst: &[Vec2; 4]) {
        for (s, d) in src.iter().zip(dst.iter()) {
            let (x, y) = h.transform_point(s.x as f64, s.y as f64).unwrap();
            assert!((x - d.x as f64).abs() < 1e-6, "x: {} vs {}", x, d.x);
            assert!((y - d.y as f64).abs() < 1e-6, "y: {} vs {}", y, d.y);
        }
    }

    #[test]
    fn test_identity_transform() {
        let h = solve_homography(&canonical(), &canonical()).unwrap();
        let (x, y) = h.transform_point(100.0, 200.0).unwrap();
        assert!((x - 100.0).abs() < 1e-6);
        assert!((y - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_scale_transform() {
        let src = [
            Vec2::new(0.0, 0.0),
            Vec2::new(320.0, 0.0),
            Vec2::new(320.0, 240.0),
            Vec2::new(0.0, 240.0),
        ];
        let h = solve_homography(&src, &canonical()).unwrap();
        assert!((h.matrix()[(0, 0)] - 2.0).abs() < 1e-6);
        assert!((h.matrix()[(1, 1)] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_skewed_quad_maps_to_corners() {
        let src = [
            Vec2::new(42.0, 17.0),
            Vec2::new(600.5, 35.0),
            Vec2::new(620.0, 455.25),
            Vec2::new(12.0, 470.0),
        ];
        let h = solve_homography(&src, &canonical()).unwrap();
        assert_maps(&h, &src, &canonical());
    }

    #[test]
    fn test_collinear_points_fail() {
        let src = [
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 100.0),
            Vec2::new(200.0, 200.0),
            Vec2::new(0.0, 480.0),
        ];
        assert!(matches!(
            solve_homography(&src, &canonical()),
            Err(CalibrationError::Degenerate(_))
        ));
    }

    #[test]
    fn test_coincident_points_fail() {
        let src = [Vec2::new(5.0, 5.0); 4];
        assert!(solve_homography(&src, &canonical()).is_err());
    }

    #[test]
    fn test_matrix_invert() {
        let h = Homography::from_rows([[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let inv = h.inverse().unwrap().to_rows();
        assert!((inv[0][0] - 0.5).abs() < 1e-9);
        assert!((inv[1][1] - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_singular_matrix_rejected() {
        assert!(Homography::from_rows([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]).is_none());
    }
}
