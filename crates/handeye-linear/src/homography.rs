//! Homography estimation (plane-induced projective transform).
//!
//! Implements the normalized Direct Linear Transform (DLT). The homography `H`
//! maps **board points** on a plane to **image points** in pixels: `x' ~ H x`.

use crate::math::normalize_points_2d;
use handeye_core::{Mat3, Pt2};
use nalgebra::DMatrix;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point sets differ in size: {0} vs {1}")]
    SizeMismatch(usize, usize),
    #[error("degenerate point configuration for normalization")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate `H` such that `x' ~ H x` using the normalized DLT.
///
/// Uses Hartley normalization (zero-mean, average distance sqrt(2)) and solves
/// `A h = 0` via SVD. The result is scaled so that `H[2,2] == 1` when possible.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::SizeMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (world_n, t_w) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (image_n, t_i) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    // At least 9 rows so the null vector is the last row of V^T.
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);

    for (i, (pw, pi)) in world_n.iter().zip(image_n.iter()).enumerate() {
        let x = pw.x;
        let y = pw.y;
        let u = pi.x;
        let v = pi.y;

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;
    let h = v_t.row(v_t.nrows() - 1);

    let mut h_mat = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h_mat[(r, c)] = h[3 * r + c];
        }
    }

    let t_i_inv = t_i.try_inverse().ok_or(HomographyError::Degenerate)?;
    h_mat = t_i_inv * h_mat * t_w;

    // normalise such that H[2,2] = 1
    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }

    Ok(h_mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use handeye_core::Vec3;

    #[test]
    fn basic_homography() {
        let w = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(1.0, 0.0),
            Pt2::new(1.0, 1.0),
            Pt2::new(0.0, 1.0),
        ];
        let img = vec![
            Pt2::new(0.0, 0.0),
            Pt2::new(2.0, 0.0),
            Pt2::new(2.0, 2.0),
            Pt2::new(0.0, 2.0),
        ];

        let h = dlt_homography(&w, &img).unwrap();
        let s = h[(0, 0)];
        assert!((s - 2.0).abs() < 1e-6);
    }

    #[test]
    fn projective_map_is_recovered() {
        let h_gt = Mat3::new(1.2, 0.1, 300.0, -0.05, 0.9, 200.0, 1e-4, -2e-4, 1.0);
        let world: Vec<Pt2> = (0..8)
            .map(|k| Pt2::new((k % 4) as f64 * 0.05, (k / 4) as f64 * 0.05))
            .collect();
        let image: Vec<Pt2> = world
            .iter()
            .map(|p| {
                let v = h_gt * Vec3::new(p.x, p.y, 1.0);
                Pt2::new(v.x / v.z, v.y / v.z)
            })
            .collect();

        let h = dlt_homography(&world, &image).unwrap();
        assert!((h - h_gt).norm() < 1e-6, "H = {h}");
    }

    #[test]
    fn too_few_points_fail() {
        let pts = vec![Pt2::new(0.0, 0.0); 3];
        assert!(matches!(
            dlt_homography(&pts, &pts),
            Err(HomographyError::NotEnoughPoints(3))
        ));
    }
}
