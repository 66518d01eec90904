//! Shared numeric helpers for the linear solvers.

use handeye_core::{Mat3, Pt2, Real, Vec3};
use nalgebra::{Rotation3, Unit, UnitQuaternion};

/// Hartley normalization: zero mean, average distance `sqrt(2)`.
///
/// Returns the normalized points and the similarity `T` with `p_n = T p`.
pub fn normalize_points_2d(points: &[Pt2]) -> Option<(Vec<Pt2>, Mat3)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as Real;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<Real>()
        / n;

    if mean_dist <= Real::EPSILON {
        return None;
    }

    let scale = (2.0 as Real).sqrt() / mean_dist;
    let t = Mat3::new(
        scale,
        0.0,
        -scale * cx,
        0.0,
        scale,
        -scale * cy,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points
        .iter()
        .map(|p| Pt2::new(scale * (p.x - cx), scale * (p.y - cy)))
        .collect();
    Some((normalized, t))
}

/// Project a general 3x3 matrix to the closest rotation matrix (SO(3))
/// using SVD. Returns `None` if the decomposition fails.
pub fn project_to_so3(m: Mat3) -> Option<Mat3> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;

    // Ensure det(R) > 0
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Some(r)
}

/// log: SO(3) -> so(3) as a 3-vector (axis * angle)
pub fn log_so3(r: &Mat3) -> Vec3 {
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r));
    let angle = rot.angle();
    if angle < 1e-12 {
        return Vec3::zeros();
    }
    let axis: Unit<Vec3> = rot
        .axis()
        .unwrap_or_else(|| Unit::new_unchecked(Vec3::x_axis().into_inner()));
    axis.into_inner() * angle
}
