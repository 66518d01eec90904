use crate::math::project_to_so3;
use handeye_core::{Iso3, Mat3, Real, Vec3};
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanarPoseError {
    #[error("intrinsics matrix is not invertible")]
    SingularIntrinsics,
    #[error("homography columns are degenerate")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Estimate pose of a planar board (Z=0) relative to camera, given intrinsics K
/// and homography H (plane -> image).
///
/// Returns an Iso3 that maps board coordinates into camera coordinates.
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PlanarPoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PlanarPoseError::SingularIntrinsics)?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let k_inv_h3 = k_inv * hmtx.column(2);

    // Scale factor λ: average of the first two column norms.
    let mean_norm = (k_inv_h1.norm() + k_inv_h2.norm()) * 0.5;
    if mean_norm <= Real::EPSILON {
        return Err(PlanarPoseError::Degenerate);
    }
    let mut lambda = 1.0 / mean_norm;
    // The board must lie in front of the camera.
    if k_inv_h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1: Vec3 = lambda * k_inv_h1;
    let r2: Vec3 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);

    let mut r_mat = Mat3::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    let r_orth = project_to_so3(r_mat).ok_or(PlanarPoseError::SvdFailed)?;
    let t_vec: Vec3 = lambda * k_inv_h3;

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t_vec), rot))
}
