//! Hand-eye calibration (AX = XB) using Tsai–Lenz.
//!
//! Provides a closed-form estimate from paired pose streams, returning the
//! rigid transform between the gripper and camera frames.

use crate::math::{log_so3, project_to_so3};
use handeye_core::{Iso3, Mat3, Real, Vec3};
use log::debug;
use nalgebra::{
    DMatrix, DVector, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion,
};
use thiserror::Error;

/// Minimum number of poses for a determinable hand-eye solution.
pub const MIN_HANDEYE_POSES: usize = 3;

/// Errors returned by the hand-eye solver.
#[derive(Debug, Error)]
pub enum HandEyeError {
    /// Fewer pose samples than [`MIN_HANDEYE_POSES`].
    #[error("need at least {required} pose pairs, got {got}")]
    InsufficientData { got: usize, required: usize },
    /// The two pose streams have different lengths.
    #[error("inconsistent hand-eye input sizes: {a} vs {b}")]
    LengthMismatch { a: usize, b: usize },
    /// Every motion pair was rejected as ill-conditioned.
    #[error("no valid motion pairs after filtering")]
    NoValidPairs,
    /// SVD did not produce the requested factors.
    #[error("svd failed during hand-eye estimation")]
    SvdFailed,
    /// The translation least-squares problem could not be solved.
    #[error("linear solve failed during hand-eye estimation")]
    SolveFailed,
}

/// Pair filtering options for [`HandEyeSolver::tsai_lenz`].
#[derive(Debug, Clone, Copy)]
pub struct HandEyeOptions {
    /// Motion pairs rotating less than this (degrees, either chain) are discarded.
    pub min_angle_deg: Real,
    /// Reject pairs whose rotation axes are nearly parallel.
    pub reject_axis_parallel: bool,
    /// Sine of the smallest accepted angle between rotation axes.
    pub axis_parallel_eps: Real,
}

impl Default for HandEyeOptions {
    fn default() -> Self {
        Self {
            min_angle_deg: 1.0,
            reject_axis_parallel: true,
            axis_parallel_eps: 1e-3,
        }
    }
}

/// Motion pair for Tsai–Lenz AX = XB:
/// A: relative motion in robot/hand chain (base->gripper)
/// B: relative motion in camera/target chain (camera->target)
#[derive(Debug, Clone, Copy)]
pub struct MotionPair {
    pub rot_a: Mat3,
    pub rot_b: Mat3,
    pub tra_a: Vec3,
    pub tra_b: Vec3,
}

/// Closed-form hand–eye solver using the Tsai–Lenz formulation.
#[derive(Debug, Clone, Copy)]
pub struct HandEyeSolver;

/// Build a single motion pair from two pose samples.
///
/// base_se3_gripper_*: ^B T_G
/// target_se3_cam_*:   ^T T_C
///
/// A = (^B T_G,a)^(-1) (^B T_G,b)
/// B = (^T T_C,a)^(-1) (^T T_C,b)
fn make_motion_pair(
    base_se3_gripper_a: &Iso3,
    target_se3_cam_a: &Iso3,
    base_se3_gripper_b: &Iso3,
    target_se3_cam_b: &Iso3,
) -> Result<MotionPair, HandEyeError> {
    let affine_a = base_se3_gripper_a.inverse() * base_se3_gripper_b;
    let affine_b = target_se3_cam_a.inverse() * target_se3_cam_b;

    let rot_a = project_to_so3(*affine_a.rotation.to_rotation_matrix().matrix())
        .ok_or(HandEyeError::SvdFailed)?;
    let rot_b = project_to_so3(*affine_b.rotation.to_rotation_matrix().matrix())
        .ok_or(HandEyeError::SvdFailed)?;

    Ok(MotionPair {
        rot_a,
        rot_b,
        tra_a: affine_a.translation.vector,
        tra_b: affine_b.translation.vector,
    })
}

/// Check if a motion pair is usable:
/// - has sufficient rotation in both chains
/// - optionally rejects near-parallel rotation axes (ill-conditioned)
fn is_good_pair(pair: &MotionPair, min_angle: Real, opts: &HandEyeOptions) -> bool {
    let alpha = log_so3(&pair.rot_a);
    let beta = log_so3(&pair.rot_b);
    let norm_a = alpha.norm();
    let norm_b = beta.norm();
    let min_rot = norm_a.min(norm_b);

    if min_rot < min_angle.max(1e-9) {
        debug!(
            "motion pair rejected: small rotation {:.3} deg",
            min_rot.to_degrees()
        );
        return false;
    }

    if opts.reject_axis_parallel {
        let sin_axis = alpha.normalize().cross(&beta.normalize()).norm();
        if sin_axis < opts.axis_parallel_eps {
            debug!("motion pair rejected: near-parallel axes");
            return false;
        }
    }

    true
}

/// Build all valid motion pairs from pose streams.
///
/// `base_se3_gripper` are gripper poses in the base frame, and
/// `target_se3_cam` are camera poses in the target frame.
pub fn build_all_pairs(
    base_se3_gripper: &[Iso3],
    target_se3_cam: &[Iso3],
    opts: &HandEyeOptions,
) -> Result<Vec<MotionPair>, HandEyeError> {
    if base_se3_gripper.len() != target_se3_cam.len() {
        return Err(HandEyeError::LengthMismatch {
            a: base_se3_gripper.len(),
            b: target_se3_cam.len(),
        });
    }
    if base_se3_gripper.len() < MIN_HANDEYE_POSES {
        return Err(HandEyeError::InsufficientData {
            got: base_se3_gripper.len(),
            required: MIN_HANDEYE_POSES,
        });
    }

    let num_poses = base_se3_gripper.len();
    let min_angle = opts.min_angle_deg.to_radians();

    let mut pairs = Vec::with_capacity(num_poses * (num_poses - 1) / 2);

    for i in 0..(num_poses - 1) {
        for j in (i + 1)..num_poses {
            let pair = make_motion_pair(
                &base_se3_gripper[i],
                &target_se3_cam[i],
                &base_se3_gripper[j],
                &target_se3_cam[j],
            )?;

            if is_good_pair(&pair, min_angle, opts) {
                pairs.push(pair);
            } else {
                debug!("skipping pair ({},{})", i, j);
            }
        }
    }

    if pairs.is_empty() {
        return Err(HandEyeError::NoValidPairs);
    }

    Ok(pairs)
}

// ---------- Tsai–Lenz rotation over all pairs ----------

fn estimate_rotation_allpairs(pairs: &[MotionPair]) -> Result<Mat3, HandEyeError> {
    fn quat_left(q: &UnitQuaternion<Real>) -> Matrix4<Real> {
        let w = q.w;
        let (x, y, z) = (q.i, q.j, q.k);
        Matrix4::new(w, -x, -y, -z, x, w, -z, y, y, z, w, -x, z, -y, x, w)
    }

    fn quat_right(q: &UnitQuaternion<Real>) -> Matrix4<Real> {
        let w = q.w;
        let (x, y, z) = (q.i, q.j, q.k);
        Matrix4::new(w, -x, -y, -z, x, w, z, -y, y, -z, w, x, z, y, -x, w)
    }

    let mut m = DMatrix::<Real>::zeros(4 * pairs.len(), 4);

    for (idx, p) in pairs.iter().enumerate() {
        let qa = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(p.rot_a));
        let mut qb =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(p.rot_b));
        // qa ⊗ qx = qx ⊗ qb forces equal scalar parts; pick qb's sign accordingly.
        if qa.w * qb.w < 0.0 {
            qb = UnitQuaternion::new_unchecked(-qb.into_inner());
        }

        m.view_mut((4 * idx, 0), (4, 4))
            .copy_from(&(quat_left(&qa) - quat_right(&qb)));
    }

    let svd = m.svd(false, true);
    let v_t = svd.v_t.ok_or(HandEyeError::SvdFailed)?;
    let q_vec = v_t.row(v_t.nrows() - 1);

    let q = Quaternion::new(q_vec[0], q_vec[1], q_vec[2], q_vec[3]).normalize();
    Ok(UnitQuaternion::from_quaternion(q)
        .to_rotation_matrix()
        .into_inner())
}

// ---------- Tsai–Lenz translation over all pairs ----------

fn estimate_translation_allpairs(pairs: &[MotionPair], rot_x: &Mat3) -> Result<Vec3, HandEyeError> {
    let mut mat_c = DMatrix::<Real>::zeros(3 * pairs.len(), 3);
    let mut vec_w = DVector::<Real>::zeros(3 * pairs.len());

    for (idx, p) in pairs.iter().enumerate() {
        mat_c
            .view_mut((3 * idx, 0), (3, 3))
            .copy_from(&(p.rot_a - Mat3::identity()));
        vec_w
            .rows_mut(3 * idx, 3)
            .copy_from(&(rot_x * p.tra_b - p.tra_a));
    }

    ridge_llsq(&mat_c, &vec_w, 1e-12)
}

impl HandEyeSolver {
    /// Tsai–Lenz hand–eye estimate over all motion pairs.
    ///
    /// `opts.min_angle_deg` controls the minimum motion magnitude used to
    /// build pairs; this helps reject ill-conditioned data.
    pub fn tsai_lenz(
        base_se3_gripper: &[Iso3],
        target_se3_cam: &[Iso3],
        opts: &HandEyeOptions,
    ) -> Result<Iso3, HandEyeError> {
        let pairs = build_all_pairs(base_se3_gripper, target_se3_cam, opts)?;
        debug!(
            "tsai-lenz: {} of {} motion pairs kept",
            pairs.len(),
            base_se3_gripper.len() * (base_se3_gripper.len() - 1) / 2
        );

        let rot_x = estimate_rotation_allpairs(&pairs)?;
        let g_tra_c = estimate_translation_allpairs(&pairs, &rot_x)?;

        let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot_x));
        Ok(Iso3::from_parts(Translation3::from(g_tra_c), rot))
    }
}

/// Ridge-regularized least squares:
/// min ||A x - b||^2 + λ ||x||^2
fn ridge_llsq(a: &DMatrix<Real>, b: &DVector<Real>, lambda: Real) -> Result<Vec3, HandEyeError> {
    let m = a.nrows();
    let n = a.ncols();
    if n != 3 {
        return Err(HandEyeError::SolveFailed);
    }

    // Augmented system [A; sqrt(λ) I] x ≈ [b; 0]
    let mut a_aug = DMatrix::<Real>::zeros(m + n, n);
    a_aug.view_mut((0, 0), (m, n)).copy_from(a);

    let sqrt_lambda = lambda.sqrt();
    for i in 0..n {
        a_aug[(m + i, i)] = sqrt_lambda;
    }

    let mut b_aug = DVector::<Real>::zeros(m + n);
    b_aug.rows_mut(0, m).copy_from(b);

    let svd = a_aug.svd(true, true);
    let x = svd
        .solve(&b_aug, 1e-12)
        .map_err(|_| HandEyeError::SolveFailed)?;

    Ok(Vec3::new(x[0], x[1], x[2]))
}
