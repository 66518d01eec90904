use handeye_core::{CameraIntrinsics, Mat3, Real};
use nalgebra::{DMatrix, SVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntrinsicsError {
    #[error("need at least 3 homographies for intrinsics estimation, got {0}")]
    NotEnoughViews(usize),
    #[error("degenerate configuration in intrinsics estimation")]
    Degenerate,
    #[error("svd failed")]
    SvdFailed,
}

/// Build the 6-vector v_ij(H) as in Zhang's method (0-based column indices).
fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics K from a set of plane homographies H_k using
/// Zhang's closed-form solution (no distortion).
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Mat3],
) -> Result<CameraIntrinsics, IntrinsicsError> {
    if hmtxs.len() < 3 {
        return Err(IntrinsicsError::NotEnoughViews(hmtxs.len()));
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // V b = 0: singular vector of the smallest singular value.
    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(IntrinsicsError::SvdFailed)?;
    let b = v_t.row(v_t.nrows() - 1);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    // From Zhang's paper:
    //
    // v0 = (B12 B13 - B11 B23) / (B11 B22 - B12^2)
    // λ = B33 - (B13^2 + v0 (B12 B13 - B11 B23)) / B11
    // α = sqrt(λ / B11)
    // β = sqrt(λ B11 / (B11 B22 - B12^2))
    // γ = -B12 α^2 β / λ
    // u0 = γ v0 / β - B13 α^2 / λ
    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    let denom_rel = if denom_norm > 0.0 {
        denom.abs() / denom_norm
    } else {
        0.0
    };
    if denom_rel <= 1e-6 {
        return Err(IntrinsicsError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;

    if lambda.signum() != b11.signum() || denom <= 0.0 {
        return Err(IntrinsicsError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    })
}

/// Focal length from one or more homographies when the full closed form is
/// under-determined.
///
/// Assumes zero skew, square pixels and the principal point at the image
/// origin, leaving `a = 1/f²` as the only unknown. Each view contributes the
/// orthogonality and equal-norm constraints on `K⁻¹ [h1 h2]`, solved for `a`
/// in the least-squares sense.
pub fn estimate_focal_from_homographies(
    hmtxs: &[Mat3],
) -> Result<CameraIntrinsics, IntrinsicsError> {
    if hmtxs.is_empty() {
        return Err(IntrinsicsError::NotEnoughViews(0));
    }

    let (mut uu, mut uv) = (0.0, 0.0);
    for hmtx in hmtxs {
        let norm = hmtx.norm();
        if norm <= Real::EPSILON {
            return Err(IntrinsicsError::Degenerate);
        }
        let h = hmtx / norm;
        let rows = [
            (
                h[(0, 0)] * h[(0, 1)] + h[(1, 0)] * h[(1, 1)],
                h[(2, 0)] * h[(2, 1)],
            ),
            (
                h[(0, 0)].powi(2) + h[(1, 0)].powi(2) - h[(0, 1)].powi(2) - h[(1, 1)].powi(2),
                h[(2, 0)].powi(2) - h[(2, 1)].powi(2),
            ),
        ];
        for (u, v) in rows {
            uu += u * u;
            uv += u * v;
        }
    }
    if uu <= Real::EPSILON {
        return Err(IntrinsicsError::Degenerate);
    }

    // a = 1/f²; a fronto-parallel board leaves it at zero.
    let a = -uv / uu;
    if !a.is_finite() || a <= 0.0 {
        return Err(IntrinsicsError::Degenerate);
    }
    let f = a.sqrt().recip();
    Ok(CameraIntrinsics {
        fx: f,
        fy: f,
        cx: 0.0,
        cy: 0.0,
        skew: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use handeye_core::{Iso3, Rot3, Vec3};
    use nalgebra::Translation3;

    fn make_kmtx() -> (CameraIntrinsics, Mat3) {
        let intr = CameraIntrinsics {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        (intr, intr.k_matrix())
    }

    fn synthetic_homography(kmtx: &Mat3, rot: Rot3, t: Vec3) -> Mat3 {
        let iso = Iso3::from_parts(Translation3::from(t), rot.into());

        // For Z=0 plane, H = K [r1 r2 t]
        let binding = iso.rotation.to_rotation_matrix();
        let r_mat = binding.matrix();

        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx
    }

    #[test]
    fn intrinsics_from_homographies_recovers_kmtx() {
        let (intr_gt, kmtx) = make_kmtx();

        let hmts: Vec<Mat3> = vec![
            synthetic_homography(
                &kmtx,
                Rot3::from_euler_angles(0.1, 0.0, 0.05),
                Vec3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                &kmtx,
                Rot3::from_euler_angles(-0.05, 0.15, -0.1),
                Vec3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                &kmtx,
                Rot3::from_euler_angles(0.2, -0.1, 0.0),
                Vec3::new(0.0, 0.0, 0.9),
            ),
        ];

        let intr_est = estimate_intrinsics_from_homographies(&hmts).unwrap();

        assert!((intr_est.fx - intr_gt.fx).abs() < 5.0, "fx mismatch");
        assert!((intr_est.fy - intr_gt.fy).abs() < 5.0, "fy mismatch");
        assert!((intr_est.cx - intr_gt.cx).abs() < 10.0, "cx mismatch");
        assert!((intr_est.cy - intr_gt.cy).abs() < 10.0, "cy mismatch");
        assert!(intr_est.skew.abs() < 1e-6, "skew not ~0: {}", intr_est.skew);
    }

    #[test]
    fn two_views_are_not_enough() {
        let (_, kmtx) = make_kmtx();
        let h = synthetic_homography(&kmtx, Rot3::identity(), Vec3::new(0.0, 0.0, 1.0));
        assert!(matches!(
            estimate_intrinsics_from_homographies(&[h, h]),
            Err(IntrinsicsError::NotEnoughViews(2))
        ));
    }

    #[test]
    fn focal_from_a_single_tilted_view() {
        let kmtx = Mat3::new(6.5, 0.0, 0.0, 0.0, 6.5, 0.0, 0.0, 0.0, 1.0);
        let h = synthetic_homography(
            &kmtx,
            Rot3::from_euler_angles(0.25, -0.2, 0.1),
            Vec3::new(0.05, -0.1, 1.1),
        );

        let intr = estimate_focal_from_homographies(&[h]).unwrap();
        assert!((intr.fx - 6.5).abs() < 1e-9, "fx = {}", intr.fx);
        assert_eq!(intr.fx, intr.fy);
        assert_eq!((intr.cx, intr.cy, intr.skew), (0.0, 0.0, 0.0));

        // Scale of H is arbitrary.
        let scaled = estimate_focal_from_homographies(&[h * -3.0, h]).unwrap();
        assert!((scaled.fx - 6.5).abs() < 1e-9);
    }

    #[test]
    fn fronto_parallel_view_has_no_focal() {
        let kmtx = Mat3::new(6.5, 0.0, 0.0, 0.0, 6.5, 0.0, 0.0, 0.0, 1.0);
        let h = synthetic_homography(&kmtx, Rot3::identity(), Vec3::new(0.0, 0.0, 1.0));
        assert!(matches!(
            estimate_focal_from_homographies(&[h]),
            Err(IntrinsicsError::Degenerate)
        ));
        assert!(matches!(
            estimate_focal_from_homographies(&[]),
            Err(IntrinsicsError::NotEnoughViews(0))
        ));
    }
}
