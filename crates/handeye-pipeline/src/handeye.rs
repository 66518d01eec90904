//! Hand-eye calibration of the three sensor pairs.
//!
//! [`solve`] takes split rotation/translation arrays in the usual
//! `calibrateHandEye` argument convention: `A` are gripper poses in the robot
//! base (`^B T_G`), `B` are target poses in the camera frame (`^C T_T`), and
//! the result is the camera pose in the gripper frame (`^G T_C`).

use crate::average::split;
use handeye_core::{Iso3, Mat3, Pose, PoseSequence, Real, RotationKind, Vec3};
use handeye_linear::{HandEyeOptions, HandEyeSolver};
use log::info;
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use handeye_linear::{HandEyeError, MIN_HANDEYE_POSES};

/// A rigid calibration transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl CalibrationResult {
    pub fn from_isometry(iso: &Iso3) -> Self {
        Self {
            rotation: iso.rotation.to_rotation_matrix().into_inner(),
            translation: iso.translation.vector,
        }
    }

    pub fn to_isometry(&self) -> Iso3 {
        let rot = Rotation3::from_matrix_unchecked(self.rotation);
        Iso3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_rotation_matrix(&rot),
        )
    }

    pub fn to_pose(&self) -> Pose {
        Pose::from_isometry(&self.to_isometry(), RotationKind::Rodrigues)
    }
}

impl fmt::Display for CalibrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Translation:")?;
        for v in self.translation.iter() {
            writeln!(f, "{v:>14.9}")?;
        }
        writeln!(f, "Rotation:")?;
        for r in 0..3 {
            let row = self.rotation.row(r);
            writeln!(f, "{:>14.9} {:>14.9} {:>14.9}", row[0], row[1], row[2])?;
        }
        Ok(())
    }
}

/// Tsai–Lenz hand-eye calibration on split pose arrays.
///
/// Rotations are Rodrigues vectors. All four arrays must have the same length
/// of at least [`MIN_HANDEYE_POSES`].
pub fn solve(
    rot_a: &[Vec3],
    trans_a: &[Vec3],
    rot_b: &[Vec3],
    trans_b: &[Vec3],
    opts: &HandEyeOptions,
) -> Result<CalibrationResult, HandEyeError> {
    if rot_a.len() != trans_a.len() {
        return Err(HandEyeError::LengthMismatch {
            a: rot_a.len(),
            b: trans_a.len(),
        });
    }
    if rot_b.len() != trans_b.len() {
        return Err(HandEyeError::LengthMismatch {
            a: rot_b.len(),
            b: trans_b.len(),
        });
    }

    let base_se3_gripper: Vec<Iso3> = rot_a
        .iter()
        .zip(trans_a)
        .map(|(r, t)| isometry(r, t))
        .collect();
    // The linear solver expects camera poses in the target frame.
    let target_se3_cam: Vec<Iso3> = rot_b
        .iter()
        .zip(trans_b)
        .map(|(r, t)| isometry(r, t).inverse())
        .collect();

    let x = HandEyeSolver::tsai_lenz(&base_se3_gripper, &target_se3_cam, opts)?;
    Ok(CalibrationResult::from_isometry(&x))
}

/// [`solve`] on two pose sequences.
pub fn solve_sequences(
    a: &PoseSequence,
    b: &PoseSequence,
    opts: &HandEyeOptions,
) -> Result<CalibrationResult, HandEyeError> {
    let (trans_a, rot_a) = split(a);
    let (trans_b, rot_b) = split(b);
    solve(&rot_a, &trans_a, &rot_b, &trans_b, opts)
}

fn isometry(rodrigues: &Vec3, translation: &Vec3) -> Iso3 {
    Iso3::from_parts(
        Translation3::from(*translation),
        UnitQuaternion::from_scaled_axis(*rodrigues),
    )
}

/// The three extrinsic calibrations of one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Camera pose in the gripper frame (X).
    pub camera_to_tcp: CalibrationResult,
    /// IMU pose in the camera frame (Y).
    pub imu_to_camera: CalibrationResult,
    /// IMU pose in the gripper frame (Z).
    pub imu_to_tcp: CalibrationResult,
}

/// Solve X, Y and Z from per-station robot, board and IMU poses.
///
/// `robot` are gripper poses in the base frame, `board` are board poses in
/// the camera frame and `imu` are IMU poses in a fixed reference frame. The
/// three sequences must describe the same stations.
pub fn calibrate_all(
    robot: &PoseSequence,
    board: &PoseSequence,
    imu: &PoseSequence,
    opts: &HandEyeOptions,
) -> Result<Extrinsics, HandEyeError> {
    for other in [board.len(), imu.len()] {
        if other != robot.len() {
            return Err(HandEyeError::LengthMismatch {
                a: robot.len(),
                b: other,
            });
        }
    }

    let camera_in_board = invert(board);
    let imu_inverse = invert(imu);

    let camera_to_tcp = solve_sequences(robot, board, opts)?;
    let imu_to_camera = solve_sequences(&camera_in_board, &imu_inverse, opts)?;
    let imu_to_tcp = solve_sequences(robot, &imu_inverse, opts)?;

    info!(
        "hand-eye over {} stations: |t_X|={:.4} m, |t_Y|={:.4} m, |t_Z|={:.4} m",
        robot.len(),
        camera_to_tcp.translation.norm(),
        imu_to_camera.translation.norm(),
        imu_to_tcp.translation.norm()
    );

    Ok(Extrinsics {
        camera_to_tcp,
        imu_to_camera,
        imu_to_tcp,
    })
}

fn invert(sequence: &PoseSequence) -> PoseSequence {
    sequence.iter().map(Pose::inverse).collect()
}

/// Translation distance and rotation angle (radians) between two results.
pub fn result_error(a: &CalibrationResult, b: &CalibrationResult) -> (Real, Real) {
    handeye_core::pose_error(&a.to_isometry(), &b.to_isometry())
}
