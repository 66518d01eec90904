//! Closed-form solvers used by the calibration pipeline.
//!
//! - [`handeye`]: Tsai–Lenz AX = XB over all motion pairs,
//! - [`homography`]: normalized DLT homography,
//! - [`zhang_intrinsics`]: Zhang's closed-form pinhole intrinsics and a focal-only fallback,
//! - [`planar_pose`]: board pose from a homography and intrinsics.

pub mod handeye;
pub mod homography;
mod math;
pub mod planar_pose;
pub mod zhang_intrinsics;

pub use handeye::{HandEyeError, HandEyeOptions, HandEyeSolver, MIN_HANDEYE_POSES};
pub use homography::{dlt_homography, HomographyError};
pub use planar_pose::{estimate_planar_pose_from_h, PlanarPoseError};
pub use zhang_intrinsics::{
    estimate_focal_from_homographies, estimate_intrinsics_from_homographies, IntrinsicsError,
};
