//! Offline robot/camera/IMU hand-eye calibration.
//!
//! The stages, bottom-up:
//! - [`average`]: per-station averaging of repeated pose passes,
//! - [`imu`]: IMU log samples for motion interval markers and their relative poses,
//! - [`captures`]: one timestamp-named image per station from a capture directory,
//! - [`charuco`]: camera intrinsics and per-image board poses,
//! - [`handeye`]: Tsai–Lenz solutions for camera→gripper, IMU→camera and IMU→gripper,
//! - [`session`]: the whole run over a recorded [`SessionRecord`].
//!
//! [`synthetic`] builds complete synthetic runs with known ground truth.

pub mod average;
pub mod captures;
pub mod charuco;
pub mod config;
mod error;
pub mod handeye;
pub mod imu;
pub mod io;
pub mod session;
pub mod synthetic;

pub use average::{average, split, AverageError, AveragedStream};
pub use captures::{partition, select, CaptureError, CaptureFile, CaptureSelector, DiscardPolicy};
pub use charuco::{
    BoardDetection, BoardDetector, CharucoBoard, CharucoError, CharucoEstimator, Detection,
    EstimatorState, SidecarDetector,
};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use handeye::{calibrate_all, solve, CalibrationResult, Extrinsics, HandEyeError};
pub use imu::{pairs_to_relative_pose, pick_imu_pairs, ImuMatchError, TimestampMatcher};
pub use session::{run_calibration, CalibrationOutcome, CalibrationReport, SessionRecord};
