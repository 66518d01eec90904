//! Core types for robot/camera/IMU hand-eye calibration.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec3`, `Iso3`, ...) and unit helpers,
//! - [`Pose`] with an explicitly tagged rotation representation ([`Orientation`])
//!   and the per-pass [`PoseSequence`],
//! - timestamped sensor records ([`TimestampedSample`], [`ImuReading`]),
//! - pinhole camera intrinsics and distortion coefficients,
//! - deterministic synthetic data helpers for tests.
//!
//! Conventions: translations are meters, angles are radians once inside a
//! [`Pose`]. Sensor-native units are converted at the boundary
//! (see [`ImuUnits`]).

/// Pinhole intrinsics and distortion.
pub mod camera;
/// Linear algebra type aliases and helpers.
pub mod math;
/// Poses and pose sequences.
pub mod pose;
/// Timestamped sensor records.
pub mod sample;
pub mod synthetic;

pub use camera::*;
pub use math::*;
pub use pose::*;
pub use sample::*;
