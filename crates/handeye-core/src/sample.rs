//! Timestamped sensor records.

use crate::{AngleUnit, Iso3, Orientation, Pose, Real, Seconds, Vec3};
use serde::{Deserialize, Serialize};

/// A payload tagged with the wall-clock time it was logged at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSample<T> {
    pub timestamp: Seconds,
    pub payload: T,
}

impl<T> TimestampedSample<T> {
    pub fn new(timestamp: Seconds, payload: T) -> Self {
        Self { timestamp, payload }
    }
}

/// One record of the onboard state estimator log.
///
/// Position fields are the raw `int16` values of the logger (scaled integer
/// units, millimeters on the reference hardware); angles are the raw float
/// attitude estimate (degrees on the reference hardware).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuReading {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// How to interpret the raw fields of an [`ImuReading`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuUnits {
    /// Unit of roll/pitch/yaw.
    pub angle: AngleUnit,
    /// Meters per raw position unit.
    pub position_scale: Real,
}

impl Default for ImuUnits {
    fn default() -> Self {
        Self {
            angle: AngleUnit::Degrees,
            position_scale: 1e-3,
        }
    }
}

impl ImuReading {
    /// Position in meters.
    pub fn position(&self, units: &ImuUnits) -> Vec3 {
        Vec3::new(self.x as Real, self.y as Real, self.z as Real) * units.position_scale
    }

    /// Orientation normalized to radians.
    pub fn orientation(&self, units: &ImuUnits) -> Orientation {
        Orientation::roll_pitch_yaw(
            units.angle.to_radians(self.roll as Real),
            units.angle.to_radians(self.pitch as Real),
            units.angle.to_radians(self.yaw as Real),
        )
    }

    /// State estimate as a pose in the estimator's world frame.
    pub fn to_pose(&self, units: &ImuUnits) -> Pose {
        Pose::new(self.position(units), self.orientation(units))
    }

    pub fn to_isometry(&self, units: &ImuUnits) -> Iso3 {
        self.to_pose(units).to_isometry()
    }

    /// Inverse of [`ImuReading::to_pose`], rounding to the raw field types.
    pub fn from_pose(pose: &Pose, units: &ImuUnits) -> Self {
        let raw = |v: Real| (v / units.position_scale).round() as i16;
        let (roll, pitch, yaw) = pose.orientation.to_roll_pitch_yaw();
        let angle = |v: Real| match units.angle {
            AngleUnit::Radians => v as f32,
            AngleUnit::Degrees => v.to_degrees() as f32,
        };
        Self {
            x: raw(pose.translation.x),
            y: raw(pose.translation.y),
            z: raw(pose.translation.z),
            roll: angle(roll),
            pitch: angle(pitch),
            yaw: angle(yaw),
        }
    }
}

/// An IMU log entry.
pub type ImuSample = TimestampedSample<ImuReading>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_reading_is_normalized_to_si() {
        let reading = ImuReading {
            x: 1000,
            y: -250,
            z: 0,
            roll: 90.0,
            pitch: 0.0,
            yaw: -180.0,
        };
        let pose = reading.to_pose(&ImuUnits::default());
        assert!((pose.translation - Vec3::new(1.0, -0.25, 0.0)).norm() < 1e-12);
        let (roll, _, yaw) = pose.orientation.to_roll_pitch_yaw();
        assert!((roll - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((yaw.abs() - std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn from_pose_round_trips_within_quantization() {
        let units = ImuUnits::default();
        let pose = Pose::new(
            Vec3::new(0.123, -0.456, 0.789),
            Orientation::roll_pitch_yaw(0.1, -0.2, 0.3),
        );
        let back = ImuReading::from_pose(&pose, &units).to_pose(&units);
        assert!((back.translation - pose.translation).norm() < 1e-3);
    }
}
