//! Mathematical utilities and type definitions.
//!
//! This module provides the scalar and linear algebra aliases used throughout
//! the toolbox, together with the unit conversions applied at sensor
//! boundaries.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Rotation3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3D rotation using [`Real`].
pub type Rot3 = Rotation3<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Wall-clock timestamp in seconds (UNIX epoch, fractional).
pub type Seconds = f64;

/// Unit of an angle as delivered by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    #[default]
    Radians,
    Degrees,
}

impl AngleUnit {
    /// Convert a value expressed in this unit to radians.
    pub fn to_radians(self, value: Real) -> Real {
        match self {
            AngleUnit::Radians => value,
            AngleUnit::Degrees => value.to_radians(),
        }
    }
}

/// Rotation angle (radians) between two rotations, in `[0, π]`.
///
/// Computed as `2·atan2(|v|, |w|)` of the relative quaternion, which stays
/// accurate for angles near zero where the trace form loses precision.
pub fn rotation_angle_between(a: &Rot3, b: &Rot3) -> Real {
    let q = UnitQuaternion::from_rotation_matrix(&(a.transpose() * b));
    2.0 * q.imag().norm().atan2(q.scalar().abs())
}

/// Translation distance and rotation angle between two rigid transforms.
pub fn pose_error(a: &Iso3, b: &Iso3) -> (Real, Real) {
    let dt = (a.translation.vector - b.translation.vector).norm();
    let angle = rotation_angle_between(
        &a.rotation.to_rotation_matrix(),
        &b.rotation.to_rotation_matrix(),
    );
    (dt, angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrees_are_converted() {
        assert!((AngleUnit::Degrees.to_radians(180.0) - std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(AngleUnit::Radians.to_radians(0.25), 0.25);
    }

    #[test]
    fn angle_between_is_symmetric() {
        let a = Rot3::from_euler_angles(0.1, 0.2, -0.3);
        let b = Rot3::from_euler_angles(-0.2, 0.1, 0.4);
        let ab = rotation_angle_between(&a, &b);
        let ba = rotation_angle_between(&b, &a);
        assert!((ab - ba).abs() < 1e-12);
        assert!(rotation_angle_between(&a, &a) < 1e-6);
    }

    #[test]
    fn tiny_and_half_turn_angles_are_resolved() {
        let a = Rot3::from_euler_angles(0.3, -0.2, 1.1);
        assert!(rotation_angle_between(&a, &a) < 1e-12);
        let b = a * Rot3::from_scaled_axis(Vec3::new(0.0, 1e-10, 0.0));
        let angle = rotation_angle_between(&a, &b);
        assert!((angle - 1e-10).abs() < 1e-13, "angle = {angle}");

        let flip = Rot3::from_scaled_axis(Vec3::new(std::f64::consts::PI, 0.0, 0.0));
        let half = rotation_angle_between(&Rot3::identity(), &flip);
        assert!((half - std::f64::consts::PI).abs() < 1e-9);
    }
}
