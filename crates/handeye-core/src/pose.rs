//! Six degree-of-freedom poses with an explicit rotation representation.
//!
//! Robot controllers and board pose estimators report rotations as Rodrigues
//! (axis·angle) vectors, while the IMU reports roll/pitch/yaw. [`Orientation`]
//! carries the representation as a tag so that every boundary converts
//! explicitly instead of relying on array position conventions.

use crate::{Iso3, Real, Rot3, Vec3};
use nalgebra::{Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Which rotation encoding an [`Orientation`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationKind {
    Rodrigues,
    RollPitchYaw,
}

/// A 3D rotation in one of the supported encodings. Angles are radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Orientation {
    /// Axis·angle vector; its norm is the rotation angle.
    Rodrigues { vector: Vec3 },
    /// Extrinsic X-Y-Z angles: `R = Rz(yaw) · Ry(pitch) · Rx(roll)`.
    RollPitchYaw { roll: Real, pitch: Real, yaw: Real },
}

impl Orientation {
    pub fn rodrigues(vector: Vec3) -> Self {
        Orientation::Rodrigues { vector }
    }

    pub fn roll_pitch_yaw(roll: Real, pitch: Real, yaw: Real) -> Self {
        Orientation::RollPitchYaw { roll, pitch, yaw }
    }

    pub fn kind(&self) -> RotationKind {
        match self {
            Orientation::Rodrigues { .. } => RotationKind::Rodrigues,
            Orientation::RollPitchYaw { .. } => RotationKind::RollPitchYaw,
        }
    }

    /// Rotation matrix for this orientation.
    pub fn to_rotation(&self) -> Rot3 {
        match *self {
            Orientation::Rodrigues { vector } => Rot3::from_scaled_axis(vector),
            Orientation::RollPitchYaw { roll, pitch, yaw } => {
                Rot3::from_euler_angles(roll, pitch, yaw)
            }
        }
    }

    pub fn to_quaternion(&self) -> UnitQuaternion<Real> {
        UnitQuaternion::from_rotation_matrix(&self.to_rotation())
    }

    /// Rodrigues vector of this rotation (angle in `[0, π]`).
    pub fn to_rodrigues(&self) -> Vec3 {
        match *self {
            Orientation::Rodrigues { vector } => vector,
            Orientation::RollPitchYaw { .. } => rodrigues_of(&self.to_rotation()),
        }
    }

    /// `(roll, pitch, yaw)` of this rotation.
    pub fn to_roll_pitch_yaw(&self) -> (Real, Real, Real) {
        match *self {
            Orientation::RollPitchYaw { roll, pitch, yaw } => (roll, pitch, yaw),
            Orientation::Rodrigues { .. } => self.to_rotation().euler_angles(),
        }
    }

    /// Encode `rotation` using the representation `kind`.
    pub fn from_rotation(rotation: &Rot3, kind: RotationKind) -> Self {
        match kind {
            RotationKind::Rodrigues => Orientation::rodrigues(rodrigues_of(rotation)),
            RotationKind::RollPitchYaw => {
                let (roll, pitch, yaw) = rotation.euler_angles();
                Orientation::roll_pitch_yaw(roll, pitch, yaw)
            }
        }
    }

    /// Same rotation, re-encoded as `kind`.
    pub fn convert(&self, kind: RotationKind) -> Self {
        if self.kind() == kind {
            *self
        } else {
            Orientation::from_rotation(&self.to_rotation(), kind)
        }
    }

    /// The three stored angle values, in storage order.
    pub fn components(&self) -> [Real; 3] {
        match *self {
            Orientation::Rodrigues { vector } => [vector.x, vector.y, vector.z],
            Orientation::RollPitchYaw { roll, pitch, yaw } => [roll, pitch, yaw],
        }
    }
}

/// Rotation vector taken through the quaternion; half-turns keep their axis.
fn rodrigues_of(rotation: &Rot3) -> Vec3 {
    UnitQuaternion::from_rotation_matrix(rotation).scaled_axis()
}

/// Translation (meters) plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vec3,
    pub orientation: Orientation,
}

impl Pose {
    pub fn new(translation: Vec3, orientation: Orientation) -> Self {
        Self {
            translation,
            orientation,
        }
    }

    /// Pose from a `[tx, ty, tz, rx, ry, rz]` row with a Rodrigues rotation.
    pub fn from_rodrigues_row(row: [Real; 6]) -> Self {
        Self::new(
            Vec3::new(row[0], row[1], row[2]),
            Orientation::rodrigues(Vec3::new(row[3], row[4], row[5])),
        )
    }

    /// Pose from a rigid transform, encoding the rotation as `kind`.
    pub fn from_isometry(iso: &Iso3, kind: RotationKind) -> Self {
        Self::new(
            iso.translation.vector,
            Orientation::from_rotation(&iso.rotation.to_rotation_matrix(), kind),
        )
    }

    pub fn identity(kind: RotationKind) -> Self {
        Self::from_isometry(&Iso3::identity(), kind)
    }

    pub fn kind(&self) -> RotationKind {
        self.orientation.kind()
    }

    pub fn to_isometry(&self) -> Iso3 {
        Iso3::from_parts(
            Translation3::from(self.translation),
            self.orientation.to_quaternion(),
        )
    }

    /// Same pose with its rotation re-encoded as `kind`.
    pub fn convert(&self, kind: RotationKind) -> Self {
        Self::new(self.translation, self.orientation.convert(kind))
    }

    pub fn inverse(&self) -> Self {
        Self::from_isometry(&self.to_isometry().inverse(), self.kind())
    }

    /// `[tx, ty, tz, r0, r1, r2]` in the stored representation.
    pub fn to_row(&self) -> [Real; 6] {
        let [r0, r1, r2] = self.orientation.components();
        [
            self.translation.x,
            self.translation.y,
            self.translation.z,
            r0,
            r1,
            r2,
        ]
    }
}

/// One full pass over the motion path: one pose per station.
///
/// Sequences are built once and only read afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseSequence {
    poses: Vec<Pose>,
}

impl PoseSequence {
    pub fn new(poses: Vec<Pose>) -> Self {
        Self { poses }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn get(&self, station: usize) -> Option<&Pose> {
        self.poses.get(station)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pose> {
        self.poses.iter()
    }

    pub fn into_poses(self) -> Vec<Pose> {
        self.poses
    }

    /// Every pose re-encoded as `kind`.
    pub fn convert(&self, kind: RotationKind) -> Self {
        self.poses.iter().map(|p| p.convert(kind)).collect()
    }

    pub fn to_isometries(&self) -> Vec<Iso3> {
        self.poses.iter().map(Pose::to_isometry).collect()
    }
}

impl FromIterator<Pose> for PoseSequence {
    fn from_iter<I: IntoIterator<Item = Pose>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PoseSequence {
    type Item = &'a Pose;
    type IntoIter = std::slice::Iter<'a, Pose>;

    fn into_iter(self) -> Self::IntoIter {
        self.poses.iter()
    }
}
