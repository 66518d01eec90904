//! Synthetic station paths.

use crate::{Iso3, Real};
use nalgebra::{Translation3, UnitQuaternion};

/// Generate `stations` well-conditioned flange poses (base → gripper).
///
/// The path wobbles around `center` with rotations of up to ~0.5 rad about
/// varying axes, which keeps consecutive motion pairs far from the
/// small-angle and parallel-axis degeneracies of hand-eye solvers.
pub fn station_path(stations: usize, center: [Real; 3]) -> Vec<Iso3> {
    (0..stations)
        .map(|k| {
            let s = k as Real;
            let roll = 0.35 * (1.3 * s + 0.2).sin();
            let pitch = 0.30 * (0.9 * s + 1.1).cos();
            let yaw = 0.50 * (0.7 * s + 0.4).sin();
            let t = Translation3::new(
                center[0] + 0.08 * (0.8 * s).cos(),
                center[1] + 0.06 * (1.1 * s).sin(),
                center[2] + 0.04 * (0.5 * s + 0.3).sin(),
            );
            Iso3::from_parts(t, UnitQuaternion::from_euler_angles(roll, pitch, yaw))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_stations_differ() {
        let path = station_path(6, [0.4, 0.0, 0.5]);
        assert_eq!(path.len(), 6);
        for w in path.windows(2) {
            let rel = w[0].inverse() * w[1];
            assert!(rel.rotation.angle() > 0.05);
        }
    }
}
