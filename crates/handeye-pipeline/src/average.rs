//! Averaging of repeated passes over the same station path.
//!
//! Each repetition of the motion path yields one [`PoseSequence`]. Averaging
//! combines the poses that share a station index (a *station group*) into a
//! single representative pose:
//!
//! - translations: arithmetic mean,
//! - rotations: quaternion eigen-average (Markley et al., 2007). The mean is
//!   the principal eigenvector of `M = Σ qᵢ qᵢᵀ`, which minimizes the sum of
//!   squared chordal distances. It is independent of quaternion sign, of the
//!   order of the inputs, and returns `q` itself for duplicated inputs.
//!   Component-wise averaging of Rodrigues vectors is never used.

use crate::charuco::Detection;
use handeye_core::{Orientation, Pose, PoseSequence, Real, Vec3};
use log::debug;
use nalgebra::{Matrix4, Quaternion, SymmetricEigen, UnitQuaternion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AverageError {
    /// A sequence does not have one pose per station.
    #[error("sequence {index} has {got} stations, expected {expected}")]
    ShapeMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
    /// The number of sequences differs from the number of repetitions.
    #[error("expected {repetitions} sequences (one per repetition), got {sequences}")]
    RepetitionMismatch { repetitions: usize, sequences: usize },
    /// Poses of one station use different rotation encodings.
    #[error("station {station} mixes rotation representations")]
    MixedRepresentation { station: usize },
    /// A flat list cannot be split into equal repetitions.
    #[error("{len} poses cannot be split into {repetitions} equal repetitions")]
    NotDivisible { len: usize, repetitions: usize },
    #[error("nothing to average")]
    Empty,
}

/// Average repeated passes into one pose per station.
///
/// With `repetitions == 1` the single sequence is returned unchanged.
pub fn average(
    sequences: &[PoseSequence],
    repetitions: usize,
) -> Result<PoseSequence, AverageError> {
    check_shape(sequences.iter().map(PoseSequence::len), sequences.len(), repetitions)?;

    if repetitions == 1 {
        return Ok(sequences[0].clone());
    }

    let stations = sequences[0].len();
    let mut averaged = Vec::with_capacity(stations);
    for station in 0..stations {
        let group: Vec<Pose> = sequences.iter().map(|s| s.poses()[station]).collect();
        averaged.push(average_station(station, &group)?);
    }
    debug!("averaged {repetitions} repetitions over {stations} stations");
    Ok(PoseSequence::new(averaged))
}

/// Per-station average of possibly missing poses, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedStream {
    /// Averaged pose per station; `None` where no repetition contributed.
    pub stations: Vec<Option<Pose>>,
    /// How many repetitions contributed to each station.
    pub contributors: Vec<usize>,
    pub repetitions: usize,
}

impl AveragedStream {
    /// Stations without any contributing pose.
    pub fn missing_stations(&self) -> Vec<usize> {
        self.stations
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| p.is_none().then_some(idx))
            .collect()
    }

    /// Stations averaged from fewer than `repetitions` poses.
    pub fn partial_stations(&self) -> Vec<usize> {
        self.contributors
            .iter()
            .enumerate()
            .filter_map(|(idx, &n)| (n > 0 && n < self.repetitions).then_some(idx))
            .collect()
    }

    /// Sum of contributing poses over all stations.
    pub fn total_contributors(&self) -> usize {
        self.contributors.iter().sum()
    }
}

/// Average per-image detections of repeated passes.
///
/// Only detected entries contribute; the contributor count per station is
/// kept so the provenance of every averaged pose stays inspectable.
pub fn average_detections(
    sequences: &[Vec<Detection>],
    repetitions: usize,
) -> Result<AveragedStream, AverageError> {
    check_shape(sequences.iter().map(Vec::len), sequences.len(), repetitions)?;

    let stations = sequences[0].len();
    let mut averaged = Vec::with_capacity(stations);
    let mut contributors = Vec::with_capacity(stations);

    for station in 0..stations {
        let group: Vec<Pose> = sequences
            .iter()
            .filter_map(|s| s[station].pose().copied())
            .collect();
        contributors.push(group.len());
        if group.is_empty() {
            debug!("station {station}: no detections in any repetition");
            averaged.push(None);
        } else if group.len() == 1 {
            averaged.push(Some(group[0]));
        } else {
            averaged.push(Some(average_station(station, &group)?));
        }
    }

    Ok(AveragedStream {
        stations: averaged,
        contributors,
        repetitions,
    })
}

/// Average one station group. The result keeps the group's rotation encoding.
pub fn average_station(station: usize, group: &[Pose]) -> Result<Pose, AverageError> {
    let first = group.first().ok_or(AverageError::Empty)?;
    let kind = first.kind();
    if group.iter().any(|p| p.kind() != kind) {
        return Err(AverageError::MixedRepresentation { station });
    }

    let translation = group.iter().map(|p| p.translation).sum::<Vec3>() / group.len() as Real;
    let quats: Vec<UnitQuaternion<Real>> =
        group.iter().map(|p| p.orientation.to_quaternion()).collect();
    let rotation = mean_rotation(&quats).ok_or(AverageError::Empty)?;

    Ok(Pose::new(
        translation,
        Orientation::from_rotation(&rotation.to_rotation_matrix(), kind),
    ))
}

/// Chordal L2 mean of unit quaternions (principal eigenvector of `Σ q qᵀ`).
pub fn mean_rotation(quats: &[UnitQuaternion<Real>]) -> Option<UnitQuaternion<Real>> {
    if quats.is_empty() {
        return None;
    }

    let mut acc = Matrix4::<Real>::zeros();
    for q in quats {
        let v = q.coords;
        acc += v * v.transpose();
    }

    let eig = SymmetricEigen::new(acc);
    let (idx, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    let v = eig.eigenvectors.column(idx).into_owned();
    Some(UnitQuaternion::new_normalize(Quaternion::from_vector(v)))
}

/// Split a sequence into parallel translation and Rodrigues rotation arrays.
pub fn split(sequence: &PoseSequence) -> (Vec<Vec3>, Vec<Vec3>) {
    sequence
        .iter()
        .map(|p| (p.translation, p.orientation.to_rodrigues()))
        .unzip()
}

/// Cut a flat run-long pose list into `repetitions` per-pass sequences.
pub fn regroup(flat: Vec<Pose>, repetitions: usize) -> Result<Vec<PoseSequence>, AverageError> {
    if repetitions == 0 || flat.is_empty() {
        return Err(AverageError::Empty);
    }
    if flat.len() % repetitions != 0 {
        return Err(AverageError::NotDivisible {
            len: flat.len(),
            repetitions,
        });
    }
    let stations = flat.len() / repetitions;
    Ok(flat
        .chunks(stations)
        .map(|chunk| PoseSequence::new(chunk.to_vec()))
        .collect())
}

fn check_shape(
    lens: impl Iterator<Item = usize>,
    sequences: usize,
    repetitions: usize,
) -> Result<(), AverageError> {
    if repetitions == 0 || sequences == 0 {
        return Err(AverageError::Empty);
    }
    if sequences != repetitions {
        return Err(AverageError::RepetitionMismatch {
            repetitions,
            sequences,
        });
    }
    let lens: Vec<usize> = lens.collect();
    let expected = lens[0];
    if let Some((index, &got)) = lens.iter().enumerate().find(|(_, &n)| n != expected) {
        return Err(AverageError::ShapeMismatch {
            index,
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use handeye_core::{rotation_angle_between, RotationKind};

    fn pose(t: [Real; 3], r: [Real; 3]) -> Pose {
        Pose::from_rodrigues_row([t[0], t[1], t[2], r[0], r[1], r[2]])
    }

    fn assert_pose_close(a: &Pose, b: &Pose, tol: Real) {
        assert!(
            (a.translation - b.translation).norm() < tol,
            "translation {} vs {}",
            a.translation,
            b.translation
        );
        let angle =
            rotation_angle_between(&a.orientation.to_rotation(), &b.orientation.to_rotation());
        assert!(angle < tol, "rotation differs by {angle} rad");
    }

    fn sample_sequence(offset: Real) -> PoseSequence {
        PoseSequence::new(vec![
            pose([0.1 + offset, 0.2, 0.3], [0.1, 0.0, offset]),
            pose([0.4, 0.5 - offset, 0.6], [0.0, 0.3 + offset, 0.1]),
            pose([0.7, 0.8, 0.9 + offset], [-0.2, 0.1, 0.5]),
        ])
    }

    #[test]
    fn single_repetition_is_identity() {
        let seq = sample_sequence(0.0);
        let out = average(std::slice::from_ref(&seq), 1).unwrap();
        assert_eq!(out, seq);
    }

    #[test]
    fn duplicates_average_to_themselves() {
        let seq = sample_sequence(0.01);
        let out = average(&[seq.clone(), seq.clone()], 2).unwrap();
        for (a, b) in out.iter().zip(seq.iter()) {
            assert_pose_close(a, b, 1e-6);
        }
    }

    #[test]
    fn averaging_is_order_invariant() {
        let a = sample_sequence(0.0);
        let b = sample_sequence(0.05);
        let c = sample_sequence(-0.03);
        let abc = average(&[a.clone(), b.clone(), c.clone()], 3).unwrap();
        let cab = average(&[c, a, b], 3).unwrap();
        for (x, y) in abc.iter().zip(cab.iter()) {
            assert_pose_close(x, y, 1e-9);
        }
    }

    #[test]
    fn rotations_across_the_pi_boundary_average_correctly() {
        // Both rotate ~π about z, from either side of the Rodrigues wrap.
        let pi = std::f64::consts::PI;
        let a = pose([0.0; 3], [0.0, 0.0, pi - 0.1]);
        let b = pose([0.0; 3], [0.0, 0.0, -(pi - 0.1)]);
        let avg = average_station(0, &[a, b]).unwrap();

        let expected = pose([0.0; 3], [0.0, 0.0, pi]);
        assert_pose_close(&avg, &expected, 1e-9);
        // Naive component-wise averaging would yield the identity instead.
        assert!(avg.orientation.to_rodrigues().norm() > 3.0);
    }

    #[test]
    fn tool_pointing_down_survives_averaging() {
        let pi = std::f64::consts::PI;
        let down = pose([0.4, 0.0, 0.5], [pi, 0.0, 0.0]);
        let seq = PoseSequence::new(vec![down]);
        let avg = average(&[seq.clone(), seq], 2).unwrap();
        assert_pose_close(&avg.poses()[0], &down, 1e-9);
        assert!((avg.poses()[0].orientation.to_rodrigues().norm() - pi).abs() < 1e-9);

        let a = pose([0.0; 3], [pi - 0.02, 0.0, 0.0]);
        let b = pose([0.0; 3], [-(pi - 0.02), 0.0, 0.0]);
        let avg = average_station(0, &[a, b]).unwrap();
        assert!((avg.orientation.to_rodrigues().norm() - pi).abs() < 1e-9);
    }

    #[test]
    fn representation_is_preserved() {
        let a = Pose::new(Vec3::zeros(), Orientation::roll_pitch_yaw(0.1, 0.0, 0.2));
        let b = Pose::new(Vec3::zeros(), Orientation::roll_pitch_yaw(0.3, 0.0, 0.2));
        let avg = average_station(0, &[a, b]).unwrap();
        assert_eq!(avg.kind(), RotationKind::RollPitchYaw);
        let (roll, pitch, yaw) = avg.orientation.to_roll_pitch_yaw();
        assert!((roll - 0.2).abs() < 1e-9);
        assert!(pitch.abs() < 1e-9);
        assert!((yaw - 0.2).abs() < 1e-9);
    }

    #[test]
    fn mixed_representations_are_rejected() {
        let a = pose([0.0; 3], [0.1, 0.0, 0.0]);
        let b = Pose::new(Vec3::zeros(), Orientation::roll_pitch_yaw(0.1, 0.0, 0.0));
        let err = average_station(4, &[a, b]).unwrap_err();
        assert!(matches!(err, AverageError::MixedRepresentation { station: 4 }));
    }

    #[test]
    fn unequal_lengths_fail_with_shape_mismatch() {
        let a = sample_sequence(0.0);
        let b = PoseSequence::new(a.poses()[..2].to_vec());
        let err = average(&[a, b], 2).unwrap_err();
        assert!(matches!(
            err,
            AverageError::ShapeMismatch {
                index: 1,
                expected: 3,
                got: 2
            }
        ));
    }

    #[test]
    fn repetition_count_must_match() {
        let a = sample_sequence(0.0);
        let err = average(&[a.clone(), a], 3).unwrap_err();
        assert!(matches!(
            err,
            AverageError::RepetitionMismatch {
                repetitions: 3,
                sequences: 2
            }
        ));
    }

    #[test]
    fn detections_report_contributors() {
        let p = pose([0.1, 0.2, 0.3], [0.0, 0.1, 0.0]);
        let q = pose([0.3, 0.2, 0.1], [0.0, 0.3, 0.0]);
        let reps = vec![
            vec![Detection::Detected(p), Detection::NotDetected, Detection::Detected(p)],
            vec![Detection::Detected(q), Detection::NotDetected, Detection::NotDetected],
        ];
        let stream = average_detections(&reps, 2).unwrap();

        assert_eq!(stream.contributors, vec![2, 0, 1]);
        assert_eq!(stream.missing_stations(), vec![1]);
        assert_eq!(stream.partial_stations(), vec![2]);
        assert_eq!(stream.total_contributors(), 3);
        assert_eq!(stream.stations[2], Some(p));

        let mid = stream.stations[0].unwrap();
        assert!((mid.translation - Vec3::new(0.2, 0.2, 0.2)).norm() < 1e-12);
        assert!((mid.orientation.to_rodrigues() - Vec3::new(0.0, 0.2, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn split_yields_parallel_arrays() {
        let seq = sample_sequence(0.0).convert(RotationKind::RollPitchYaw);
        let (t, r) = split(&seq);
        assert_eq!(t.len(), 3);
        assert_eq!(r.len(), 3);
        assert!((r[2] - Vec3::new(-0.2, 0.1, 0.5)).norm() < 1e-9);
        assert_eq!(t[1], Vec3::new(0.4, 0.5, 0.6));
    }

    #[test]
    fn regroup_cuts_equal_passes() {
        let flat: Vec<Pose> = sample_sequence(0.0)
            .into_poses()
            .into_iter()
            .chain(sample_sequence(0.1).into_poses())
            .collect();
        let passes = regroup(flat.clone(), 2).unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].poses(), &flat[3..]);
        assert!(matches!(
            regroup(flat, 4),
            Err(AverageError::NotDivisible {
                len: 6,
                repetitions: 4
            })
        ));
    }
}
