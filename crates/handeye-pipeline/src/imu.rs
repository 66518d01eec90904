//! Alignment of IMU log entries with motion interval markers.

use handeye_core::{ImuSample, ImuUnits, Pose, PoseSequence, RotationKind, Seconds};
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImuMatchError {
    #[error("IMU log is empty")]
    NoSamples,
}

/// `(t_start, t_end)` of one motion between two consecutive stations.
pub type Interval = (Seconds, Seconds);

/// Log entries nearest to the start and end of one interval.
pub type SamplePair = (ImuSample, ImuSample);

/// Nearest-timestamp lookup of IMU log entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampMatcher {
    /// Matches further than this from their marker are reported as warnings.
    pub warn_offset_s: Option<Seconds>,
}

impl TimestampMatcher {
    pub fn new(warn_offset_s: Option<Seconds>) -> Self {
        Self { warn_offset_s }
    }

    /// For every interval, the log entries closest to its start and its end.
    ///
    /// Ties resolve to the earliest entry. The log is assumed to be ordered by
    /// timestamp but is scanned linearly, so an unordered log still yields the
    /// nearest entry.
    pub fn pick_pairs(
        &self,
        intervals: &[Interval],
        log: &[ImuSample],
    ) -> Result<Vec<SamplePair>, ImuMatchError> {
        if log.is_empty() {
            return Err(ImuMatchError::NoSamples);
        }

        let mut pairs = Vec::with_capacity(intervals.len());
        for (idx, &(t_start, t_end)) in intervals.iter().enumerate() {
            let start = self.nearest(idx, t_start, log)?;
            let end = self.nearest(idx, t_end, log)?;
            pairs.push((start, end));
        }
        Ok(pairs)
    }

    fn nearest(
        &self,
        interval: usize,
        wanted: Seconds,
        log: &[ImuSample],
    ) -> Result<ImuSample, ImuMatchError> {
        // `min_by` keeps the first of equal elements.
        let sample = log
            .iter()
            .min_by(|a, b| {
                (a.timestamp - wanted)
                    .abs()
                    .total_cmp(&(b.timestamp - wanted).abs())
            })
            .copied()
            .ok_or(ImuMatchError::NoSamples)?;

        let offset = (sample.timestamp - wanted).abs();
        debug!("interval {interval}: t={wanted:.3} matched with offset {offset:.4}s");
        if let Some(limit) = self.warn_offset_s {
            if offset > limit {
                warn!(
                    "interval {interval}: nearest IMU sample is {offset:.3}s from t={wanted:.3}"
                );
            }
        }
        Ok(sample)
    }
}

/// [`TimestampMatcher::pick_pairs`] without offset warnings.
pub fn pick_imu_pairs(
    intervals: &[Interval],
    log: &[ImuSample],
) -> Result<Vec<SamplePair>, ImuMatchError> {
    TimestampMatcher::default().pick_pairs(intervals, log)
}

/// Relative motion `T_start⁻¹ · T_end` of every pair, as Rodrigues poses.
///
/// Orientations are composed as rotation matrices, so a heading that crosses
/// ±180° yields the short rotation between the two samples.
pub fn pairs_to_relative_pose(pairs: &[SamplePair], units: &ImuUnits) -> PoseSequence {
    pairs
        .iter()
        .map(|(start, end)| {
            let relative =
                start.payload.to_isometry(units).inverse() * end.payload.to_isometry(units);
            Pose::from_isometry(&relative, RotationKind::Rodrigues)
        })
        .collect()
}

/// Absolute poses from a reference and consecutive relative motions.
///
/// Station 0 is `reference`; station `k` is `station(k-1) · deltas[k-1]`.
/// The output has one more pose than `deltas`.
pub fn chain_from_reference(reference: &Pose, deltas: &PoseSequence) -> PoseSequence {
    let mut current = reference.to_isometry();
    let mut poses = Vec::with_capacity(deltas.len() + 1);
    poses.push(reference.convert(RotationKind::Rodrigues));
    for delta in deltas {
        current *= delta.to_isometry();
        poses.push(Pose::from_isometry(&current, RotationKind::Rodrigues));
    }
    PoseSequence::new(poses)
}
