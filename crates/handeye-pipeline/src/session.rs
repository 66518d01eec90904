//! Offline calibration of one recorded session.
//!
//! A [`SessionRecord`] holds everything the data collection produced except
//! the images: robot poses and capture timestamps per station, IMU interval
//! markers and the IMU log. [`run_calibration`] combines it with the capture
//! directory:
//!
//! 1. average the robot poses over repetitions,
//! 2. select one capture per station, calibrate intrinsics once over all of
//!    them and estimate a board pose per capture, averaged over repetitions,
//! 3. match the IMU markers against the log, chain the relative motions into
//!    per-station poses and average them,
//! 4. solve X, Y and Z over the stations with a board pose and write every
//!    output file.

use crate::average::{average, average_detections, regroup, AveragedStream};
use crate::captures::partition;
use crate::charuco::{load_intrinsics_cache, BoardDetector, CharucoError, CharucoEstimator};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::handeye::{calibrate_all, Extrinsics};
use crate::imu::{chain_from_reference, pairs_to_relative_pose, Interval};
use crate::io;
use handeye_core::{CameraCalibration, ImuSample, Pose, PoseSequence, RotationKind, Seconds};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Finalized data of one collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub repetitions: usize,
    pub stations: usize,
    /// Gripper poses in the robot base, `repetitions × stations`, pass-major.
    pub robot_poses: Vec<Pose>,
    /// Capture time of every station, in the same order as `robot_poses`.
    pub capture_timestamps: Vec<Seconds>,
    /// Motion into every station but the first, `repetitions × (stations - 1)`.
    pub imu_intervals: Vec<Interval>,
    pub imu_log: Vec<ImuSample>,
}

impl SessionRecord {
    pub fn load(path: &Path) -> Result<Self> {
        let session: SessionRecord = io::read_json(path)?;
        session.validate()?;
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        Ok(io::write_json(path, self)?)
    }

    /// Check that every stream has one entry per station and repetition.
    pub fn validate(&self) -> Result<()> {
        if self.repetitions == 0 || self.stations == 0 {
            return Err(PipelineError::InvalidSession(
                "repetitions and stations must be positive".into(),
            ));
        }
        let per_station = self.repetitions * self.stations;
        let per_motion = self.repetitions * (self.stations - 1);
        for (name, got, want) in [
            ("robot_poses", self.robot_poses.len(), per_station),
            ("capture_timestamps", self.capture_timestamps.len(), per_station),
            ("imu_intervals", self.imu_intervals.len(), per_motion),
        ] {
            if got != want {
                return Err(PipelineError::InvalidSession(format!(
                    "{name} has {got} entries, expected {want} for {} repetitions of {} stations",
                    self.repetitions, self.stations
                )));
            }
        }
        Ok(())
    }
}

/// Summary written to `calibration_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub repetitions: usize,
    pub stations: usize,
    pub camera: CameraCalibration,
    /// Images that contributed to the intrinsics, `None` when loaded from cache.
    pub intrinsics_images_used: Option<usize>,
    pub intrinsics_images_skipped: usize,
    /// Repetitions with a board pose, per station.
    pub board_contributors: Vec<usize>,
    /// Stations that entered the hand-eye solutions.
    pub stations_used: Vec<usize>,
    pub extrinsics: Extrinsics,
}

/// Everything a run computed.
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub robot: PoseSequence,
    pub imu: PoseSequence,
    pub board: AveragedStream,
    pub report: CalibrationReport,
}

/// Run the whole pipeline and write its outputs to `output_dir`.
///
/// The capture directory is consumed according to
/// `config.captures.discard`; nothing is deleted when selection fails.
pub fn run_calibration<D: BoardDetector>(
    session: &SessionRecord,
    captures_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    detector: D,
) -> Result<CalibrationOutcome> {
    session.validate()?;
    let reps = session.repetitions;
    fs::create_dir_all(output_dir).map_err(|source| io::PersistError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    // Robot
    let robot = average(&regroup(session.robot_poses.clone(), reps)?, reps)?
        .convert(RotationKind::Rodrigues);
    info!("robot: {} stations averaged over {reps} repetitions", robot.len());

    // Camera
    let files = config
        .captures
        .selector()
        .select(captures_dir, &session.capture_timestamps, config.captures.discard)?;
    let passes = partition(&files, reps)?;

    let cache_path = resolve(output_dir, &config.intrinsics_cache);
    let mut estimator = CharucoEstimator::new(config.board, detector).with_cache(&cache_path);
    let (used, skipped) = if config.reuse_intrinsics && cache_path.exists() {
        let camera = load_intrinsics_cache(&cache_path)?;
        info!("intrinsics loaded from {}", cache_path.display());
        estimator.set_intrinsics(camera)?;
        (None, 0)
    } else {
        let paths: Vec<&Path> = files.iter().map(|c| c.path.as_path()).collect();
        let report = estimator.calibrate_intrinsics(&paths)?;
        (Some(report.used), report.skipped.len())
    };
    let camera = *estimator.camera().ok_or(CharucoError::NotCalibrated)?;

    let mut detections = Vec::with_capacity(reps);
    for (rep, pass) in passes.iter().enumerate() {
        let paths: Vec<&Path> = pass.iter().map(|c| c.path.as_path()).collect();
        let report = estimator.estimate_poses(&paths)?;
        info!(
            "repetition {rep}: board pose in {} of {} captures",
            report.detected(),
            report.total()
        );
        detections.push(report.detections);
    }
    let board = average_detections(&detections, reps)?;
    for station in board.missing_stations() {
        warn!("station {station}: no board pose in any repetition, excluded");
    }

    // IMU
    let pairs = config
        .imu
        .matcher()
        .pick_pairs(&session.imu_intervals, &session.imu_log)?;
    let deltas = pairs_to_relative_pose(&pairs, &config.imu.units).into_poses();
    let per_pass = session.stations - 1;
    let reference = Pose::identity(RotationKind::Rodrigues);
    let imu_passes: Vec<PoseSequence> = (0..reps)
        .map(|rep| {
            let pass = PoseSequence::new(deltas[rep * per_pass..(rep + 1) * per_pass].to_vec());
            chain_from_reference(&reference, &pass)
        })
        .collect();
    let imu = average(&imu_passes, reps)?;
    info!("imu: {} interval pairs chained into {} stations", pairs.len(), imu.len());

    // Hand-eye over stations with a board pose.
    let stations_used: Vec<usize> = (0..session.stations)
        .filter(|&s| board.stations[s].is_some())
        .collect();
    let pick = |seq: &PoseSequence| -> PoseSequence {
        stations_used.iter().map(|&s| seq.poses()[s]).collect()
    };
    let board_used: PoseSequence = board.stations.iter().flatten().copied().collect();
    let extrinsics = calibrate_all(
        &pick(&robot),
        &board_used,
        &pick(&imu),
        &config.handeye.options(),
    )?;

    let report = CalibrationReport {
        repetitions: reps,
        stations: session.stations,
        camera,
        intrinsics_images_used: used,
        intrinsics_images_skipped: skipped,
        board_contributors: board.contributors.clone(),
        stations_used,
        extrinsics,
    };
    write_outputs(output_dir, &robot, &imu, &board, &report)?;

    Ok(CalibrationOutcome {
        robot,
        imu,
        board,
        report,
    })
}

fn write_outputs(
    dir: &Path,
    robot: &PoseSequence,
    imu: &PoseSequence,
    board: &AveragedStream,
    report: &CalibrationReport,
) -> Result<()> {
    io::write_pose_csv(&dir.join(io::ROBOT_POSES_FILE), robot)?;
    io::write_pose_csv(&dir.join(io::IMU_POSES_FILE), imu)?;
    io::write_station_csv(&dir.join(io::CHARUCO_POSES_FILE), &board.stations)?;

    let ext = &report.extrinsics;
    io::write_calibration_text(&dir.join(io::CAMERA_TO_TCP_FILE), &ext.camera_to_tcp)?;
    io::write_calibration_text(&dir.join(io::IMU_TO_CAMERA_FILE), &ext.imu_to_camera)?;
    io::write_calibration_text(&dir.join(io::IMU_TO_TCP_FILE), &ext.imu_to_tcp)?;
    io::write_json(&dir.join(io::REPORT_FILE), report)?;
    info!("outputs written to {}", dir.display());
    Ok(())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(reps: usize, stations: usize) -> SessionRecord {
        SessionRecord {
            repetitions: reps,
            stations,
            robot_poses: vec![Pose::identity(RotationKind::Rodrigues); reps * stations],
            capture_timestamps: vec![0.0; reps * stations],
            imu_intervals: vec![(0.0, 1.0); reps * (stations - 1)],
            imu_log: Vec::new(),
        }
    }

    #[test]
    fn consistent_session_validates() {
        session(2, 4).validate().unwrap();
        session(1, 1).validate().unwrap();
    }

    #[test]
    fn inconsistent_streams_are_rejected() {
        let mut s = session(2, 4);
        s.imu_intervals.pop();
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("imu_intervals"), "{err}");

        let mut s = session(2, 4);
        s.repetitions = 0;
        assert!(matches!(s.validate(), Err(PipelineError::InvalidSession(_))));
    }

    #[test]
    fn relative_cache_path_lands_in_output() {
        let out = Path::new("/tmp/run");
        assert_eq!(
            resolve(out, Path::new("cache.bin")),
            PathBuf::from("/tmp/run/cache.bin")
        );
        assert_eq!(
            resolve(out, Path::new("/var/cache.bin")),
            PathBuf::from("/var/cache.bin")
        );
    }
}
