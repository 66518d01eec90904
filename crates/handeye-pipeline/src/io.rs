//! Persisted outputs of a calibration run.
//!
//! Pose tables are headerless CSV with one `tx,ty,tz,rx,ry,rz` row per
//! station (meters, Rodrigues radians). A station without a pose is written
//! as a row of `NaN` so rows of all tables stay aligned by station.

use crate::handeye::CalibrationResult;
use handeye_core::{Pose, PoseSequence, Real};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ROBOT_POSES_FILE: &str = "robot_poses.csv";
pub const IMU_POSES_FILE: &str = "imu_poses.csv";
pub const CHARUCO_POSES_FILE: &str = "charuco_poses.csv";
pub const CAMERA_TO_TCP_FILE: &str = "camera2tcp_calibMat.txt";
pub const IMU_TO_CAMERA_FILE: &str = "imu2camera_calibMat.txt";
pub const IMU_TO_TCP_FILE: &str = "imu2tcp_calibMat.txt";
pub const REPORT_FILE: &str = "calibration_report.json";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: row {row} has {len} values, expected 6", path.display())]
    BadRow { path: PathBuf, row: usize, len: usize },
    #[error("{}: row {row}: {value:?} is not a number", path.display())]
    BadValue {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write one row per pose.
pub fn write_pose_csv(path: &Path, poses: &PoseSequence) -> Result<(), PersistError> {
    let rows: Vec<Option<Pose>> = poses.iter().copied().map(Some).collect();
    write_station_csv(path, &rows)
}

/// Write one row per station; `None` becomes a row of `NaN`.
pub fn write_station_csv(path: &Path, stations: &[Option<Pose>]) -> Result<(), PersistError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for station in stations {
        let row = station.map(|p| p.to_row()).unwrap_or([Real::NAN; 6]);
        writer.serialize(row)?;
    }
    writer.flush().map_err(io_error(path))
}

/// Read a pose table back. Rotations are read as Rodrigues vectors.
pub fn read_pose_csv(path: &Path) -> Result<Vec<Option<Pose>>, PersistError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != 6 {
            return Err(PersistError::BadRow {
                path: path.to_path_buf(),
                row,
                len: record.len(),
            });
        }
        let mut values: [Real; 6] = [0.0; 6];
        for (slot, field) in values.iter_mut().zip(record.iter()) {
            *slot = field.trim().parse().map_err(|_| PersistError::BadValue {
                path: path.to_path_buf(),
                row,
                value: field.to_string(),
            })?;
        }
        out.push(if values.iter().all(|v| v.is_nan()) {
            None
        } else {
            Some(Pose::from_rodrigues_row(values))
        });
    }
    Ok(out)
}

/// Human-readable calibration matrix file.
pub fn write_calibration_text(path: &Path, result: &CalibrationResult) -> Result<(), PersistError> {
    fs::write(path, result.to_string()).map_err(io_error(path))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(io_error(path))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let text = fs::read_to_string(path).map_err(io_error(path))?;
    serde_json::from_str(&text).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })
}
