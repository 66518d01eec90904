use crate::average::AverageError;
use crate::captures::CaptureError;
use crate::charuco::CharucoError;
use crate::handeye::HandEyeError;
use crate::imu::ImuMatchError;
use crate::io::PersistError;
use thiserror::Error;

/// Any failure of a calibration run. All of them end the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("averaging: {0}")]
    Average(#[from] AverageError),
    #[error("imu: {0}")]
    Imu(#[from] ImuMatchError),
    #[error("captures: {0}")]
    Captures(#[from] CaptureError),
    #[error("charuco: {0}")]
    Charuco(#[from] CharucoError),
    #[error("hand-eye: {0}")]
    HandEye(#[from] HandEyeError),
    #[error("persist: {0}")]
    Persist(#[from] PersistError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
