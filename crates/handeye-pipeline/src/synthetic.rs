//! Synthetic sessions for tests and demos.
//!
//! [`SyntheticScene`] places a camera and an IMU on a robot gripper above a
//! ChArUco board and produces everything a collection run would: a
//! [`SessionRecord`], a capture directory with detection sidecars, and a
//! [`BoardDetector`] that answers from ground truth.
//!
//! The arm lands on every station with a small deterministic repeatability
//! error; the controller, the camera and the IMU all observe that actual
//! pose. Averaging over repetitions therefore converges to the nominal path.

use crate::charuco::{
    BoardDetection, BoardDetector, CharucoBoard, CharucoError, CornerObservation, SidecarDetector,
};
use crate::session::SessionRecord;
use handeye_core::synthetic::motion::station_path;
use handeye_core::synthetic::noise::UniformPoseNoise;
use handeye_core::{
    CameraCalibration, CameraIntrinsics, ImuReading, ImuSample, ImuUnits, Iso3, Pose, Real,
    RotationKind, Seconds,
};
use nalgebra::{Translation3, UnitQuaternion};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Detector output for the board seen from `camera_se3_board`.
///
/// The first `markers` marker ids are reported and the first `corners`
/// interior corners (all of them when `None`) are projected through `camera`.
pub fn board_detection(
    board: &CharucoBoard,
    camera: &CameraCalibration,
    camera_se3_board: &Iso3,
    markers: usize,
    corners: Option<usize>,
) -> BoardDetection {
    let limit = corners.unwrap_or(usize::MAX);
    let corners = (0..board.interior_corners() as u32)
        .filter_map(|id| {
            let p = board.corner_position(id)?;
            let pixel = camera.project(&camera_se3_board.transform_point(&p))?;
            Some(CornerObservation { id, pixel })
        })
        .take(limit)
        .collect();
    BoardDetection {
        marker_ids: (0..markers.min(board.marker_count()) as u32).collect(),
        corners,
    }
}

/// What a synthetic image shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticView {
    pub camera_se3_board: Iso3,
    /// Visible markers; the whole board when `None`.
    pub markers: Option<usize>,
    /// Interpolated corners; the whole board when `None`.
    pub corners: Option<usize>,
}

impl SyntheticView {
    pub fn full(camera_se3_board: Iso3) -> Self {
        Self {
            camera_se3_board,
            markers: None,
            corners: None,
        }
    }

    pub fn detection(&self, board: &CharucoBoard, camera: &CameraCalibration) -> BoardDetection {
        board_detection(
            board,
            camera,
            &self.camera_se3_board,
            self.markers.unwrap_or(board.marker_count()),
            self.corners,
        )
    }
}

/// Answers detections from ground truth, keyed by image file name.
///
/// Unknown images show no board.
#[derive(Debug, Clone)]
pub struct SyntheticBoardDetector {
    board: CharucoBoard,
    camera: CameraCalibration,
    views: HashMap<PathBuf, SyntheticView>,
}

impl SyntheticBoardDetector {
    pub fn new(board: CharucoBoard, camera: CameraCalibration) -> Self {
        Self {
            board,
            camera,
            views: HashMap::new(),
        }
    }

    pub fn insert(&mut self, image: impl Into<PathBuf>, view: SyntheticView) {
        let image = image.into();
        let key = image.file_name().map(PathBuf::from).unwrap_or(image);
        self.views.insert(key, view);
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl BoardDetector for SyntheticBoardDetector {
    fn detect(&self, image: &Path) -> Result<BoardDetection, CharucoError> {
        let view = image
            .file_name()
            .and_then(|name| self.views.get(Path::new(name)));
        Ok(view
            .map(|v| v.detection(&self.board, &self.camera))
            .unwrap_or_default())
    }
}

/// File name of the capture taken at `t`.
pub fn capture_name(t: Seconds) -> String {
    format!("capture_{t:.3}.png")
}

/// Ground truth and timing of a synthetic collection run.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub repetitions: usize,
    pub stations: usize,
    pub board: CharucoBoard,
    pub camera: CameraCalibration,
    /// Camera pose in the gripper frame (X).
    pub gripper_se3_camera: Iso3,
    /// IMU pose in the gripper frame (Z).
    pub gripper_se3_imu: Iso3,
    pub base_se3_board: Iso3,
    /// Robot base in the IMU estimator's world frame.
    pub world_se3_base: Iso3,
    /// Repeatability error of the arm per `(repetition, station)`.
    pub repeatability: UniformPoseNoise,
    pub imu_units: ImuUnits,
    pub start_time: Seconds,
    /// Time between consecutive station arrivals.
    pub station_period: Seconds,
    /// Views `(repetition, station)` where most of the board is occluded.
    pub occluded: Vec<(usize, usize)>,
}

const CAPTURE_DELAY: Seconds = 0.5;
const DWELL: Seconds = 1.5;
const IMU_PERIOD: Seconds = 0.1;
const MOTION_START: Seconds = 1.2;
const MOTION_END: Seconds = 0.3;

impl Default for SyntheticScene {
    fn default() -> Self {
        let iso = |r: (Real, Real, Real), t: (Real, Real, Real)| {
            Iso3::from_parts(
                Translation3::new(t.0, t.1, t.2),
                UnitQuaternion::from_euler_angles(r.0, r.1, r.2),
            )
        };
        Self {
            repetitions: 3,
            stations: 8,
            board: CharucoBoard::default(),
            camera: CameraCalibration::pinhole(CameraIntrinsics {
                fx: 820.0,
                fy: 810.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            }),
            gripper_se3_camera: iso((0.05, -0.04, 0.1), (0.03, -0.02, 0.05)),
            gripper_se3_imu: iso((0.3, -0.1, 0.2), (-0.05, 0.04, 0.02)),
            base_se3_board: iso((0.0, 0.0, 0.0), (0.3475, -0.0075, 0.0)),
            world_se3_base: iso((0.0, 0.0, 0.7), (1.0, -0.5, 0.2)),
            repeatability: UniformPoseNoise {
                seed: 11,
                max_translation: 5e-4,
                max_angle: 1e-3,
            },
            imu_units: ImuUnits::default(),
            start_time: 1_697_712_000.0,
            station_period: 2.0,
            occluded: Vec::new(),
        }
    }
}

impl SyntheticScene {
    /// IMU pose in the camera frame (Y).
    pub fn camera_se3_imu(&self) -> Iso3 {
        self.gripper_se3_camera.inverse() * self.gripper_se3_imu
    }

    /// Commanded gripper poses, camera looking down at the board.
    pub fn nominal_path(&self) -> Vec<Iso3> {
        let look_down = Iso3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0.0, 0.0),
        );
        station_path(self.stations, [0.4, 0.0, 0.5])
            .into_iter()
            .map(|p| p * look_down)
            .collect()
    }

    /// Gripper pose the arm actually reached.
    pub fn actual_pose(&self, repetition: usize, station: usize) -> Iso3 {
        let nominal = self.nominal_path()[station];
        self.repeatability.apply(repetition, station, &nominal)
    }

    fn arrival(&self, repetition: usize, station: usize) -> Seconds {
        let index = repetition * self.stations + station;
        self.start_time + index as Seconds * self.station_period
    }

    pub fn capture_time(&self, repetition: usize, station: usize) -> Seconds {
        self.arrival(repetition, station) + CAPTURE_DELAY
    }

    pub fn view(&self, repetition: usize, station: usize) -> SyntheticView {
        let camera = self.actual_pose(repetition, station) * self.gripper_se3_camera;
        let view = SyntheticView::full(camera.inverse() * self.base_se3_board);
        if self.occluded.contains(&(repetition, station)) {
            SyntheticView {
                markers: Some(2),
                corners: Some(2),
                ..view
            }
        } else {
            view
        }
    }

    /// Robot poses, capture times, IMU markers and log of the whole run.
    pub fn session(&self) -> SessionRecord {
        let mut robot_poses = Vec::new();
        let mut capture_timestamps = Vec::new();
        let mut imu_intervals = Vec::new();
        let mut imu_log = Vec::new();
        let samples_per_dwell = (DWELL / IMU_PERIOD).round() as usize;

        for rep in 0..self.repetitions {
            for station in 0..self.stations {
                let gripper = self.actual_pose(rep, station);
                robot_poses.push(Pose::from_isometry(&gripper, RotationKind::Rodrigues));
                capture_timestamps.push(self.capture_time(rep, station));
                if station > 0 {
                    imu_intervals.push((
                        self.arrival(rep, station - 1) + MOTION_START,
                        self.arrival(rep, station) + MOTION_END,
                    ));
                }

                let world_se3_imu = self.world_se3_base * gripper * self.gripper_se3_imu;
                let reading = ImuReading::from_pose(
                    &Pose::from_isometry(&world_se3_imu, RotationKind::RollPitchYaw),
                    &self.imu_units,
                );
                let t0 = self.arrival(rep, station);
                imu_log.extend((0..=samples_per_dwell).map(|j| {
                    ImuSample::new(t0 + j as Seconds * IMU_PERIOD, reading)
                }));
            }
        }

        SessionRecord {
            repetitions: self.repetitions,
            stations: self.stations,
            robot_poses,
            capture_timestamps,
            imu_intervals,
            imu_log,
        }
    }

    /// Detector answering for the station captures by file name.
    pub fn detector(&self) -> SyntheticBoardDetector {
        let mut detector = SyntheticBoardDetector::new(self.board, self.camera);
        for rep in 0..self.repetitions {
            for station in 0..self.stations {
                detector.insert(
                    capture_name(self.capture_time(rep, station)),
                    self.view(rep, station),
                );
            }
        }
        detector
    }

    /// Fill `dir` with the camera stream of the run.
    ///
    /// Every station gets its capture plus a detection sidecar readable by
    /// `sidecar`. Two frames taken while the arm was moving surround it.
    /// Returns the station captures in session order.
    pub fn write_captures(&self, dir: &Path, sidecar: &SidecarDetector) -> io::Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut captures = Vec::new();
        for rep in 0..self.repetitions {
            for station in 0..self.stations {
                let t = self.capture_time(rep, station);
                let image = dir.join(capture_name(t));
                fs::write(&image, b"synthetic")?;
                let detection = self.view(rep, station).detection(&self.board, &self.camera);
                let json = serde_json::to_string(&detection).map_err(io::Error::other)?;
                fs::write(sidecar.sidecar_path(&image), json)?;

                for blurred in [t - 0.4, t + 0.9] {
                    fs::write(dir.join(capture_name(blurred)), b"motion blur")?;
                }
                captures.push(image);
            }
        }
        Ok(captures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charuco::MIN_POSE_MARKERS;

    #[test]
    fn full_view_sees_the_whole_board() {
        let scene = SyntheticScene::default();
        for station in 0..scene.stations {
            let det = scene.view(0, station).detection(&scene.board, &scene.camera);
            assert_eq!(det.corners.len(), scene.board.interior_corners());
            assert!(det.marker_ids.len() > MIN_POSE_MARKERS);
        }
    }

    #[test]
    fn occluded_views_are_sparse() {
        let scene = SyntheticScene {
            occluded: vec![(1, 2)],
            ..SyntheticScene::default()
        };
        let det = scene.view(1, 2).detection(&scene.board, &scene.camera);
        assert!(det.marker_ids.len() <= MIN_POSE_MARKERS);
        assert!(!scene.board.covers(det.corners.len()));
    }

    #[test]
    fn session_is_consistent() {
        let scene = SyntheticScene::default();
        let session = scene.session();
        session.validate().unwrap();
        for (start, end) in &session.imu_intervals {
            assert!(start < end);
        }
    }

    #[test]
    fn detector_answers_by_file_name() {
        let scene = SyntheticScene::default();
        let detector = scene.detector();
        assert_eq!(detector.len(), scene.repetitions * scene.stations);

        let name = capture_name(scene.capture_time(0, 0));
        let det = detector.detect(&Path::new("/any/dir").join(name)).unwrap();
        assert!(!det.corners.is_empty());
        assert_eq!(
            detector.detect(Path::new("unknown.png")).unwrap(),
            BoardDetection::default()
        );
    }
}
