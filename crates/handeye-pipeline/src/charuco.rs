//! ChArUco board intrinsics and per-image board pose estimation.
//!
//! Marker detection and corner interpolation are external: they enter
//! through [`BoardDetector`]. The numerical solvers sit behind
//! [`IntrinsicsSolver`] and [`BoardPoseSolver`]; the default implementations
//! are the closed-form linear solvers of `handeye-linear` (Zhang intrinsics,
//! homography pose) and assume a distortion-free camera for calibration.
//!
//! [`CharucoEstimator`] walks `Uncalibrated -> IntrinsicsKnown ->
//! PosesEstimated`. Intrinsics are estimated once over all captures; poses
//! can then be estimated for any number of image batches.

use handeye_core::{
    CameraCalibration, CameraIntrinsics, DistortionCoeffs, Iso3, Mat3, Pose, Pt2, Pt3, Real,
    RotationKind, Vec2,
};
use handeye_linear::{
    dlt_homography, estimate_focal_from_homographies, estimate_intrinsics_from_homographies,
    estimate_planar_pose_from_h, HomographyError, IntrinsicsError, PlanarPoseError,
};
use log::{debug, info, warn};
use nalgebra::Affine2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A pose is only estimated when strictly more markers than this are seen.
pub const MIN_POSE_MARKERS: usize = 5;

/// File name of the binary intrinsics cache.
pub const CALIBRATION_CACHE_FILE: &str = "charuco_calibration_values.bin";

#[derive(Debug, Error)]
pub enum CharucoError {
    #[error("no usable board in any of {images} images")]
    NoBoardDetected { images: usize },
    #[error("camera intrinsics are not known yet")]
    NotCalibrated,
    #[error("board poses were already estimated with the current intrinsics")]
    PosesAlreadyEstimated,
    #[error("homography: {0}")]
    Homography(#[from] HomographyError),
    #[error("intrinsics: {0}")]
    Intrinsics(#[from] IntrinsicsError),
    #[error("planar pose: {0}")]
    PlanarPose(#[from] PlanarPoseError),
    #[error("solver failed: {0}")]
    Solver(String),
    #[error("invalid detection file {}: {source}", path.display())]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("intrinsics cache: {0}")]
    Cache(#[from] postcard::Error),
}

/// Geometry of a ChArUco board. Lengths in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharucoBoard {
    pub squares_x: u32,
    pub squares_y: u32,
    pub square_length: Real,
    pub marker_length: Real,
}

impl Default for CharucoBoard {
    fn default() -> Self {
        Self {
            squares_x: 5,
            squares_y: 3,
            square_length: 0.055,
            marker_length: 0.043,
        }
    }
}

impl CharucoBoard {
    /// Number of interior chessboard corners.
    pub fn interior_corners(&self) -> usize {
        (self.squares_x.saturating_sub(1) * self.squares_y.saturating_sub(1)) as usize
    }

    /// Number of ArUco markers (one per white square).
    pub fn marker_count(&self) -> usize {
        (self.squares_x * self.squares_y / 2) as usize
    }

    /// Board-frame position of an interior corner (on `Z = 0`).
    pub fn corner_position(&self, id: u32) -> Option<Pt3> {
        if id as usize >= self.interior_corners() {
            return None;
        }
        let per_row = self.squares_x - 1;
        Some(Pt3::new(
            (id % per_row) as Real * self.square_length,
            (id / per_row) as Real * self.square_length,
            0.0,
        ))
    }

    /// Whether `corners` detected corners cover more than half of the board.
    pub fn covers(&self, corners: usize) -> bool {
        corners * 2 > self.interior_corners()
    }
}

/// One interpolated ChArUco corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerObservation {
    pub id: u32,
    pub pixel: Pt2,
}

/// Detector output for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDetection {
    pub marker_ids: Vec<u32>,
    pub corners: Vec<CornerObservation>,
}

impl BoardDetection {
    /// `(board xy, pixel)` correspondences; ids outside the board are dropped.
    pub fn correspondences(&self, board: &CharucoBoard) -> (Vec<Pt2>, Vec<Pt2>) {
        self.corners
            .iter()
            .filter_map(|c| {
                board
                    .corner_position(c.id)
                    .map(|p| (Pt2::new(p.x, p.y), c.pixel))
            })
            .unzip()
    }
}

/// Board pose for one image, or the explicit absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Detection {
    Detected(Pose),
    NotDetected,
}

impl Detection {
    pub fn pose(&self) -> Option<&Pose> {
        match self {
            Detection::Detected(pose) => Some(pose),
            Detection::NotDetected => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, Detection::Detected(_))
    }
}

/// Marker detection and corner interpolation for one image.
pub trait BoardDetector {
    fn detect(&self, image: &Path) -> Result<BoardDetection, CharucoError>;
}

/// Camera intrinsics from several views of the board.
pub trait IntrinsicsSolver {
    fn calibrate(
        &self,
        board: &CharucoBoard,
        views: &[BoardDetection],
    ) -> Result<CameraCalibration, CharucoError>;
}

/// Board pose in the camera frame (`^C T_T`) from one view.
pub trait BoardPoseSolver {
    fn board_pose(
        &self,
        board: &CharucoBoard,
        camera: &CameraCalibration,
        detection: &BoardDetection,
    ) -> Result<Iso3, CharucoError>;
}

/// Zhang's closed-form intrinsics from per-view homographies. No distortion.
///
/// Pixels are conditioned by an upper-triangular similarity `T` before the
/// homographies are built, so the closed form sees coordinates of order one.
/// The result is mapped back with `K = T⁻¹ K'`.
///
/// With fewer than [`MIN_ZHANG_VIEWS`] views only the focal length is solved:
/// zero skew, square pixels and the principal point at the corner centroid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZhangIntrinsicsSolver;

/// Views needed for the full closed form.
pub const MIN_ZHANG_VIEWS: usize = 3;

impl IntrinsicsSolver for ZhangIntrinsicsSolver {
    fn calibrate(
        &self,
        board: &CharucoBoard,
        views: &[BoardDetection],
    ) -> Result<CameraCalibration, CharucoError> {
        let views: Vec<(Vec<Pt2>, Vec<Pt2>)> =
            views.iter().map(|v| v.correspondences(board)).collect();
        let all_pixels: Vec<Pt2> = views.iter().flat_map(|(_, px)| px.iter().copied()).collect();
        let (t, t_inv) = pixel_conditioning(&all_pixels)
            .ok_or_else(|| CharucoError::Solver("corners do not span the image".into()))?;

        let homographies = views
            .iter()
            .map(|(world, image)| {
                let image: Vec<Pt2> = image.iter().map(|p| t.transform_point(p)).collect();
                dlt_homography(world, &image)
            })
            .collect::<Result<Vec<_>, _>>()?;
        // The principal point sits at the conditioned origin, the pixel centroid.
        let conditioned = if homographies.len() < MIN_ZHANG_VIEWS {
            warn!(
                "{} covering view(s): assuming square pixels and a centered principal point",
                homographies.len()
            );
            estimate_focal_from_homographies(&homographies)?
        } else {
            estimate_intrinsics_from_homographies(&homographies)?
        };
        let k = t_inv.to_homogeneous() * conditioned.k_matrix();
        Ok(CameraCalibration::pinhole(CameraIntrinsics::from_k_matrix(&k)))
    }
}

/// Similarity moving the pixel centroid to the origin with mean radius √2.
fn pixel_conditioning(pixels: &[Pt2]) -> Option<(Affine2<Real>, Affine2<Real>)> {
    if pixels.is_empty() {
        return None;
    }
    let n = pixels.len() as Real;
    let mean = pixels.iter().fold(Vec2::zeros(), |acc, p| acc + p.coords) / n;
    let spread = pixels.iter().map(|p| (p.coords - mean).norm()).sum::<Real>() / n;
    if spread <= Real::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / spread;
    let t = Mat3::new(s, 0.0, -s * mean.x, 0.0, s, -s * mean.y, 0.0, 0.0, 1.0);
    let t_inv = Mat3::new(1.0 / s, 0.0, mean.x, 0.0, 1.0 / s, mean.y, 0.0, 0.0, 1.0);
    Some((
        Affine2::from_matrix_unchecked(t),
        Affine2::from_matrix_unchecked(t_inv),
    ))
}

/// Board pose from the homography of undistorted corners.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyPoseSolver;

impl BoardPoseSolver for HomographyPoseSolver {
    fn board_pose(
        &self,
        board: &CharucoBoard,
        camera: &CameraCalibration,
        detection: &BoardDetection,
    ) -> Result<Iso3, CharucoError> {
        let (world, image) = detection.correspondences(board);
        let image: Vec<Pt2> = image.iter().map(|p| camera.undistort_pixel(p)).collect();
        let h = dlt_homography(&world, &image)?;
        Ok(estimate_planar_pose_from_h(&camera.intrinsics.k_matrix(), &h)?)
    }
}

/// Reads precomputed detections from a JSON file next to each image.
///
/// `capture_12.5.png` is described by `capture_12.5.json`. A missing file
/// means nothing was detected.
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    pub extension: String,
}

impl Default for SidecarDetector {
    fn default() -> Self {
        Self {
            extension: "json".to_string(),
        }
    }
}

impl SidecarDetector {
    pub fn sidecar_path(&self, image: &Path) -> PathBuf {
        image.with_extension(&self.extension)
    }
}

impl BoardDetector for SidecarDetector {
    fn detect(&self, image: &Path) -> Result<BoardDetection, CharucoError> {
        let path = self.sidecar_path(image);
        if !path.exists() {
            debug!("no detection file for {}", image.display());
            return Ok(BoardDetection::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| CharucoError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CharucoError::Sidecar { path, source })
    }
}

/// Intrinsics together with how many images contributed.
#[derive(Debug, Clone)]
pub struct IntrinsicsReport {
    pub camera: CameraCalibration,
    pub used: usize,
    pub skipped: Vec<PathBuf>,
}

impl IntrinsicsReport {
    pub fn total(&self) -> usize {
        self.used + self.skipped.len()
    }
}

/// One [`Detection`] per input image, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseReport {
    pub detections: Vec<Detection>,
}

impl PoseReport {
    pub fn detected(&self) -> usize {
        self.detections.iter().filter(|d| d.is_detected()).count()
    }

    pub fn total(&self) -> usize {
        self.detections.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimatorState {
    Uncalibrated,
    IntrinsicsKnown(CameraCalibration),
    PosesEstimated(CameraCalibration),
}

/// Board-based intrinsics and pose estimation.
#[derive(Debug)]
pub struct CharucoEstimator<D, I = ZhangIntrinsicsSolver, P = HomographyPoseSolver> {
    board: CharucoBoard,
    detector: D,
    intrinsics_solver: I,
    pose_solver: P,
    cache_path: Option<PathBuf>,
    state: EstimatorState,
}

impl<D: BoardDetector> CharucoEstimator<D> {
    pub fn new(board: CharucoBoard, detector: D) -> Self {
        Self {
            board,
            detector,
            intrinsics_solver: ZhangIntrinsicsSolver,
            pose_solver: HomographyPoseSolver,
            cache_path: None,
            state: EstimatorState::Uncalibrated,
        }
    }
}

impl<D, I, P> CharucoEstimator<D, I, P>
where
    D: BoardDetector,
    I: IntrinsicsSolver,
    P: BoardPoseSolver,
{
    /// Replace the numerical solvers.
    pub fn with_solvers<I2, P2>(self, intrinsics_solver: I2, pose_solver: P2) -> CharucoEstimator<D, I2, P2> {
        CharucoEstimator {
            board: self.board,
            detector: self.detector,
            intrinsics_solver,
            pose_solver,
            cache_path: self.cache_path,
            state: self.state,
        }
    }

    /// Write calibrated intrinsics to `path`.
    pub fn with_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn board(&self) -> &CharucoBoard {
        &self.board
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn camera(&self) -> Option<&CameraCalibration> {
        match &self.state {
            EstimatorState::Uncalibrated => None,
            EstimatorState::IntrinsicsKnown(c) | EstimatorState::PosesEstimated(c) => Some(c),
        }
    }

    /// Use known intrinsics, e.g. from [`load_intrinsics_cache`].
    pub fn set_intrinsics(&mut self, camera: CameraCalibration) -> Result<(), CharucoError> {
        if matches!(self.state, EstimatorState::PosesEstimated(_)) {
            return Err(CharucoError::PosesAlreadyEstimated);
        }
        self.state = EstimatorState::IntrinsicsKnown(camera);
        Ok(())
    }

    /// Calibrate the camera from every image that shows enough of the board.
    pub fn calibrate_intrinsics<T: AsRef<Path>>(
        &mut self,
        images: &[T],
    ) -> Result<IntrinsicsReport, CharucoError> {
        if matches!(self.state, EstimatorState::PosesEstimated(_)) {
            return Err(CharucoError::PosesAlreadyEstimated);
        }

        let mut views = Vec::new();
        let mut skipped = Vec::new();
        for image in images {
            let image = image.as_ref();
            let detection = self.detector.detect(image)?;
            if self.board.covers(detection.corners.len()) {
                debug!(
                    "{}: {} corners used for intrinsics",
                    image.display(),
                    detection.corners.len()
                );
                views.push(detection);
            } else {
                warn!(
                    "{}: {} of {} corners, not used for intrinsics",
                    image.display(),
                    detection.corners.len(),
                    self.board.interior_corners()
                );
                skipped.push(image.to_path_buf());
            }
        }

        if views.is_empty() {
            return Err(CharucoError::NoBoardDetected {
                images: images.len(),
            });
        }

        let camera = self.intrinsics_solver.calibrate(&self.board, &views)?;
        info!(
            "intrinsics from {} of {} images: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            views.len(),
            images.len(),
            camera.intrinsics.fx,
            camera.intrinsics.fy,
            camera.intrinsics.cx,
            camera.intrinsics.cy
        );
        if let Some(path) = &self.cache_path {
            save_intrinsics_cache(path, &camera)?;
            info!("intrinsics cached in {}", path.display());
        }

        self.state = EstimatorState::IntrinsicsKnown(camera);
        Ok(IntrinsicsReport {
            camera,
            used: views.len(),
            skipped,
        })
    }

    /// Board pose for every image, with the current intrinsics.
    pub fn estimate_poses<T: AsRef<Path>>(&mut self, images: &[T]) -> Result<PoseReport, CharucoError> {
        let camera = *self.camera().ok_or(CharucoError::NotCalibrated)?;
        let report = self.estimate_poses_with(&camera, images)?;
        self.state = EstimatorState::PosesEstimated(camera);
        Ok(report)
    }

    /// Board pose for every image, with explicit intrinsics. Does not change state.
    pub fn estimate_poses_with<T: AsRef<Path>>(
        &self,
        camera: &CameraCalibration,
        images: &[T],
    ) -> Result<PoseReport, CharucoError> {
        let mut detections = Vec::with_capacity(images.len());
        for image in images {
            let image = image.as_ref();
            detections.push(self.detect_pose(camera, image)?);
        }

        let report = PoseReport { detections };
        if report.detected() < report.total() {
            warn!(
                "board pose found in {} of {} images",
                report.detected(),
                report.total()
            );
        } else {
            info!("board pose found in all {} images", report.total());
        }
        Ok(report)
    }

    fn detect_pose(&self, camera: &CameraCalibration, image: &Path) -> Result<Detection, CharucoError> {
        let detection = self.detector.detect(image)?;
        if detection.marker_ids.len() <= MIN_POSE_MARKERS {
            debug!(
                "{}: {} markers, need more than {}",
                image.display(),
                detection.marker_ids.len(),
                MIN_POSE_MARKERS
            );
            return Ok(Detection::NotDetected);
        }
        if detection.corners.is_empty() {
            debug!("{}: no corners interpolated", image.display());
            return Ok(Detection::NotDetected);
        }

        match self.pose_solver.board_pose(&self.board, camera, &detection) {
            Ok(iso) => Ok(Detection::Detected(Pose::from_isometry(
                &iso,
                RotationKind::Rodrigues,
            ))),
            Err(err) => {
                warn!("{}: board pose failed: {err}", image.display());
                Ok(Detection::NotDetected)
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CachedCalibration {
    camera_matrix: [Real; 9],
    dist_coeffs: [Real; 5],
}

/// Store intrinsics as a row-major camera matrix plus distortion coefficients.
pub fn save_intrinsics_cache(path: &Path, camera: &CameraCalibration) -> Result<(), CharucoError> {
    let k = camera.intrinsics.k_matrix();
    let mut camera_matrix = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            camera_matrix[3 * r + c] = k[(r, c)];
        }
    }
    let bytes = postcard::to_allocvec(&CachedCalibration {
        camera_matrix,
        dist_coeffs: camera.distortion.to_array(),
    })?;
    fs::write(path, bytes).map_err(|source| CharucoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_intrinsics_cache(path: &Path) -> Result<CameraCalibration, CharucoError> {
    let bytes = fs::read(path).map_err(|source| CharucoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cached: CachedCalibration = postcard::from_bytes(&bytes)?;
    let k = Mat3::from_row_slice(&cached.camera_matrix);
    Ok(CameraCalibration {
        intrinsics: CameraIntrinsics::from_k_matrix(&k),
        distortion: DistortionCoeffs::from_array(cached.dist_coeffs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{board_detection, SyntheticBoardDetector, SyntheticView};
    use handeye_core::{pose_error, Rot3};
    use nalgebra::Translation3;
    use tempfile::TempDir;

    fn camera() -> CameraCalibration {
        CameraCalibration::pinhole(CameraIntrinsics {
            fx: 820.0,
            fy: 810.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        })
    }

    fn view_pose(k: usize) -> Iso3 {
        let kf = k as Real;
        Iso3::from_parts(
            Translation3::new(-0.08 + 0.01 * kf, -0.03, 0.45 + 0.02 * kf),
            Rot3::from_euler_angles(0.35 * (kf * 1.3).sin(), 0.3 * (kf * 0.7).cos(), 0.1 * kf)
                .into(),
        )
    }

    fn detector(views: usize) -> SyntheticBoardDetector {
        let mut det = SyntheticBoardDetector::new(CharucoBoard::default(), camera());
        for k in 0..views {
            det.insert(format!("view_{k}.png"), SyntheticView::full(view_pose(k)));
        }
        det
    }

    fn names(n: usize) -> Vec<PathBuf> {
        (0..n).map(|k| PathBuf::from(format!("view_{k}.png"))).collect()
    }

    #[test]
    fn default_board_geometry() {
        let board = CharucoBoard::default();
        assert_eq!(board.interior_corners(), 8);
        assert_eq!(board.marker_count(), 7);
        let p = board.corner_position(5).unwrap();
        assert!((p - Pt3::new(0.055, 0.055, 0.0)).norm() < 1e-12);
        assert!(board.corner_position(8).is_none());
        assert!(!board.covers(4));
        assert!(board.covers(5));
    }

    #[test]
    fn intrinsics_and_poses_are_recovered() {
        let mut est = CharucoEstimator::new(CharucoBoard::default(), detector(5));
        assert_eq!(est.state(), &EstimatorState::Uncalibrated);

        let report = est.calibrate_intrinsics(&names(5)).unwrap();
        assert_eq!(report.used, 5);
        assert!(report.skipped.is_empty());
        let k = report.camera.intrinsics;
        assert!((k.fx - 820.0).abs() < 1e-2, "fx = {}", k.fx);
        assert!((k.cy - 360.0).abs() < 1e-2, "cy = {}", k.cy);
        assert!(matches!(est.state(), EstimatorState::IntrinsicsKnown(_)));

        let poses = est.estimate_poses(&names(5)).unwrap();
        assert_eq!(poses.detected(), 5);
        for (k, det) in poses.detections.iter().enumerate() {
            let (dt, ang) = pose_error(&det.pose().unwrap().to_isometry(), &view_pose(k));
            assert!(dt < 1e-5 && ang < 1e-5, "view {k}: dt={dt} ang={ang}");
        }
        assert!(matches!(est.state(), EstimatorState::PosesEstimated(_)));
    }

    #[test]
    fn one_or_two_views_still_calibrate() {
        for (views, tol) in [(1, 0.25), (2, 0.05)] {
            let mut est = CharucoEstimator::new(CharucoBoard::default(), detector(views));
            let report = est.calibrate_intrinsics(&names(views)).unwrap();
            assert_eq!(report.used, views);

            let k = report.camera.intrinsics;
            assert!(k.fx.is_finite() && (k.fx - 820.0).abs() < tol * 820.0, "{views}: {k:?}");
            assert!((k.fx - k.fy).abs() < 1e-9 && k.skew.abs() < 1e-9, "{views}: {k:?}");
            assert!((k.cx - 640.0).abs() < 20.0 && (k.cy - 360.0).abs() < 20.0, "{views}: {k:?}");
            assert!(matches!(est.state(), EstimatorState::IntrinsicsKnown(_)));

            let poses = est.estimate_poses(&names(views)).unwrap();
            assert_eq!(poses.detected(), views);
        }
    }

    #[test]
    fn sparse_views_are_skipped_for_intrinsics() {
        let mut det = detector(4);
        det.insert(
            "partial.png",
            SyntheticView {
                corners: Some(4),
                ..SyntheticView::full(view_pose(1))
            },
        );
        let mut images = names(4);
        images.push(PathBuf::from("partial.png"));

        let mut est = CharucoEstimator::new(CharucoBoard::default(), det);
        let report = est.calibrate_intrinsics(&images).unwrap();
        assert_eq!(report.used, 4);
        assert_eq!(report.skipped, vec![PathBuf::from("partial.png")]);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn no_covering_view_fails() {
        let mut det = SyntheticBoardDetector::new(CharucoBoard::default(), camera());
        det.insert(
            "a.png",
            SyntheticView {
                corners: Some(3),
                ..SyntheticView::full(view_pose(0))
            },
        );
        let mut est = CharucoEstimator::new(CharucoBoard::default(), det);
        let err = est.calibrate_intrinsics(&["a.png", "missing.png"]).unwrap_err();
        assert!(matches!(err, CharucoError::NoBoardDetected { images: 2 }));
    }

    #[test]
    fn too_few_markers_yield_not_detected() {
        let mut det = detector(3);
        det.insert(
            "occluded.png",
            SyntheticView {
                markers: Some(MIN_POSE_MARKERS),
                ..SyntheticView::full(view_pose(2))
            },
        );
        let mut est = CharucoEstimator::new(CharucoBoard::default(), det);
        est.set_intrinsics(camera()).unwrap();

        let report = est
            .estimate_poses(&["view_0.png", "occluded.png", "view_1.png"])
            .unwrap();
        assert_eq!(report.total(), 3);
        assert_eq!(report.detected(), 2);
        assert_eq!(report.detections[1], Detection::NotDetected);
    }

    #[test]
    fn poses_need_intrinsics() {
        let mut est = CharucoEstimator::new(CharucoBoard::default(), detector(1));
        assert!(matches!(
            est.estimate_poses(&names(1)),
            Err(CharucoError::NotCalibrated)
        ));
    }

    #[test]
    fn recalibration_after_poses_is_rejected() {
        let mut est = CharucoEstimator::new(CharucoBoard::default(), detector(3));
        est.set_intrinsics(camera()).unwrap();
        est.estimate_poses(&names(3)).unwrap();
        assert!(matches!(
            est.calibrate_intrinsics(&names(3)),
            Err(CharucoError::PosesAlreadyEstimated)
        ));
        // Further batches reuse the same intrinsics.
        assert_eq!(est.estimate_poses(&names(2)).unwrap().detected(), 2);
    }

    #[test]
    fn distorted_corners_are_undistorted_before_pose() {
        let mut cam = camera();
        cam.distortion = DistortionCoeffs::from_array([-0.1, 0.02, 0.0, 0.0, 0.0]);
        let board = CharucoBoard::default();
        let pose = view_pose(3);
        let det = board_detection(&board, &cam, &pose, board.marker_count(), None);

        let iso = HomographyPoseSolver.board_pose(&board, &cam, &det).unwrap();
        let (dt, ang) = pose_error(&iso, &pose);
        assert!(dt < 1e-6 && ang < 1e-6, "dt={dt} ang={ang}");
    }

    #[test]
    fn sidecar_detections_are_read_from_json() {
        let dir = TempDir::new().unwrap();
        let board = CharucoBoard::default();
        let image = dir.path().join("capture_3.0.png");
        fs::write(&image, b"img").unwrap();

        let detector = SidecarDetector::default();
        assert_eq!(detector.detect(&image).unwrap(), BoardDetection::default());

        let det = board_detection(&board, &camera(), &view_pose(0), 7, None);
        fs::write(
            detector.sidecar_path(&image),
            serde_json::to_string(&det).unwrap(),
        )
        .unwrap();
        assert_eq!(detector.detect(&image).unwrap(), det);

        fs::write(detector.sidecar_path(&image), "{ not json").unwrap();
        assert!(matches!(
            detector.detect(&image),
            Err(CharucoError::Sidecar { .. })
        ));
    }

    #[test]
    fn intrinsics_cache_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CALIBRATION_CACHE_FILE);
        let mut est =
            CharucoEstimator::new(CharucoBoard::default(), detector(4)).with_cache(&path);
        let report = est.calibrate_intrinsics(&names(4)).unwrap();

        let loaded = load_intrinsics_cache(&path).unwrap();
        let (a, b) = (loaded.intrinsics, report.camera.intrinsics);
        assert!((a.fx - b.fx).abs() < 1e-9 && (a.cx - b.cx).abs() < 1e-9);
        assert_eq!(loaded.distortion, report.camera.distortion);
    }
}
