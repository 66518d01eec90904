//! Pinhole camera intrinsics and distortion coefficients.

use crate::{Mat3, Pt2, Pt3, Real, Vec2};
use serde::{Deserialize, Serialize};

/// Standard pinhole intrinsics with optional skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in pixels along X.
    pub fx: Real,
    /// Focal length in pixels along Y.
    pub fy: Real,
    /// Principal point X coordinate in pixels.
    pub cx: Real,
    /// Principal point Y coordinate in pixels.
    pub cy: Real,
    /// Skew term (typically 0).
    pub skew: Real,
}

impl CameraIntrinsics {
    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }

    pub fn from_k_matrix(k: &Mat3) -> Self {
        let s = k[(2, 2)];
        Self {
            fx: k[(0, 0)] / s,
            fy: k[(1, 1)] / s,
            cx: k[(0, 2)] / s,
            cy: k[(1, 2)] / s,
            skew: k[(0, 1)] / s,
        }
    }

    /// Project a camera-frame point; `None` behind the camera.
    pub fn project(&self, p: &Pt3) -> Option<Pt2> {
        if p.z <= Real::EPSILON {
            return None;
        }
        let x = p.x / p.z;
        let y = p.y / p.z;
        Some(Pt2::new(
            self.fx * x + self.skew * y + self.cx,
            self.fy * y + self.cy,
        ))
    }
}

/// Brown-Conrady coefficients in OpenCV order `(k1, k2, p1, p2, k3)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistortionCoeffs {
    pub k1: Real,
    pub k2: Real,
    pub p1: Real,
    pub p2: Real,
    pub k3: Real,
}

impl DistortionCoeffs {
    pub fn to_array(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(v: [Real; 5]) -> Self {
        Self {
            k1: v[0],
            k2: v[1],
            p1: v[2],
            p2: v[3],
            k3: v[4],
        }
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|c| *c == 0.0)
    }

    /// Apply distortion to a normalized image point.
    pub fn distort(&self, n: &Vec2) -> Vec2 {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Vec2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inverse of [`DistortionCoeffs::distort`].
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        if self.is_zero() {
            return *n_dist;
        }
        let mut n = *n_dist;
        for _ in 0..UNDISTORT_ITERS {
            n -= self.distort(&n) - n_dist;
        }
        n
    }
}

const UNDISTORT_ITERS: usize = 20;

/// Intrinsic calibration of a camera: `K` plus distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub intrinsics: CameraIntrinsics,
    pub distortion: DistortionCoeffs,
}

impl CameraCalibration {
    pub fn pinhole(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: DistortionCoeffs::default(),
        }
    }

    /// Project a camera-frame point to a distorted pixel.
    pub fn project(&self, p: &Pt3) -> Option<Pt2> {
        if p.z <= Real::EPSILON {
            return None;
        }
        let n = self.distortion.distort(&Vec2::new(p.x / p.z, p.y / p.z));
        self.intrinsics.project(&Pt3::new(n.x, n.y, 1.0))
    }

    /// Map a distorted pixel to the pixel an ideal pinhole camera would see.
    pub fn undistort_pixel(&self, px: &Pt2) -> Pt2 {
        if self.distortion.is_zero() {
            return *px;
        }
        let k = &self.intrinsics;
        let y = (px.y - k.cy) / k.fy;
        let x = (px.x - k.cx - k.skew * y) / k.fx;
        let n = self.distortion.undistort(&Vec2::new(x, y));
        Pt2::new(k.fx * n.x + k.skew * n.y + k.cx, k.fy * n.y + k.cy)
    }
}
