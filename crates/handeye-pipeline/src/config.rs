use crate::captures::{default_extensions, CaptureSelector, DiscardPolicy};
use crate::charuco::CharucoBoard;
use crate::imu::TimestampMatcher;
use handeye_core::{ImuUnits, Real, Seconds};
use handeye_linear::HandEyeOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration of an offline calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Geometry of the printed ChArUco board.
    pub board: CharucoBoard,
    pub captures: CaptureConfig,
    pub imu: ImuConfig,
    pub handeye: HandEyeConfig,
    /// Where calibrated intrinsics are cached. Relative paths are resolved
    /// against the output directory.
    pub intrinsics_cache: PathBuf,
    /// Load intrinsics from the cache instead of calibrating.
    pub reuse_intrinsics: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            board: CharucoBoard::default(),
            captures: CaptureConfig::default(),
            imu: ImuConfig::default(),
            handeye: HandEyeConfig::default(),
            intrinsics_cache: PathBuf::from(crate::charuco::CALIBRATION_CACHE_FILE),
            reuse_intrinsics: false,
        }
    }
}

/// Capture directory handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Largest accepted distance between a station timestamp and its image.
    pub max_tolerance_s: Seconds,
    /// Image file extensions, lower case.
    pub extensions: Vec<String>,
    /// What happens to images no station asked for.
    pub discard: DiscardPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_tolerance_s: 0.5,
            extensions: default_extensions(),
            discard: DiscardPolicy::Delete,
        }
    }
}

impl CaptureConfig {
    pub fn selector(&self) -> CaptureSelector {
        CaptureSelector::new(self.max_tolerance_s).with_extensions(self.extensions.clone())
    }
}

/// IMU log interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    pub units: ImuUnits,
    /// Warn when the nearest log entry is further than this from a marker.
    pub warn_offset_s: Option<Seconds>,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            units: ImuUnits::default(),
            warn_offset_s: Some(0.05),
        }
    }
}

impl ImuConfig {
    pub fn matcher(&self) -> TimestampMatcher {
        TimestampMatcher::new(self.warn_offset_s)
    }
}

/// Motion pair filtering of the hand-eye solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandEyeConfig {
    /// Minimum rotation (degrees) of a motion pair in both chains.
    pub min_angle_deg: Real,
    /// Reject motion pairs with nearly parallel rotation axes.
    pub reject_axis_parallel: bool,
}

impl Default for HandEyeConfig {
    fn default() -> Self {
        let opts = HandEyeOptions::default();
        Self {
            min_angle_deg: opts.min_angle_deg,
            reject_axis_parallel: opts.reject_axis_parallel,
        }
    }
}

impl HandEyeConfig {
    pub fn options(&self) -> HandEyeOptions {
        HandEyeOptions {
            min_angle_deg: self.min_angle_deg,
            reject_axis_parallel: self.reject_axis_parallel,
            ..HandEyeOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handeye_core::AngleUnit;

    #[test]
    fn config_json_roundtrip() {
        let mut config = PipelineConfig::default();
        config.captures.discard = DiscardPolicy::Keep;
        config.imu.units.angle = AngleUnit::Radians;
        config.handeye.min_angle_deg = 2.5;

        let json = serde_json::to_string_pretty(&config).unwrap();
        let de: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(de, config);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let json = r#"{ "board": { "squares_x": 7, "squares_y": 5, "square_length": 0.03, "marker_length": 0.022 },
                        "captures": { "max_tolerance_s": 0.2 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.board.squares_x, 7);
        assert_eq!(config.captures.max_tolerance_s, 0.2);
        assert_eq!(config.captures.discard, DiscardPolicy::Delete);
        assert_eq!(config.imu, ImuConfig::default());
        assert!(!config.reuse_intrinsics);
    }
}
