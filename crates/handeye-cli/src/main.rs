use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use handeye_pipeline::{
    run_calibration, CalibrationReport, DiscardPolicy, PipelineConfig, SessionRecord,
    SidecarDetector,
};
use log::info;

/// Offline robot/camera/IMU hand-eye calibration.
#[derive(Debug, Parser)]
#[command(author, version, about = "Hand-eye calibration of camera and IMU on a robot gripper")]
struct Args {
    /// Path to the JSON session record written during collection.
    #[arg(long)]
    session: PathBuf,

    /// Directory with the timestamp-named camera captures.
    #[arg(long)]
    captures: PathBuf,

    /// Directory receiving pose tables, calibration matrices and the report.
    #[arg(long, default_value = "calibration")]
    output: PathBuf,

    /// Optional path to a JSON PipelineConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Leave unselected captures in place.
    #[arg(long)]
    keep_captures: bool,

    /// Load intrinsics from the cache instead of calibrating.
    #[arg(long)]
    reuse_intrinsics: bool,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => load_json_file::<PipelineConfig>(path)?,
        None => PipelineConfig::default(),
    };
    if args.keep_captures {
        config.captures.discard = DiscardPolicy::Keep;
    }
    if args.reuse_intrinsics {
        config.reuse_intrinsics = true;
    }
    Ok(config)
}

fn run_from_files(args: &Args) -> Result<CalibrationReport> {
    let session = SessionRecord::load(&args.session)
        .with_context(|| format!("failed to load session {}", args.session.display()))?;
    let config = load_config(args)?;
    info!(
        "session: {} repetitions of {} stations, {} imu samples",
        session.repetitions,
        session.stations,
        session.imu_log.len()
    );

    let outcome = run_calibration(
        &session,
        &args.captures,
        &args.output,
        &config,
        SidecarDetector::default(),
    )
    .context("calibration failed")?;
    Ok(outcome.report)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let report = run_from_files(&args)?;
    println!("{}", serde_json::to_string_pretty(&report.extrinsics)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use handeye_pipeline::synthetic::SyntheticScene;
    use tempfile::TempDir;

    fn args(dir: &Path) -> Args {
        Args {
            session: dir.join("session.json"),
            captures: dir.join("captures"),
            output: dir.join("out"),
            config: None,
            keep_captures: false,
            reuse_intrinsics: false,
            verbose: false,
        }
    }

    #[test]
    fn calibrates_from_session_and_capture_files() {
        let dir = TempDir::new().unwrap();
        let scene = SyntheticScene {
            stations: 6,
            ..SyntheticScene::default()
        };
        scene.session().save(&dir.path().join("session.json")).unwrap();
        scene
            .write_captures(&dir.path().join("captures"), &SidecarDetector::default())
            .unwrap();

        let report = run_from_files(&args(dir.path())).unwrap();
        assert_eq!(report.stations_used.len(), 6);
        let t = report.extrinsics.camera_to_tcp.translation;
        let want = scene.gripper_se3_camera.translation.vector;
        assert!((t - want).norm() < 1e-3, "t={t:?}");
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, r#"{ "captures": { "max_tolerance_s": 0.2 } }"#).unwrap();

        let mut a = args(dir.path());
        a.config = Some(config_path);
        a.keep_captures = true;
        a.reuse_intrinsics = true;
        let config = load_config(&a).unwrap();
        assert_eq!(config.captures.max_tolerance_s, 0.2);
        assert_eq!(config.captures.discard, DiscardPolicy::Keep);
        assert!(config.reuse_intrinsics);
    }

    #[test]
    fn missing_session_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let err = run_from_files(&args(dir.path())).unwrap_err();
        assert!(format!("{err:#}").contains("session.json"), "{err:#}");
    }
}
