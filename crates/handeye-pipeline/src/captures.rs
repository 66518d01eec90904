//! Selection of the camera captures that belong to each station.
//!
//! The camera streams timestamp-named images into one directory during the
//! whole run. For every station timestamp the nearest image is kept; the
//! remaining images can be discarded afterwards. Selection is split into a
//! pure [`CaptureSelector::plan`] and a destructive [`SelectionPlan::commit`],
//! so a failing selection leaves the directory untouched.

use handeye_core::Seconds;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no timestamped captures in {}", .0.display())]
    DirectoryEmpty(PathBuf),
    #[error(
        "no capture within {tolerance}s of t={wanted:.3} (nearest {nearest:.3}, {offset:.3}s away)"
    )]
    NoMatch {
        wanted: Seconds,
        nearest: Seconds,
        offset: Seconds,
        tolerance: Seconds,
    },
    #[error("{len} captures cannot be split into {repetitions} equal repetitions")]
    NotDivisible { len: usize, repetitions: usize },
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One timestamp-named image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureFile {
    pub timestamp: Seconds,
    pub path: PathBuf,
}

/// What to do with candidate images that were not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardPolicy {
    /// Remove unselected images from the directory.
    #[default]
    Delete,
    /// Leave the directory untouched.
    Keep,
}

/// Timestamp embedded in a capture file name.
///
/// The timestamp is the last `_` or `-` separated token of the file stem,
/// parsed as seconds: `capture_1697712345.25.png` gives `1697712345.25`.
pub fn parse_capture_timestamp(path: &Path) -> Option<Seconds> {
    let stem = path.file_stem()?.to_str()?;
    let token = stem.rsplit(|c: char| c == '_' || c == '-').next()?;
    let t: Seconds = token.parse().ok()?;
    t.is_finite().then_some(t)
}

/// Nearest-timestamp picker over a capture directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSelector {
    /// Largest accepted distance between a wanted timestamp and its capture.
    pub max_tolerance: Seconds,
    /// Lower-case image extensions considered captures.
    pub extensions: Vec<String>,
}

impl CaptureSelector {
    pub fn new(max_tolerance: Seconds) -> Self {
        Self {
            max_tolerance,
            extensions: default_extensions(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Decide which capture serves every wanted timestamp. Touches nothing.
    pub fn plan(&self, directory: &Path, wanted: &[Seconds]) -> Result<SelectionPlan, CaptureError> {
        let (candidates, untimed) = self.list(directory)?;
        if candidates.is_empty() {
            return Err(CaptureError::DirectoryEmpty(directory.to_path_buf()));
        }
        for path in &untimed {
            warn!(
                "capture {} has no timestamp in its name; it is ignored and kept",
                path.display()
            );
        }

        let mut selected = Vec::with_capacity(wanted.len());
        for &t in wanted {
            // `min_by` keeps the first of equal elements.
            let nearest = candidates
                .iter()
                .min_by(|a, b| (a.timestamp - t).abs().total_cmp(&(b.timestamp - t).abs()))
                .ok_or_else(|| CaptureError::DirectoryEmpty(directory.to_path_buf()))?;
            let offset = (nearest.timestamp - t).abs();
            if offset > self.max_tolerance {
                return Err(CaptureError::NoMatch {
                    wanted: t,
                    nearest: nearest.timestamp,
                    offset,
                    tolerance: self.max_tolerance,
                });
            }
            debug!(
                "t={t:.3} -> {} ({offset:.3}s)",
                nearest.path.display()
            );
            selected.push(nearest.clone());
        }

        let keep: HashSet<&Path> = selected.iter().map(|c| c.path.as_path()).collect();
        let discard = candidates
            .iter()
            .filter(|c| !keep.contains(c.path.as_path()))
            .map(|c| c.path.clone())
            .collect();

        Ok(SelectionPlan {
            directory: directory.to_path_buf(),
            selected,
            discard,
            untimed,
        })
    }

    /// Plan and commit in one step.
    pub fn select(
        &self,
        directory: &Path,
        wanted: &[Seconds],
        policy: DiscardPolicy,
    ) -> Result<Vec<CaptureFile>, CaptureError> {
        self.plan(directory, wanted)?.commit(policy)
    }

    /// Timestamped candidates sorted by `(timestamp, path)`, and image files
    /// whose names carry no timestamp.
    fn list(&self, directory: &Path) -> Result<(Vec<CaptureFile>, Vec<PathBuf>), CaptureError> {
        let io_err = |source: io::Error| CaptureError::Io {
            path: directory.to_path_buf(),
            source,
        };

        let mut candidates = Vec::new();
        let mut untimed = Vec::new();
        for entry in fs::read_dir(directory).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if !path.is_file() || !self.is_image(&path) {
                continue;
            }
            match parse_capture_timestamp(&path) {
                Some(timestamp) => candidates.push(CaptureFile { timestamp, path }),
                None => untimed.push(path),
            }
        }

        candidates.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.path.cmp(&b.path))
        });
        untimed.sort();
        Ok((candidates, untimed))
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }
}

pub fn default_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "bmp", "tif", "tiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Outcome of [`CaptureSelector::plan`].
#[derive(Debug, Clone)]
pub struct SelectionPlan {
    pub directory: PathBuf,
    /// One capture per wanted timestamp, in request order.
    pub selected: Vec<CaptureFile>,
    /// Timestamped captures nobody asked for.
    pub discard: Vec<PathBuf>,
    /// Image files without a parseable timestamp; never deleted.
    pub untimed: Vec<PathBuf>,
}

impl SelectionPlan {
    /// Apply the plan. With [`DiscardPolicy::Delete`] the directory is
    /// consumed: every unselected timestamped capture is removed.
    pub fn commit(self, policy: DiscardPolicy) -> Result<Vec<CaptureFile>, CaptureError> {
        match policy {
            DiscardPolicy::Keep => {
                info!(
                    "selected {} captures in {}, kept {} others",
                    self.selected.len(),
                    self.directory.display(),
                    self.discard.len()
                );
            }
            DiscardPolicy::Delete => {
                for path in &self.discard {
                    fs::remove_file(path).map_err(|source| CaptureError::Io {
                        path: path.clone(),
                        source,
                    })?;
                }
                info!(
                    "selected {} captures in {}, deleted {} others",
                    self.selected.len(),
                    self.directory.display(),
                    self.discard.len()
                );
            }
        }
        Ok(self.selected)
    }
}

/// [`CaptureSelector::select`] with the default image extensions.
pub fn select(
    directory: &Path,
    wanted: &[Seconds],
    max_tolerance: Seconds,
    policy: DiscardPolicy,
) -> Result<Vec<CaptureFile>, CaptureError> {
    CaptureSelector::new(max_tolerance).select(directory, wanted, policy)
}

/// Split the selected captures into `repetitions` equal contiguous chunks.
pub fn partition(
    files: &[CaptureFile],
    repetitions: usize,
) -> Result<Vec<Vec<CaptureFile>>, CaptureError> {
    if repetitions == 0 || files.len() % repetitions != 0 {
        return Err(CaptureError::NotDivisible {
            len: files.len(),
            repetitions,
        });
    }
    if files.is_empty() {
        return Ok(vec![Vec::new(); repetitions]);
    }
    Ok(files
        .chunks(files.len() / repetitions)
        .map(<[CaptureFile]>::to_vec)
        .collect())
}
