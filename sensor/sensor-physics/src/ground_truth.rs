//! Ground-truth pose trace.
//!
//! Each [`PhysicalModel::transform`](crate::PhysicalModel::transform) read
//! appends one line while recording is on:
//!
//! ```text
//! <timestamp_ns> <tx> <ty> <tz> <rx> <ry> <rz>
//! ```
//!
//! Rotation is XYZ Euler angles in degrees.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use tracing::{debug, error, warn};

use crate::error::{PhysicsError, Result};

/// Open trace file.
#[derive(Debug)]
pub struct GroundTruthRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl GroundTruthRecorder {
    /// Creates (or truncates) the trace file.
    ///
    /// A relative `path` is resolved against `$HOME`, or the working
    /// directory if `$HOME` is unset.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::GroundTruthOpen`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = resolve(path.as_ref());
        match File::create(&path) {
            Ok(file) => {
                debug!(path = %path.display(), "recording ground truth");
                Ok(Self {
                    path,
                    writer: BufWriter::new(file),
                })
            }
            Err(source) => {
                error!(path = %path.display(), %source, "cannot open ground truth file");
                Err(PhysicsError::GroundTruthOpen { path, source })
            }
        }
    }

    /// Resolved path of the trace file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one pose line. Failures are logged, not returned.
    pub fn write_pose(
        &mut self,
        timestamp_ns: i64,
        position: &Vector3<f32>,
        rotation_degrees: &Vector3<f32>,
    ) {
        let written = writeln!(
            self.writer,
            "{timestamp_ns} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            position.x,
            position.y,
            position.z,
            rotation_degrees.x,
            rotation_degrees.y,
            rotation_degrees.z,
        )
        .and_then(|()| self.writer.flush());
        if let Err(err) = written {
            warn!(path = %self.path.display(), %err, "failed to append ground truth");
        }
    }
}

impl Drop for GroundTruthRecorder {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!(path = %self.path.display(), %err, "failed to flush ground truth");
        }
        debug!(path = %self.path.display(), "stopped recording ground truth");
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .map_or_else(|| path.to_path_buf(), |base| base.join(path))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn writes_one_line_per_pose() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        {
            let mut recorder = GroundTruthRecorder::create(&path).unwrap();
            recorder.write_pose(
                5,
                &Vector3::new(1.0, 2.0, 3.0),
                &Vector3::new(0.0, 90.0, -45.5),
            );
            recorder.write_pose(6, &Vector3::zeros(), &Vector3::zeros());
        }
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "5 1.000000 2.000000 3.000000 0.000000 90.000000 -45.500000",
                "6 0.000000 0.000000 0.000000 0.000000 0.000000 0.000000",
            ]
        );
    }

    #[test]
    fn create_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        fs::write(&path, "stale\n").unwrap();
        drop(GroundTruthRecorder::create(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn open_failure_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("trace.txt");
        let err = GroundTruthRecorder::create(&path).unwrap_err();
        assert!(matches!(err, PhysicsError::GroundTruthOpen { .. }));
        assert!(err.is_io());
    }

    #[test]
    fn absolute_paths_are_kept() {
        let dir = tempdir().unwrap();
        assert_eq!(resolve(dir.path()), dir.path());
    }
}
