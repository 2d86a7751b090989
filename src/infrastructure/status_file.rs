//! Status file for external monitoring.
//!
//! The running supervisor periodically writes its system snapshot as JSON so
//! that `overseer status` and other tools can poll it without talking to the
//! process.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::status::SystemStatus;
use crate::error::Result;

/// Current status file format version.
const STATUS_VERSION: &str = "1";

/// Top-level status file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFile {
    /// Schema version for forward compatibility.
    pub version: String,
    /// When the supervisor process started.
    pub started_at: DateTime<Utc>,
    /// Process ID of the supervisor.
    pub pid: u32,
    /// When this file was last updated.
    pub updated_at: DateTime<Utc>,
    /// Latest system snapshot.
    pub system: SystemStatus,
}

impl StatusFile {
    /// Read a status file written by [`StatusWriter`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Writer for the status file.
pub struct StatusWriter {
    path: PathBuf,
    started_at: DateTime<Utc>,
    pid: u32,
}

impl StatusWriter {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            started_at: Utc::now(),
            pid: std::process::id(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `system` to the file atomically.
    ///
    /// Uses write-to-temp-then-rename pattern for atomicity.
    /// Creates parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or filesystem failure.
    pub fn write(&self, system: &SystemStatus) -> Result<()> {
        let file = StatusFile {
            version: STATUS_VERSION.to_string(),
            started_at: self.started_at,
            pid: self.pid,
            updated_at: Utc::now(),
            system: system.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let mut temp = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        temp.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        temp.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::OverallHealth;

    fn system() -> SystemStatus {
        SystemStatus {
            overall: OverallHealth::Healthy,
            taken_at: Utc::now(),
            services: Vec::new(),
        }
    }

    #[test]
    fn test_status_writer_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");
        let writer = StatusWriter::new(path.clone());

        writer.write(&system()).unwrap();

        let file = StatusFile::read(&path).unwrap();
        assert_eq!(file.version, "1");
        assert_eq!(file.pid, std::process::id());
        assert_eq!(file.system.overall, OverallHealth::Healthy);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_status_writer_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let writer = StatusWriter::new(path.clone());

        writer.write(&system()).unwrap();
        let mut critical = system();
        critical.overall = OverallHealth::Critical;
        writer.write(&critical).unwrap();

        let file = StatusFile::read(&path).unwrap();
        assert_eq!(file.system.overall, OverallHealth::Critical);
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StatusFile::read(dir.path().join("absent.json")).is_err());
    }
}
