//! Process id file management.
//!
//! Some deployments supervise the scheduler by pid file. The file is
//! written at startup and removed when the guard drops on clean shutdown;
//! a crashed process leaves it behind, which is how supervisors expect
//! stale pid files to behave.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// RAII guard for a pid file.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, format!("{}\n", std::process::id()))?;
        debug!(path = %path.display(), pid = std::process::id(), "pid file written");
        Ok(Self { path })
    }

    /// Path of the pid file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_current_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduler.pid");

        let pidfile = PidFile::create(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        assert_eq!(pidfile.path(), path);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scheduler.pid");

        {
            let _pidfile = PidFile::create(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_create_makes_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("scheduler.pid");

        let _pidfile = PidFile::create(&path).unwrap();
        assert!(path.exists());
    }
}
