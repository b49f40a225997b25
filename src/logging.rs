//! Period-keyed log file rotation.
//!
//! A [`LogRotator`] owns the active log file for a scheduler instance and
//! swaps it when the rotation period (day or month) changes. The scheduler
//! calls [`LogRotator::ensure_current_period`] at the top of every loop
//! iteration, so a process that runs across midnight or a month boundary
//! rotates without restarting. [`RotatingWriter`] adapts the rotator into a
//! `tracing_subscriber` writer.
//!
//! Rotation never drops in-flight records: the new file is opened before
//! the previous handle is released, and if the new file cannot be opened
//! the rotator keeps writing to the previous handle (or stdout when no
//! handle is valid).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;
use tracing_subscriber::fmt::MakeWriter;

/// Granularity of log-file rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationPeriod {
    /// One file per calendar day.
    Daily,
    /// One file per calendar month.
    Monthly,
}

impl RotationPeriod {
    /// The period key for a date, e.g. "2024-03-15" or "2024-03".
    pub fn key_for(&self, date: NaiveDate) -> String {
        match self {
            RotationPeriod::Daily => date.format("%Y-%m-%d").to_string(),
            RotationPeriod::Monthly => date.format("%Y-%m").to_string(),
        }
    }
}

/// A completed rotation: which period key was replaced by which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// Key of the previous period, `None` when this opened the first file.
    pub previous: Option<String>,
    /// Key of the now-active period.
    pub current: String,
}

struct RotatorState {
    current_key: Option<String>,
    file: Option<File>,
}

/// Owns the active log file and swaps it on period changes.
pub struct LogRotator {
    directory: PathBuf,
    prefix: String,
    period: RotationPeriod,
    state: Mutex<RotatorState>,
}

impl LogRotator {
    /// Create a rotator writing `{prefix}_{period}.log` files in `directory`.
    ///
    /// No file is opened until the first call to `ensure_current_period`.
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        period: RotationPeriod,
    ) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            period,
            state: Mutex::new(RotatorState {
                current_key: None,
                file: None,
            }),
        }
    }

    /// The directory log files are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The file path for a given period key.
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}_{}.log", self.prefix, key))
    }

    /// The path of the currently active file, if one is open.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.locked()
            .current_key
            .as_deref()
            .map(|key| self.path_for_key(key))
    }

    /// Make sure the active file matches the period containing `date`.
    ///
    /// Opens the new period's file before releasing the previous handle and
    /// returns the rotation that took place, or `None` when the period is
    /// unchanged. On open failure the previous handle stays active and the
    /// failure is reported as a warning; the scheduler keeps running.
    pub fn ensure_current_period(&self, date: NaiveDate) -> Option<Rotation> {
        let expected = self.period.key_for(date);
        let mut state = self.locked();
        if state.current_key.as_deref() == Some(expected.as_str()) {
            return None;
        }

        match self.open(&expected) {
            Ok(file) => {
                let previous = state.current_key.replace(expected.clone());
                state.file = Some(file);
                Some(Rotation {
                    previous,
                    current: expected,
                })
            }
            Err(error) => {
                warn!(
                    path = %self.path_for_key(&expected).display(),
                    %error,
                    "failed to open log file for new period, keeping previous handle"
                );
                None
            }
        }
    }

    fn open(&self, key: &str) -> io::Result<File> {
        std::fs::create_dir_all(&self.directory)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for_key(key))
    }

    fn locked(&self) -> MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `tracing_subscriber` writer that follows the rotator's active file.
///
/// Records written while no file is open (startup before the first
/// `ensure_current_period`, or after a failed open with no previous handle)
/// go to stdout instead of being lost.
#[derive(Clone)]
pub struct RotatingWriter {
    rotator: Arc<LogRotator>,
}

impl RotatingWriter {
    /// Create a writer over a shared rotator.
    pub fn new(rotator: Arc<LogRotator>) -> Self {
        Self { rotator }
    }
}

impl io::Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.rotator.locked();
        match state.file.as_mut() {
            Some(file) => file.write(buf),
            None => io::stdout().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.rotator.locked();
        match state.file.as_mut() {
            Some(file) => file.flush(),
            None => io::stdout().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_keys() {
        assert_eq!(RotationPeriod::Daily.key_for(date(2024, 3, 5)), "2024-03-05");
        assert_eq!(RotationPeriod::Monthly.key_for(date(2024, 3, 5)), "2024-03");
    }

    #[test]
    fn test_first_ensure_opens_initial_file() {
        let dir = TempDir::new().unwrap();
        let rotator = LogRotator::new(dir.path(), "sched", RotationPeriod::Daily);
        assert!(rotator.current_path().is_none());

        let rotation = rotator.ensure_current_period(date(2024, 3, 5)).unwrap();
        assert_eq!(rotation.previous, None);
        assert_eq!(rotation.current, "2024-03-05");
        assert_eq!(
            rotator.current_path().unwrap(),
            dir.path().join("sched_2024-03-05.log")
        );
        assert!(dir.path().join("sched_2024-03-05.log").exists());
    }

    #[test]
    fn test_same_period_does_not_rotate() {
        let dir = TempDir::new().unwrap();
        let rotator = LogRotator::new(dir.path(), "sched", RotationPeriod::Monthly);

        assert!(rotator.ensure_current_period(date(2024, 3, 5)).is_some());
        assert!(rotator.ensure_current_period(date(2024, 3, 20)).is_none());
        assert!(rotator.ensure_current_period(date(2024, 3, 31)).is_none());
    }

    #[test]
    fn test_month_boundary_rotates_once_and_splits_records() {
        let dir = TempDir::new().unwrap();
        let rotator = Arc::new(LogRotator::new(dir.path(), "sched", RotationPeriod::Monthly));
        let mut writer = RotatingWriter::new(Arc::clone(&rotator));

        rotator.ensure_current_period(date(2024, 3, 29)).unwrap();
        writer.write_all(b"march record\n").unwrap();
        writer.flush().unwrap();

        let rotation = rotator.ensure_current_period(date(2024, 4, 1)).unwrap();
        assert_eq!(rotation.previous.as_deref(), Some("2024-03"));
        assert_eq!(rotation.current, "2024-04");
        writer.write_all(b"april record\n").unwrap();
        writer.flush().unwrap();

        // Later days in April do not rotate again.
        assert!(rotator.ensure_current_period(date(2024, 4, 2)).is_none());

        let march = std::fs::read_to_string(dir.path().join("sched_2024-03.log")).unwrap();
        let april = std::fs::read_to_string(dir.path().join("sched_2024-04.log")).unwrap();
        assert_eq!(march, "march record\n");
        assert_eq!(april, "april record\n");
    }

    #[test]
    fn test_reopens_existing_file_in_append_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sched_2024-03-05.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let rotator = Arc::new(LogRotator::new(dir.path(), "sched", RotationPeriod::Daily));
        rotator.ensure_current_period(date(2024, 3, 5)).unwrap();
        let mut writer = RotatingWriter::new(Arc::clone(&rotator));
        writer.write_all(b"this run\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "earlier run\nthis run\n");
    }

    #[test]
    fn test_open_failure_keeps_previous_handle() {
        let dir = TempDir::new().unwrap();
        let rotator = Arc::new(LogRotator::new(dir.path(), "sched", RotationPeriod::Daily));
        rotator.ensure_current_period(date(2024, 3, 5)).unwrap();

        // Block the next period's path with a directory so the open fails.
        std::fs::create_dir(dir.path().join("sched_2024-03-06.log")).unwrap();
        assert!(rotator.ensure_current_period(date(2024, 3, 6)).is_none());

        // Still pointing at the previous period's file, and still writable.
        assert_eq!(
            rotator.current_path().unwrap(),
            dir.path().join("sched_2024-03-05.log")
        );
        let mut writer = RotatingWriter::new(Arc::clone(&rotator));
        writer.write_all(b"still here\n").unwrap();
        writer.flush().unwrap();
        let contents =
            std::fs::read_to_string(dir.path().join("sched_2024-03-05.log")).unwrap();
        assert!(contents.contains("still here"));
    }

    #[test]
    fn test_writer_falls_back_to_stdout_without_a_file() {
        let dir = TempDir::new().unwrap();
        let rotator = Arc::new(LogRotator::new(dir.path(), "sched", RotationPeriod::Daily));
        let mut writer = RotatingWriter::new(rotator);

        // No period ensured yet: the write must not error or panic.
        writer.write_all(b"to stdout\n").unwrap();
        writer.flush().unwrap();
    }
}
