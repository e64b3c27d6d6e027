//! Tailwind readiness flag.
//!
//! A small file whose presence means "the last Tailwind run finished". It is
//! cleared before each run and written after the minified pass succeeds; a
//! style batch waits for it (bounded) before copying into the build.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Environment variable overriding the flag location
pub const READY_FLAG_ENV: &str = "TAILWIND_READY_FLAG";

/// Default bounded wait before a style batch is applied anyway
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Poll interval while waiting
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFlag {
    path: PathBuf,
}

impl ReadyFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Unique flag in the system temp directory for this process
    pub fn in_temp_dir() -> Self {
        let name = format!(
            ".theme-tailwind-ready-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        );
        Self::new(std::env::temp_dir().join(name))
    }

    /// `override_path` (from `TAILWIND_READY_FLAG`) or a fresh temp path
    pub fn from_env_or_temp(override_path: Option<PathBuf>) -> Self {
        match override_path {
            Some(path) => Self::new(path),
            None => Self::in_temp_dir(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark a Tailwind run as in progress
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Mark the run complete; the file holds an RFC 3339 timestamp
    pub fn signal(&self) -> io::Result<()> {
        fs::write(&self.path, chrono::Utc::now().to_rfc3339())
    }

    pub fn is_ready(&self) -> bool {
        self.path.exists()
    }

    /// Poll until the flag appears, `timeout` passes or shutdown is requested.
    /// Returns whether the flag was seen.
    pub fn wait(&self, timeout: Duration, poll: Duration, shutdown: &AtomicBool) -> bool {
        let start = Instant::now();
        loop {
            if self.is_ready() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout || shutdown.load(Ordering::Relaxed) {
                return false;
            }
            thread::sleep(poll.min(timeout - elapsed));
        }
    }

    /// Remove on shutdown. Errors are ignored.
    pub fn remove(&self) {
        if let Err(e) = self.clear() {
            tracing::debug!(path = %self.path.display(), "could not remove ready flag: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_signal_and_clear() {
        let temp = TempDir::new().unwrap();
        let flag = ReadyFlag::new(temp.path().join(".ready"));
        assert!(!flag.is_ready());
        flag.clear().unwrap();

        flag.signal().unwrap();
        assert!(flag.is_ready());
        let content = fs::read_to_string(flag.path()).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&content).is_ok());

        flag.clear().unwrap();
        assert!(!flag.is_ready());
    }

    #[test]
    fn test_wait_returns_immediately_when_ready() {
        let temp = TempDir::new().unwrap();
        let flag = ReadyFlag::new(temp.path().join(".ready"));
        flag.signal().unwrap();
        let shutdown = AtomicBool::new(false);
        assert!(flag.wait(Duration::from_secs(5), POLL_INTERVAL, &shutdown));
    }

    #[test]
    fn test_wait_times_out() {
        let temp = TempDir::new().unwrap();
        let flag = ReadyFlag::new(temp.path().join(".ready"));
        let shutdown = AtomicBool::new(false);
        let start = Instant::now();
        assert!(!flag.wait(Duration::from_millis(50), Duration::from_millis(10), &shutdown));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_sees_flag_from_other_thread() {
        let temp = TempDir::new().unwrap();
        let flag = ReadyFlag::new(temp.path().join(".ready"));
        let writer = flag.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            writer.signal().unwrap();
        });
        let shutdown = AtomicBool::new(false);
        assert!(flag.wait(Duration::from_secs(5), Duration::from_millis(10), &shutdown));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let flag = ReadyFlag::new(temp.path().join(".ready"));
        let shutdown = AtomicBool::new(true);
        assert!(!flag.wait(Duration::from_secs(5), POLL_INTERVAL, &shutdown));
    }

    #[test]
    fn test_temp_flags_are_distinct_per_name() {
        let flag = ReadyFlag::in_temp_dir();
        let name = flag.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".theme-tailwind-ready-"));
        assert!(name.contains(&std::process::id().to_string()));
    }
}
