//! Session counters, per-build metrics and the on-disk build history.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BuildError;

/// History entries kept on disk; older ones are dropped
pub const HISTORY_LIMIT: usize = 50;

/// History file name inside the analytics data directory
pub const HISTORY_FILE: &str = "build-history.json";

/// Default analytics data directory, relative to the project root
pub const DATA_DIR: &str = "analytics-data";

const BUILD_TIME_WARNING: Duration = Duration::from_secs(30);
const BUILD_TIME_ERROR: Duration = Duration::from_secs(60);
const REGRESSION_THRESHOLD: f64 = 0.15;

/// Cache-line aligned atomic counter to prevent false sharing
#[repr(align(64))]
pub struct CacheAlignedAtomic(pub AtomicU64);

impl CacheAlignedAtomic {
    pub const fn new(val: u64) -> Self {
        Self(AtomicU64::new(val))
    }

    #[inline]
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters shared by copy workers, the watch loop and the Tailwind worker.
/// Observational only: nothing branches on these values.
pub struct BuildStats {
    pub files_copied: CacheAlignedAtomic,
    pub bytes_copied: CacheAlignedAtomic,
    pub errors: CacheAlignedAtomic,
    pub cache_hits: CacheAlignedAtomic,
    pub tailwind_runs: CacheAlignedAtomic,
}

impl BuildStats {
    pub fn new() -> Self {
        Self {
            files_copied: CacheAlignedAtomic::new(0),
            bytes_copied: CacheAlignedAtomic::new(0),
            errors: CacheAlignedAtomic::new(0),
            cache_hits: CacheAlignedAtomic::new(0),
            tailwind_runs: CacheAlignedAtomic::new(0),
        }
    }

    #[inline]
    pub fn record_copy(&self, bytes: u64) {
        self.files_copied.add(1);
        self.bytes_copied.add(bytes);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.add(1);
    }

    #[inline]
    pub fn record_cache_hit(&self) {
        self.cache_hits.add(1);
    }

    #[inline]
    pub fn record_tailwind_run(&self) {
        self.tailwind_runs.add(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_copied: self.files_copied.get(),
            bytes_copied: self.bytes_copied.get(),
            errors: self.errors.get(),
            cache_hits: self.cache_hits.get(),
            tailwind_runs: self.tailwind_runs.get(),
        }
    }
}

impl Default for BuildStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BuildStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub tailwind_runs: u64,
}

impl StatsSnapshot {
    /// Share of files served from the existing build, 0-100
    pub fn cache_efficiency(&self) -> u32 {
        let total = self.files_copied + self.cache_hits;
        if total == 0 {
            return 0;
        }
        ((self.cache_hits as f64 / total as f64) * 100.0).round() as u32
    }
}

/// One entry of `build-history.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetrics {
    pub build_id: String,
    pub timestamp: String,
    pub build_time: u64,
    pub files_processed: u64,
    #[serde(default)]
    pub bytes_copied: u64,
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub cache_misses: u64,
    #[serde(default)]
    pub cache_efficiency: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BuildMetrics {
    /// Finish a build: fold counters and elapsed time into a history record
    pub fn from_stats(stats: &StatsSnapshot, elapsed: Duration) -> Self {
        let mut metrics = Self {
            build_id: generate_build_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            build_time: elapsed.as_millis() as u64,
            files_processed: stats.files_copied + stats.cache_hits,
            bytes_copied: stats.bytes_copied,
            cache_hits: stats.cache_hits,
            cache_misses: stats.files_copied,
            cache_efficiency: stats.cache_efficiency(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        if stats.errors > 0 {
            metrics
                .errors
                .push(format!("{} file(s) failed to copy", stats.errors));
        }
        if elapsed > BUILD_TIME_WARNING {
            metrics.warnings.push(format!(
                "Build time exceeded threshold ({})",
                format_millis(metrics.build_time)
            ));
        }
        if elapsed > BUILD_TIME_ERROR {
            metrics.errors.push(format!(
                "Build time critically slow ({})",
                format_millis(metrics.build_time)
            ));
        }
        metrics
    }
}

fn generate_build_id() -> String {
    let seed = format!(
        "{}-{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        std::process::id()
    );
    let digest = Sha256::digest(seed.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Rolling build history persisted as a JSON array
#[derive(Debug)]
pub struct BuildHistory {
    path: PathBuf,
    entries: Vec<BuildMetrics>,
}

impl BuildHistory {
    /// Load history from `data_dir`. A missing or malformed file yields an
    /// empty history; malformed content is logged.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(HISTORY_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Vec<BuildMetrics>>(&text) {
                Ok(entries) => entries,
                Err(source) => {
                    let err = BuildError::Json {
                        path: path.clone(),
                        source,
                    };
                    tracing::warn!("Failed to load build history: {err}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self { path, entries }
    }

    pub fn entries(&self) -> &[BuildMetrics] {
        &self.entries
    }

    /// Append a record, dropping the oldest beyond [`HISTORY_LIMIT`]
    pub fn push(&mut self, metrics: BuildMetrics) {
        self.entries.push(metrics);
        if self.entries.len() > HISTORY_LIMIT {
            let excess = self.entries.len() - HISTORY_LIMIT;
            self.entries.drain(..excess);
        }
    }

    /// True when `metrics` is more than 15% slower than the previous build
    pub fn is_regression(&self, metrics: &BuildMetrics) -> bool {
        match self.entries.last() {
            Some(prev) if prev.build_time > 0 => {
                let delta = metrics.build_time as f64 - prev.build_time as f64;
                delta / prev.build_time as f64 > REGRESSION_THRESHOLD
            }
            _ => false,
        }
    }

    /// Mean build time across the stored history, in milliseconds
    pub fn average_build_time(&self) -> u64 {
        if self.entries.is_empty() {
            return 0;
        }
        let total: u64 = self.entries.iter().map(|m| m.build_time).sum();
        total / self.entries.len() as u64
    }

    pub fn save(&self) -> Result<(), BuildError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            BuildError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Human-readable duration: `850ms`, `12.3s`, `2m 5s`
pub fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

/// Human-readable size: `0 B`, `1.5 KB`, `2 MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metrics(build_time: u64) -> BuildMetrics {
        BuildMetrics {
            build_id: "abcd1234".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            build_time,
            files_processed: 10,
            bytes_copied: 100,
            cache_hits: 5,
            cache_misses: 5,
            cache_efficiency: 50,
            errors: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_cache_aligned_size() {
        assert_eq!(std::mem::align_of::<CacheAlignedAtomic>(), 64);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = BuildStats::new();
        stats.record_copy(10);
        stats.record_copy(5);
        stats.record_cache_hit();
        stats.record_error();
        let snap = stats.snapshot();
        assert_eq!(snap.files_copied, 2);
        assert_eq!(snap.bytes_copied, 15);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.cache_efficiency(), 33);
    }

    #[test]
    fn test_metrics_from_stats() {
        let snap = StatsSnapshot {
            files_copied: 3,
            cache_hits: 1,
            errors: 2,
            ..Default::default()
        };
        let m = BuildMetrics::from_stats(&snap, Duration::from_secs(45));
        assert_eq!(m.files_processed, 4);
        assert_eq!(m.build_time, 45_000);
        assert_eq!(m.build_id.len(), 8);
        assert_eq!(m.warnings.len(), 1);
        assert_eq!(m.errors.len(), 1);
    }

    #[test]
    fn test_history_capped() {
        let temp = TempDir::new().unwrap();
        let mut history = BuildHistory::load(temp.path());
        for i in 0..(HISTORY_LIMIT as u64 + 5) {
            history.push(metrics(i));
        }
        assert_eq!(history.entries().len(), HISTORY_LIMIT);
        assert_eq!(history.entries()[0].build_time, 5);

        history.save().unwrap();
        let reloaded = BuildHistory::load(temp.path());
        assert_eq!(reloaded.entries().len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_malformed_history_is_empty() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(HISTORY_FILE), "{not json").unwrap();
        let history = BuildHistory::load(temp.path());
        assert!(history.entries().is_empty());
    }

    #[test]
    fn test_missing_history_is_empty() {
        let temp = TempDir::new().unwrap();
        let history = BuildHistory::load(&temp.path().join("absent"));
        assert!(history.entries().is_empty());
        assert_eq!(history.average_build_time(), 0);
    }

    #[test]
    fn test_regression_detection() {
        let temp = TempDir::new().unwrap();
        let mut history = BuildHistory::load(temp.path());
        assert!(!history.is_regression(&metrics(1000)));
        history.push(metrics(1000));
        assert!(history.is_regression(&metrics(1200)));
        assert!(!history.is_regression(&metrics(1100)));
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(850), "850ms");
        assert_eq!(format_millis(12_300), "12.3s");
        assert_eq!(format_millis(125_000), "2m 5s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2 MB");
    }
}
