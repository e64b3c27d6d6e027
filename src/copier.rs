use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::analytics::BuildStats;
use crate::classifier::resolve_destination;
use crate::error::BuildError;
use crate::theme::ThemeDir;

/// Editor and backup file extensions never copied into the build
const TEMP_EXTENSIONS: &[&str] = &["swp", "swo", "tmp", "bak", "backup", "bck"];

/// Directories never descended into
const IGNORED_DIRECTORIES: &[&str] = &["node_modules"];

#[inline]
fn is_disk_full(e: &io::Error) -> bool {
    // ENOSPC on Unix
    e.raw_os_error() == Some(28)
}

/// Editor temp file (`foo~`, `.foo.swp`, `foo.tmp`, ...)
#[inline]
pub fn is_temp_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(OsStr::to_str) else {
        return false;
    };
    if name.ends_with('~') {
        return true;
    }
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| TEMP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// True for paths that never reach the build tree: dotfiles and dot-directories,
/// `node_modules`, editor temp files, anything under the build root.
pub fn is_ignored(path: &Path, build_root: &Path) -> bool {
    if path.starts_with(build_root) {
        return true;
    }

    for component in path.components() {
        if let std::path::Component::Normal(name) = component {
            if let Some(name_str) = name.to_str() {
                if name_str.starts_with('.') || IGNORED_DIRECTORIES.contains(&name_str) {
                    return true;
                }
            }
        }
    }

    is_temp_file(path)
}

/// Like [`is_ignored`] but only inspects components below `src_root`, so a
/// checkout living under a dot-directory still builds.
pub fn is_ignored_source(src_root: &Path, build_root: &Path, path: &Path) -> bool {
    if path.starts_with(build_root) {
        return true;
    }
    let relative = path.strip_prefix(src_root).unwrap_or(path);
    is_ignored(relative, build_root)
}

/// Copy a single file from src to dst, creating the parent directory if needed
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, BuildError> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            create_dir(parent)?;
        }
    }
    copy_into(src, dst)
}

fn create_dir(dir: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(dir).map_err(|e| {
        if is_disk_full(&e) {
            return BuildError::DiskFull {
                path: dir.to_path_buf(),
            };
        }
        BuildError::CreateDirFailed {
            path: dir.to_path_buf(),
            source: e,
        }
    })
}

fn copy_into(src: &Path, dst: &Path) -> Result<u64, BuildError> {
    fs::copy(src, dst).map_err(|e| {
        if is_disk_full(&e) {
            return BuildError::DiskFull {
                path: dst.to_path_buf(),
            };
        }
        if e.kind() == io::ErrorKind::NotFound && !src.exists() {
            return BuildError::SourceMissing {
                path: src.to_path_buf(),
            };
        }
        BuildError::CopyFailed {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source: e,
        }
    })
}

/// Remove a destination file. Returns whether a file was actually removed.
pub fn delete_file(dst: &Path) -> Result<bool, BuildError> {
    match fs::remove_file(dst) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BuildError::DeleteFailed {
            path: dst.to_path_buf(),
            source: e,
        }),
    }
}

/// Destination directories already known to exist in this session
#[derive(Debug, Default)]
pub struct DirCache {
    known: HashSet<PathBuf>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `dir` unless it was seen before
    pub fn ensure(&mut self, dir: &Path) -> Result<(), BuildError> {
        if self.known.contains(dir) {
            return Ok(());
        }
        if !dir.is_dir() {
            create_dir(dir)?;
        }
        self.known.insert(dir.to_path_buf());
        Ok(())
    }

    /// Copy through the cache: the parent is created at most once per session
    pub fn copy(&mut self, src: &Path, dst: &Path) -> Result<u64, BuildError> {
        if let Some(parent) = dst.parent() {
            self.ensure(parent)?;
        }
        copy_into(src, dst)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Create every theme directory under the build root
pub fn ensure_layout(build_root: &Path, dirs: &mut DirCache) -> Result<(), BuildError> {
    for dir in ThemeDir::ALL {
        dirs.ensure(&build_root.join(dir.as_str()))?;
    }
    Ok(())
}

/// All buildable files under `src_root`, sorted for deterministic output
pub fn collect_source_files(src_root: &Path, build_root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(src_root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_source(src_root, build_root, e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Destination already holds this exact file (same size, not older)
pub fn is_up_to_date(src: &Path, dst: &Path) -> bool {
    let (Ok(src_meta), Ok(dst_meta)) = (fs::metadata(src), fs::metadata(dst)) else {
        return false;
    };
    if src_meta.len() != dst_meta.len() {
        return false;
    }
    match (src_meta.modified(), dst_meta.modified()) {
        (Ok(src_time), Ok(dst_time)) => dst_time >= src_time,
        _ => false,
    }
}

/// Outcome of a full tree copy
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CopySummary {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Copy every source file into the build tree in parallel.
///
/// Per-file errors are logged and counted; only cancellation aborts.
/// `on_file` runs once per processed file (progress reporting).
pub fn copy_tree<F>(
    src_root: &Path,
    build_root: &Path,
    shutdown: &AtomicBool,
    stats: &BuildStats,
    force: bool,
    on_file: F,
) -> Result<CopySummary, BuildError>
where
    F: Fn() + Sync,
{
    if !src_root.is_dir() {
        return Err(BuildError::SourceRootNotFound {
            path: src_root.to_path_buf(),
        });
    }

    let files = collect_source_files(src_root, build_root);
    tracing::debug!(count = files.len(), "collected source files");
    copy_files(src_root, build_root, &files, shutdown, stats, force, on_file)
}

/// Copy an already collected file list; see [`copy_tree`]
pub fn copy_files<F>(
    src_root: &Path,
    build_root: &Path,
    files: &[PathBuf],
    shutdown: &AtomicBool,
    stats: &BuildStats,
    force: bool,
    on_file: F,
) -> Result<CopySummary, BuildError>
where
    F: Fn() + Sync,
{
    let mut dirs = DirCache::new();
    ensure_layout(build_root, &mut dirs)?;

    let outcomes: Vec<Option<FileOutcome>> = files
        .par_iter()
        .map(|src| {
            if shutdown.load(Ordering::Relaxed) {
                return None;
            }
            let outcome = copy_one(src_root, build_root, src, stats, force);
            on_file();
            Some(outcome)
        })
        .collect();

    if shutdown.load(Ordering::Relaxed) {
        return Err(BuildError::Cancelled);
    }

    let mut summary = CopySummary::default();
    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            FileOutcome::Copied => summary.copied += 1,
            FileOutcome::Skipped => summary.skipped += 1,
            FileOutcome::Failed => summary.failed += 1,
        }
    }
    Ok(summary)
}

enum FileOutcome {
    Copied,
    Skipped,
    Failed,
}

fn copy_one(
    src_root: &Path,
    build_root: &Path,
    src: &Path,
    stats: &BuildStats,
    force: bool,
) -> FileOutcome {
    let dest = resolve_destination(src_root, build_root, src);

    if !force && is_up_to_date(src, &dest.path) {
        stats.record_cache_hit();
        return FileOutcome::Skipped;
    }

    // Layout was created up front, so no per-file mkdir
    match copy_into(src, &dest.path) {
        Ok(bytes) => {
            stats.record_copy(bytes);
            tracing::trace!(
                src = %src.display(),
                dst = %dest.path.display(),
                rule = ?dest.rule,
                "copied"
            );
            FileOutcome::Copied
        }
        Err(e) => {
            stats.record_error();
            tracing::warn!("{e}");
            FileOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    // ==================== ignore rules ====================

    #[test]
    fn test_temp_files() {
        assert!(is_temp_file(Path::new("a/foo.liquid~")));
        assert!(is_temp_file(Path::new("a/.foo.liquid.swp")));
        assert!(is_temp_file(Path::new("a/foo.tmp")));
        assert!(is_temp_file(Path::new("a/foo.BAK")));
        assert!(!is_temp_file(Path::new("a/foo.liquid")));
    }

    #[test]
    fn test_is_ignored() {
        let build = Path::new("/p/build");
        assert!(is_ignored(Path::new("styles/.DS_Store"), build));
        assert!(is_ignored(Path::new("scripts/node_modules/x.js"), build));
        assert!(is_ignored(Path::new("/p/build/assets/a.css"), build));
        assert!(!is_ignored(Path::new("styles/a.css"), build));
    }

    #[test]
    fn test_is_ignored_source_checks_relative_part() {
        let build = Path::new("/p/build");
        assert!(!is_ignored_source(
            Path::new("/home/.cache/p/src"),
            build,
            Path::new("/home/.cache/p/src/styles/a.css"),
        ));
    }

    // ==================== single file ops ====================

    #[test]
    fn test_copy_file_creates_parent() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.css");
        fs::write(&src, "body{}").unwrap();
        let dst = temp.path().join("out/assets/a.css");

        let bytes = copy_file(&src, &dst).unwrap();
        assert_eq!(bytes, 6);
        assert_eq!(fs::read_to_string(&dst).unwrap(), "body{}");
    }

    #[test]
    fn test_copy_missing_source() {
        let temp = TempDir::new().unwrap();
        let err = copy_file(&temp.path().join("nope.css"), &temp.path().join("x.css")).unwrap_err();
        assert!(matches!(err, BuildError::SourceMissing { .. }));
    }

    #[test]
    fn test_delete_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.js");
        fs::write(&path, "x").unwrap();
        assert!(delete_file(&path).unwrap());
        assert!(!delete_file(&path).unwrap());
    }

    #[test]
    fn test_dir_cache_creates_once() {
        let temp = TempDir::new().unwrap();
        let mut dirs = DirCache::new();
        let dir = temp.path().join("assets");
        dirs.ensure(&dir).unwrap();
        dirs.ensure(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dirs.len(), 1);
    }

    // ==================== tree copy ====================

    #[test]
    fn test_copy_tree_routes_files() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let build = temp.path().join("build");
        write(&src.join("liquid/sections/hero.liquid"), "<div></div>");
        write(&src.join("styles/css/foo.css"), ".a{}");
        write(&src.join("scripts/.hidden.js"), "x");
        write(&src.join("scripts/node_modules/dep.js"), "x");

        let stats = BuildStats::new();
        let shutdown = AtomicBool::new(false);
        let summary = copy_tree(&src, &build, &shutdown, &stats, false, || {}).unwrap();

        assert_eq!(summary.copied, 2);
        assert_eq!(summary.failed, 0);
        assert!(build.join("sections/hero.liquid").exists());
        assert!(build.join("assets/foo.css").exists());
        assert!(!build.join("assets/dep.js").exists());
        for dir in ThemeDir::ALL {
            assert!(build.join(dir.as_str()).is_dir());
        }
        assert_eq!(stats.files_copied.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_copy_tree_skips_up_to_date() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let build = temp.path().join("build");
        write(&src.join("images/logo.svg"), "<svg/>");

        let stats = BuildStats::new();
        let shutdown = AtomicBool::new(false);
        copy_tree(&src, &build, &shutdown, &stats, false, || {}).unwrap();
        let second = copy_tree(&src, &build, &shutdown, &stats, false, || {}).unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.skipped, 1);

        let forced = copy_tree(&src, &build, &shutdown, &stats, true, || {}).unwrap();
        assert_eq!(forced.copied, 1);
    }

    #[test]
    fn test_copy_tree_missing_root() {
        let temp = TempDir::new().unwrap();
        let stats = BuildStats::new();
        let shutdown = AtomicBool::new(false);
        let err = copy_tree(
            &temp.path().join("missing"),
            &temp.path().join("build"),
            &shutdown,
            &stats,
            false,
            || {},
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::SourceRootNotFound { .. }));
    }

    #[test]
    fn test_copy_tree_cancelled() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("fonts/a.woff2"), "x");
        let stats = BuildStats::new();
        let shutdown = AtomicBool::new(true);
        let err = copy_tree(&src, &temp.path().join("build"), &shutdown, &stats, false, || {})
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled));
    }
}
