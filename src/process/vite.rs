//! Vite bundling: one-shot builds and the long-lived `--watch` child.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::BuildError;
use crate::process::{run_to_completion, ChildRegistry, LineSink, ProcessSpec, RunningProcess};

pub const LABEL: &str = "VITE";

/// Config file names Vite picks up, in lookup order
const CONFIG_FILES: &[&str] = &["vite.config.js", "vite.config.mjs", "vite.config.ts"];

/// Vite config in `root`, if the project uses Vite at all
pub fn find_config(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

fn build_spec(root: &Path, watch: bool, verbose: bool) -> ProcessSpec {
    let spec = ProcessSpec::npx(LABEL).args(["vite", "build"]).cwd(root);
    if watch {
        spec.arg("--watch")
            .env("VITE_WATCH_MODE", "true")
            .env("VITE_VERBOSE_LOGGING", if verbose { "true" } else { "false" })
    } else {
        spec
    }
}

/// `npx vite build`, waiting for completion
pub fn run_build(
    root: &Path,
    registry: &ChildRegistry,
    sink: Arc<dyn LineSink>,
    shutdown: &AtomicBool,
) -> Result<(), BuildError> {
    run_to_completion(build_spec(root, false, false), registry, sink, shutdown)
}

/// Start `npx vite build --watch`; the child runs until shutdown
pub fn spawn_watch(
    root: &Path,
    verbose: bool,
    registry: &ChildRegistry,
    sink: Arc<dyn LineSink>,
) -> Result<RunningProcess, BuildError> {
    build_spec(root, true, verbose).spawn(registry, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_config() {
        let temp = TempDir::new().unwrap();
        assert_eq!(find_config(temp.path()), None);
        fs::write(temp.path().join("vite.config.mjs"), "export default {}").unwrap();
        assert_eq!(
            find_config(temp.path()),
            Some(temp.path().join("vite.config.mjs"))
        );
    }

    #[test]
    fn test_specs() {
        let build = build_spec(Path::new("/p"), false, false).display();
        assert!(build.ends_with("vite build"));
        let watch = build_spec(Path::new("/p"), true, true).display();
        assert!(watch.ends_with("vite build --watch"));
    }
}
