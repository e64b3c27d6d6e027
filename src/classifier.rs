//! Source path → theme destination resolution.

use std::path::{Path, PathBuf};

use crate::theme::{ThemeDir, DIR_MAPPINGS, LIQUID_HINTS};

/// Which rule routed a file, kept for debug logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Matched a directory-mapping prefix
    Mapping(&'static str),
    /// Unmapped `.liquid` file routed by a substring hint
    LiquidHint(&'static str),
    /// Nothing matched; sent to `assets`
    Fallback,
}

/// Resolved destination of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub dir: ThemeDir,
    pub path: PathBuf,
    pub rule: MatchRule,
}

/// Path of `source` relative to `src_root`, with `/` separators.
///
/// Paths outside the root come back in their full normalized form.
pub fn relative_source_path(src_root: &Path, source: &Path) -> String {
    let relative = source.strip_prefix(src_root).unwrap_or(source);
    normalize(relative)
}

fn normalize(path: &Path) -> String {
    let joined = path
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    joined.replace('\\', "/")
}

/// True when `prefix` covers whole leading components of `relative`
#[inline]
fn has_component_prefix(relative: &str, prefix: &str) -> bool {
    match relative.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Classify a normalized relative path. Never fails: unmatched files go to assets.
pub fn classify(relative: &str) -> (ThemeDir, MatchRule) {
    for (prefix, dir) in DIR_MAPPINGS {
        if has_component_prefix(relative, prefix) {
            return (*dir, MatchRule::Mapping(prefix));
        }
    }

    if relative.ends_with(".liquid") {
        for (hint, dir) in LIQUID_HINTS {
            if relative.contains(hint) {
                return (*dir, MatchRule::LiquidHint(hint));
            }
        }
    }

    (ThemeDir::Assets, MatchRule::Fallback)
}

/// Resolve where `source` lands inside the build tree.
///
/// Shopify theme directories are flat, so only the file name is kept.
pub fn resolve_destination(src_root: &Path, build_root: &Path, source: &Path) -> Destination {
    let relative = relative_source_path(src_root, source);
    let (dir, rule) = classify(&relative);
    let file_name = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&relative));

    Destination {
        dir,
        path: build_root.join(dir.as_str()).join(file_name),
        rule,
    }
}
