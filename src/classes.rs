//! Tailwind class fingerprinting.
//!
//! A Tailwind rebuild is only worth running when the set of utility classes
//! used by the theme changes. Each markup or script file gets a fingerprint
//! (sorted, deduplicated, comma-joined utility tokens) and the cache compares
//! fingerprints across edits.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;

/// Extensions whose content may carry utility classes
const CLASS_BEARING_EXTENSIONS: &[&str] = &["liquid", "js", "jsx", "html"];

/// Extensions that always feed the Tailwind input
const STYLESHEET_EXTENSIONS: &[&str] = &["css", "scss"];

/// Path fragments marking a file as style-related
const STYLE_PATH_MARKERS: &[&str] = &["styles", "css", "tailwind"];

/// Token prefixes recognised as Tailwind utilities or variants
const UTILITY_PREFIXES: &[&str] = &[
    "bg-", "text-", "p-", "m-", "px-", "py-", "pt-", "pb-", "pr-", "pl-", "mx-", "my-", "mt-",
    "mb-", "mr-", "ml-", "w-", "h-", "min-w-", "min-h-", "max-w-", "max-h-", "flex", "grid",
    "border", "rounded", "shadow", "opacity-", "scale-", "rotate-", "translate-", "skew-",
    "transform", "transition", "duration-", "delay-", "ease-", "animate-", "cursor-", "select-",
    "resize-", "sr-", "ring-", "blur-", "brightness-", "contrast-", "drop-", "grayscale-",
    "hue-", "invert-", "saturate-", "sepia-", "backdrop-", "!", "hover:", "focus:", "active:",
    "disabled:", "visited:", "first:", "last:", "odd:", "even:", "dark:", "lg:", "md:", "sm:",
    "xl:", "2xl:",
];

fn class_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Literal pattern; compilation cannot fail
        #[allow(clippy::unwrap_used)]
        Regex::new(r#"(?i)\bclass(?:name)?\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    })
}

#[inline]
fn is_utility(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    UTILITY_PREFIXES.iter().any(|p| lower.starts_with(p))
}

#[inline]
fn extension_in(path: &Path, list: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| list.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Fingerprint of the utility classes in `content`; empty when there are none
pub fn extract_classes(content: &str) -> String {
    let mut classes: Vec<&str> = class_attr_regex()
        .captures_iter(content)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
        .flat_map(|m| m.as_str().split_whitespace())
        .filter(|token| is_utility(token))
        .collect();
    classes.sort_unstable();
    classes.dedup();
    classes.join(",")
}

/// `.liquid`, `.js`, `.jsx`, `.html`
pub fn might_contain_classes(path: &Path) -> bool {
    extension_in(path, CLASS_BEARING_EXTENSIONS)
}

/// `.css` or `.scss`
pub fn is_stylesheet(path: &Path) -> bool {
    extension_in(path, STYLESHEET_EXTENSIONS)
}

/// Relative path mentions `styles`, `css` or `tailwind`
pub fn is_style_path(relative: &str) -> bool {
    let lower = relative.to_ascii_lowercase();
    STYLE_PATH_MARKERS.iter().any(|m| lower.contains(m))
}

/// Stylesheet by extension or by location
pub fn is_style_related(path: &Path, relative: &str) -> bool {
    is_stylesheet(path) || is_style_path(relative)
}

/// Why a change asks for a Tailwind rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Stylesheet,
    ClassesChanged,
    ClassesRemoved,
    /// File could not be read; rebuild to be safe
    Unreadable,
}

impl RebuildReason {
    pub fn describe(&self) -> &'static str {
        match self {
            RebuildReason::Stylesheet => "style file change",
            RebuildReason::ClassesChanged => "Tailwind classes changed",
            RebuildReason::ClassesRemoved => "Tailwind classes were removed",
            RebuildReason::Unreadable => "file could not be checked",
        }
    }
}

/// Result of checking one changed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassCheck {
    Rebuild(RebuildReason),
    /// Same non-empty fingerprint as before
    Unchanged,
    /// No utility classes before or after
    NoClasses,
    /// File type never affects Tailwind output
    NotApplicable,
}

impl ClassCheck {
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, ClassCheck::Rebuild(_))
    }
}

/// Per-file fingerprints for the current watch session. Not persisted.
#[derive(Debug, Default)]
pub struct ClassCache {
    fingerprints: HashMap<PathBuf, String>,
}

impl ClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.fingerprints.get(path).map(String::as_str)
    }

    /// Compare new content against the cached fingerprint and store it
    pub fn check_content(&mut self, path: &Path, content: &str) -> ClassCheck {
        let current = extract_classes(content);
        let previous = self
            .fingerprints
            .insert(path.to_path_buf(), current.clone())
            .unwrap_or_default();

        if current == previous {
            if current.is_empty() {
                ClassCheck::NoClasses
            } else {
                ClassCheck::Unchanged
            }
        } else if !current.is_empty() {
            tracing::debug!(previous = %previous, current = %current, "class fingerprint changed");
            ClassCheck::Rebuild(RebuildReason::ClassesChanged)
        } else {
            ClassCheck::Rebuild(RebuildReason::ClassesRemoved)
        }
    }

    /// Decide whether an added or modified file needs a Tailwind rebuild
    pub fn check_file(&mut self, path: &Path, relative: &str) -> ClassCheck {
        if is_style_related(path, relative) {
            return ClassCheck::Rebuild(RebuildReason::Stylesheet);
        }
        if !might_contain_classes(path) {
            return ClassCheck::NotApplicable;
        }
        match fs::read_to_string(path) {
            Ok(content) => self.check_content(path, &content),
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not read file for class check: {e}");
                ClassCheck::Rebuild(RebuildReason::Unreadable)
            }
        }
    }

    /// Drop a deleted file. Only `.css`/`.scss` deletes ask for a rebuild;
    /// other assets under a style folder do not feed Tailwind.
    pub fn forget(&mut self, path: &Path) -> ClassCheck {
        self.fingerprints.remove(path);
        if is_stylesheet(path) {
            ClassCheck::Rebuild(RebuildReason::Stylesheet)
        } else {
            ClassCheck::NotApplicable
        }
    }

    /// Fingerprint every class-bearing file before watching starts
    pub fn prime<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let candidates: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| might_contain_classes(p))
            .collect();

        let entries: Vec<(PathBuf, String)> = candidates
            .into_par_iter()
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                let fingerprint = extract_classes(&content);
                Some((path, fingerprint))
            })
            .collect();

        self.fingerprints.extend(entries);
    }
}
