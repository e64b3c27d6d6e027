//! Pattern tables for parsing wrapped build and watch output.

use regex::Regex;

/// Lazily compiled regex accessor
macro_rules! pattern {
    ($(#[$meta:meta])* $name:ident, $re:expr) => {
        $(#[$meta])*
        #[allow(clippy::unwrap_used)] // literal pattern
        pub fn $name() -> &'static ::regex::Regex {
            static RE: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            RE.get_or_init(|| ::regex::Regex::new($re).unwrap())
        }
    };
}
pub(crate) use pattern;

pattern!(
    /// `42%`
    percent, r"(\d+)%"
);
pattern!(cache_hits, r"(?i)(\d+)\s*cache\s*hits?");
pattern!(optimizations, r"(\d+) optimizations");
pattern!(files_processed, r"(\d+) files processed");
pattern!(time_saved, r"(?i)(\d+)ms\s*saved");
pattern!(
    /// Any http(s) URL, stopping at whitespace and CLI box borders
    url, r"https?://[^\s│┃]+"
);
pattern!(
    /// File names with an extension the theme build cares about
    file_name,
    r"(?i)([A-Za-z0-9_./\\-]+\.(?:liquid|jsx?|s?css|json|html|md|txt|svg|png|jpe?g|webp|gif|woff2?))\b"
);
pattern!(
    /// Status and setup lines that mention files but are not changes
    status_line,
    r"(?i)watching.*for.*(?:development|changes)|watcher.*ready|optimization.*complete|cache.*hits|development.*server|syncing.*theme|setup.*complete|started.*successfully|\d+ms.*setup|ready.*preview|✓.*watching|✅.*watch"
);
pattern!(
    /// Lines reporting a change that reached the build
    change_line,
    r"(?i)file changed|copied|updated|modified|rebuilt|change.*detected|sync.*file|upload.*file|file.*sync|asset.*updated|build.*complete|styles.*complete|vite.*built|\w+\.(?:liquid|js|css|json|md|html|txt|svg|png|jpg|jpeg|webp) →"
);
pattern!(
    /// Watcher came up
    watch_active,
    r"(?i)watching|watcher.*active|monitoring.*files|👀"
);
pattern!(
    server_ready,
    r"(?i)development server ready|shopify development server|theme.*ready|server.*ready"
);
pattern!(
    /// Box drawing, separators and blank lines
    decoration, r"^[\s\-+*]*$|[╭╰│─]"
);

/// Remove trailing punctuation and box characters from a detected URL
pub fn clean_url(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', '!', '?', '│', '┃', ')'])
}

/// First capture of `re` in `text` parsed as a number
pub fn capture_number(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Line worth forwarding as a log record
pub fn is_significant(line: &str) -> bool {
    if line.trim().is_empty() || line.starts_with(crate::report::TUI_PREFIX) {
        return false;
    }
    if decoration().is_match(line) {
        return false;
    }
    const MARKERS: &[&str] = &[
        "✓", "❌", "⚡", "error", "warning", "success", "completed", "failed",
    ];
    let lower = line.to_lowercase();
    MARKERS.iter().any(|m| lower.contains(m))
}

/// Level name for a forwarded line
pub fn log_level(line: &str) -> &'static str {
    let lower = line.to_lowercase();
    if lower.contains("error") || line.contains('❌') || lower.contains("failed") {
        "error"
    } else if lower.contains("warning") || line.contains('⚠') {
        "warning"
    } else if lower.contains("success") || line.contains('✓') || line.contains('✨') {
        "success"
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_number() {
        assert_eq!(capture_number(percent(), "progress 42% done"), Some(42));
        assert_eq!(capture_number(cache_hits(), "12 cache hits"), Some(12));
        assert_eq!(capture_number(cache_hits(), "3 Cache Hit"), Some(3));
        assert_eq!(capture_number(time_saved(), "120ms saved"), Some(120));
        assert_eq!(capture_number(optimizations(), "none"), None);
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url("http://127.0.0.1:9293."), "http://127.0.0.1:9293");
        assert_eq!(clean_url("https://a.myshopify.com/?x=1│"), "https://a.myshopify.com/?x=1");
    }

    #[test]
    fn test_significant_lines() {
        assert!(is_significant("✓ built in 1s"));
        assert!(is_significant("Build failed"));
        assert!(!is_significant("   "));
        assert!(!is_significant("TUI_DATA:{}"));
        assert!(!is_significant("│ error inside a box │"));
        assert!(!is_significant("just chatter"));
    }

    #[test]
    fn test_log_level() {
        assert_eq!(log_level("Error: x"), "error");
        assert_eq!(log_level("warning: y"), "warning");
        assert_eq!(log_level("✨ done"), "success");
        assert_eq!(log_level("completed"), "info");
    }

    #[test]
    fn test_status_vs_change() {
        assert!(status_line().is_match("Watching for changes..."));
        assert!(change_line().is_match("hero.liquid → copied"));
        assert!(change_line().is_match("File changed: src/a.css"));
        assert!(!change_line().is_match("Starting up"));
    }
}
