//! Diagnostic logging setup.
//!
//! User-facing output goes through [`crate::report`]; `tracing` is for
//! developer diagnostics and always writes to stderr so it never mixes with
//! `TUI_DATA` records on stdout.

use std::env;
use std::str::FromStr;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crate-specific filter variable; `RUST_LOG` is honoured too
pub const LOG_ENV: &str = "THEME_BUILD_LOG";

static INIT: Once = Once::new();

/// Level for this crate's targets: explicit level, then `--debug`, then warn
pub fn resolve_level(log_level: Option<&str>, debug: bool) -> Level {
    match log_level.map(Level::from_str) {
        Some(Ok(level)) => level,
        Some(Err(_)) => {
            eprintln!(
                "Invalid log level '{}', defaulting to WARN. Valid levels: trace, debug, info, warn, error",
                log_level.unwrap_or_default()
            );
            Level::WARN
        }
        None if debug => Level::DEBUG,
        None => Level::WARN,
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(log_level: Option<&str>, debug: bool) {
    INIT.call_once(|| {
        let level = resolve_level(log_level, debug);

        let mut filter = match env::var(LOG_ENV) {
            Ok(spec) => EnvFilter::try_new(spec).unwrap_or_else(|_| EnvFilter::new("warn")),
            Err(_) => EnvFilter::from_default_env(),
        };
        if env::var(LOG_ENV).is_err() && env::var("RUST_LOG").is_err() {
            if let Ok(directive) = format!("theme_build={level}").parse() {
                filter = filter.add_directive(directive);
            }
            if let Ok(directive) = "notify=warn".parse() {
                filter = filter.add_directive(directive);
            }
        }

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(debug)
                    .with_writer(std::io::stderr),
            )
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_level() {
        assert_eq!(resolve_level(Some("trace"), false), Level::TRACE);
        assert_eq!(resolve_level(Some("INFO"), true), Level::INFO);
        assert_eq!(resolve_level(None, true), Level::DEBUG);
        assert_eq!(resolve_level(None, false), Level::WARN);
        assert_eq!(resolve_level(Some("loud"), false), Level::WARN);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(Some("debug"), false);
        init_logging(None, true);
    }
}
