//! Shopify CLI `theme dev` with store fallback.
//!
//! Stores are tried top to bottom. A store counts as connected when its
//! `theme dev` process is still running at the end of the alive window; an
//! early exit (any code) or a spawn failure moves on to the next store after
//! a fixed delay.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BuildError, StoreAttempt};
use crate::process::{
    sleep_unless_shutdown, ChildRegistry, LineLevel, LineSink, OutputLine, ProcessSpec,
    RunningProcess, Stream,
};
use crate::theme::StoreDomain;

pub const LABEL: &str = "SHOPIFY";

/// Local preview host and port passed to `theme dev`
pub const HOST: &str = "127.0.0.1";
pub const PORT: u16 = 9293;

/// Default time a `theme dev` child must survive to count as connected
pub const DEFAULT_ALIVE_WINDOW: Duration = Duration::from_secs(5);

/// Printed when every store failed
pub const TROUBLESHOOTING: &[&str] = &[
    "Check your internet connection",
    "Run 'shopify auth logout' and 'shopify auth' to re-authenticate",
    "Check if your Shopify store is accessible in the browser",
    "Try updating Node.js and the Shopify CLI",
    "Try again in a few minutes",
];

/// Starts a preview session against one store
pub trait StoreLauncher {
    type Session;

    fn launch(&mut self, store: &StoreDomain) -> Result<Self::Session, BuildError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Pause between a failed store and the next one
    pub delay: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

/// A store that accepted the session, plus the failures before it
#[derive(Debug)]
pub struct Connected<S> {
    pub store: StoreDomain,
    pub session: S,
    pub failed: Vec<StoreAttempt>,
}

fn say(sink: &dyn LineSink, level: LineLevel, text: String) {
    sink.line(OutputLine {
        label: Arc::from(LABEL),
        text,
        level,
        stream: Stream::Stdout,
    });
}

/// Try each store in order until one connects.
///
/// Exhaustion yields `StoresExhausted` listing every attempt. Shutdown during
/// the delay yields `Cancelled`.
pub fn connect_with_fallback<L: StoreLauncher>(
    launcher: &mut L,
    stores: &[StoreDomain],
    policy: FallbackPolicy,
    sink: &dyn LineSink,
    shutdown: &AtomicBool,
) -> Result<Connected<L::Session>, BuildError> {
    let mut failed: Vec<StoreAttempt> = Vec::with_capacity(stores.len());

    for (idx, store) in stores.iter().enumerate() {
        say(
            sink,
            LineLevel::Info,
            format!(
                "Attempting to connect to store: {store} ({}/{})",
                idx + 1,
                stores.len()
            ),
        );

        match launcher.launch(store) {
            Ok(session) => {
                say(sink, LineLevel::Success, format!("Connected to store {store}"));
                return Ok(Connected {
                    store: store.clone(),
                    session,
                    failed,
                });
            }
            Err(BuildError::Cancelled) => return Err(BuildError::Cancelled),
            Err(e) => {
                say(
                    sink,
                    LineLevel::Error,
                    format!("Failed to connect to {store}: {e}"),
                );
                failed.push(StoreAttempt {
                    store: store.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        if idx + 1 < stores.len() {
            say(
                sink,
                LineLevel::Warning,
                "Trying next store in fallback sequence...".to_string(),
            );
            if !sleep_unless_shutdown(policy.delay, shutdown) {
                return Err(BuildError::Cancelled);
            }
        }
    }

    Err(BuildError::StoresExhausted { attempts: failed })
}

/// Launches the real Shopify CLI
pub struct ShopifyCli {
    pub build_root: PathBuf,
    pub alive_window: Duration,
    pub registry: Arc<ChildRegistry>,
    pub sink: Arc<dyn LineSink>,
    pub shutdown: Arc<AtomicBool>,
}

impl ShopifyCli {
    fn program() -> &'static str {
        if cfg!(windows) {
            "shopify.cmd"
        } else {
            "shopify"
        }
    }

    pub fn spec(&self, store: &StoreDomain) -> ProcessSpec {
        ProcessSpec::new(LABEL, Self::program())
            .args(["theme", "dev", "--path"])
            .arg(&self.build_root)
            .arg("-s")
            .arg(store.as_str())
            .arg("--live-reload=hot-reload")
            .arg(format!("--host={HOST}"))
            .arg(format!("--port={PORT}"))
            .arg("--nodelete")
            .env("NODE_NO_WARNINGS", "1")
            .env("SHOPIFY_CLI_STACKTRACE", "1")
    }
}

impl StoreLauncher for ShopifyCli {
    type Session = RunningProcess;

    fn launch(&mut self, store: &StoreDomain) -> Result<RunningProcess, BuildError> {
        let spec = self.spec(store);
        tracing::debug!(command = %spec.display(), "starting theme dev");

        let mut running = spec.spawn(&self.registry, self.sink.clone())?;
        match running.wait_timeout(self.alive_window, &self.shutdown) {
            Ok(None) => Ok(running),
            Ok(Some(status)) => {
                running.kill();
                let code = status
                    .code()
                    .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
                Err(BuildError::StoreConnectFailed {
                    store: store.to_string(),
                    reason: format!(
                        "theme dev exited with {code} within {}s",
                        self.alive_window.as_secs()
                    ),
                })
            }
            Err(e) => {
                running.kill();
                Err(e)
            }
        }
    }
}
