//! Wrap an external build or watch command and translate its text output.
//!
//! The wrapped command's stdout and stderr are parsed line by line with the
//! pattern tables in [`patterns`]. In TUI mode findings become `TUI_DATA`
//! records; in clean mode they become deduplicated coloured lines.

pub mod build;
pub mod patterns;
pub mod watch;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BuildError;
use crate::process::{ChildRegistry, LineLevel, LineSink, OutputLine, ProcessSpec};
use crate::report::{Reporter, Tone, TuiEvent};

use self::build::BuildAdapter;
use self::watch::WatchAdapter;

/// Label of the wrapped command's output
pub const LABEL: &str = "ADAPT";

/// Exit code reported for a run stopped by Ctrl+C
const INTERRUPTED_CODE: i32 = 130;

/// What an adapter wants shown
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutput {
    /// Structured record (TUI mode)
    Event(TuiEvent),
    /// Clean-mode line
    Clean { tone: Tone, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AdaptKind {
    Build,
    Watch,
}

/// One `adapt` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptRequest {
    pub kind: AdaptKind,
    pub report: bool,
    pub shopify: bool,
    /// Explicit command; empty selects the npm script default
    pub command: Vec<String>,
}

impl AdaptRequest {
    /// Command line to run
    pub fn command_line(&self) -> Vec<String> {
        if !self.command.is_empty() {
            return self.command.clone();
        }
        let script = match (self.kind, self.report, self.shopify) {
            (AdaptKind::Build, true, _) => "build:report",
            (AdaptKind::Build, false, _) => "build",
            (AdaptKind::Watch, _, true) => "watch:shopify",
            (AdaptKind::Watch, _, false) => "watch",
        };
        ["npm", "run", script].map(String::from).to_vec()
    }
}

/// Resolve `npm`/`npx` to their `.cmd` shims on Windows
fn program_for(name: &str) -> String {
    if cfg!(windows) && matches!(name, "npm" | "npx") {
        format!("{name}.cmd")
    } else {
        name.to_string()
    }
}

enum Parser {
    Build(BuildAdapter),
    Watch(WatchAdapter),
}

impl Parser {
    fn start(&mut self) -> Vec<AdapterOutput> {
        match self {
            Parser::Build(a) => a.start(),
            Parser::Watch(a) => a.start(),
        }
    }

    fn handle_line(&mut self, line: &str) -> Vec<AdapterOutput> {
        match self {
            Parser::Build(a) => a.handle_line(line),
            Parser::Watch(a) => a.handle_line(line),
        }
    }

    fn interrupted(&mut self) -> Vec<AdapterOutput> {
        match self {
            Parser::Build(a) => a.finish(false, INTERRUPTED_CODE),
            Parser::Watch(a) => a.finish(None),
        }
    }

    fn finish(&mut self, code: Option<i32>) -> Vec<AdapterOutput> {
        match self {
            Parser::Build(a) => {
                let code = code.unwrap_or(1);
                a.finish(code == 0, code)
            }
            Parser::Watch(a) => a.finish(code),
        }
    }
}

/// Feeds child output through the parser and on to the reporter
struct AdapterSink {
    parser: Mutex<Parser>,
    reporter: Arc<Reporter>,
}

impl AdapterSink {
    fn deliver(&self, outputs: Vec<AdapterOutput>) {
        for output in outputs {
            match output {
                AdapterOutput::Event(event) => self.reporter.emit(&event),
                AdapterOutput::Clean { tone, message } => {
                    if !self.reporter.mode().is_tui() {
                        self.reporter.say(tone, &message);
                    }
                }
            }
        }
    }
}

impl LineSink for AdapterSink {
    fn line(&self, line: OutputLine) {
        let outputs = self.parser.lock().handle_line(&line.text);
        // Clean mode still surfaces errors the pattern tables did not pick up
        if outputs.is_empty() && line.level == LineLevel::Error && !self.reporter.mode().is_tui() {
            self.reporter.error(&line.text);
        }
        self.deliver(outputs);
    }
}

/// Run the wrapped command to completion.
///
/// Returns the adapter's exit code: 0 when the command succeeded, 1 otherwise.
/// Shutdown kills the command and yields `Cancelled`.
pub fn run_adapter(
    request: &AdaptRequest,
    reporter: Arc<Reporter>,
    registry: &ChildRegistry,
    shutdown: &AtomicBool,
) -> Result<i32, BuildError> {
    let command = request.command_line();
    let Some((program, args)) = command.split_first() else {
        return Err(BuildError::SpawnFailed {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let tui = reporter.mode().is_tui();
    let parser = match request.kind {
        AdaptKind::Build => Parser::Build(BuildAdapter::new(tui)),
        AdaptKind::Watch => Parser::Watch(WatchAdapter::new(tui, request.shopify)),
    };
    let sink = Arc::new(AdapterSink {
        parser: Mutex::new(parser),
        reporter,
    });

    tracing::info!(command = %command.join(" "), kind = ?request.kind, "wrapping command");

    let spec = ProcessSpec::new(LABEL, program_for(program))
        .args(args)
        .env("FORCE_COLOR", "0");
    let running = spec.spawn(registry, sink.clone())?;
    sink.deliver(sink.parser.lock().start());

    let status = match running.wait(shutdown) {
        Ok(status) => status,
        Err(e) => {
            // Consumers still get a terminal record for an interrupted run
            sink.deliver(sink.parser.lock().interrupted());
            return Err(e);
        }
    };
    sink.deliver(sink.parser.lock().finish(status.code()));

    Ok(if status.success() { 0 } else { 1 })
}
