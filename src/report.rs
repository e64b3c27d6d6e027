//! User-facing output.
//!
//! In console mode lines are coloured and prefixed; in TUI mode every
//! message becomes a `TUI_DATA:<json>` record on stdout for the dashboard.
//! Diagnostics that are only useful to developers go through `tracing`.

use std::io::{self, Write};

use owo_colors::{OwoColorize, Stream as ColorStream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::process::{LineLevel, LineSink, OutputLine, Stream};

/// Prefix of every structured record line
pub const TUI_PREFIX: &str = "TUI_DATA:";

/// State of one build step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

/// Counters reported by `stats` records. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_copied: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_copied: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimizations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
}

/// One entry of `recentChanges`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub files: Vec<String>,
    pub timestamp: String,
    pub count: usize,
}

/// Snapshot carried by `watch_status` records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    pub is_active: bool,
    pub mode: String,
    pub uptime: u64,
    pub change_count: u64,
    pub last_change: String,
    pub recent_changes: Vec<ChangeRecord>,
    pub unique_files_changed: Vec<String>,
    pub total_files_changed: usize,
    pub shopify_url: String,
    pub preview_url: String,
    pub cache_hits: u64,
    pub time_saved: u64,
    pub tailwind_runs: u64,
}

/// Structured TUI record, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TuiEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        step: String,
        progress: u32,
        status: StepStatus,
        message: String,
        current_step: usize,
        total_steps: usize,
        elapsed_ms: u64,
    },
    Stats(StatsRecord),
    Log {
        level: String,
        message: String,
        source: String,
    },
    WatchStatus(WatchStatus),
}

impl TuiEvent {
    pub fn log(level: &str, message: impl Into<String>, source: &str) -> Self {
        TuiEvent::Log {
            level: level.to_string(),
            message: message.into(),
            source: source.to_string(),
        }
    }

    /// `TUI_DATA:{...}` with an RFC 3339 `timestamp` next to `type`
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        Ok(format!("{TUI_PREFIX}{value}"))
    }
}

/// Where user-facing output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Coloured lines; `debug` enables verbose messages
    Console { debug: bool },
    /// `TUI_DATA:` records only
    Tui,
}

impl OutputMode {
    pub fn is_tui(&self) -> bool {
        matches!(self, OutputMode::Tui)
    }

    pub fn is_debug(&self) -> bool {
        matches!(self, OutputMode::Console { debug: true })
    }
}

/// Message category in console mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
    Debug,
    Watch,
    File,
}

impl Tone {
    fn level(&self) -> &'static str {
        match self {
            Tone::Success => "success",
            Tone::Warning => "warning",
            Tone::Error => "error",
            Tone::Debug => "debug",
            Tone::Info | Tone::Watch | Tone::File => "info",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Tone::Info => "ℹ",
            Tone::Success => "✓",
            Tone::Warning => "⚠",
            Tone::Error => "✗",
            Tone::Debug => "·",
            Tone::Watch => "👀",
            Tone::File => "📄",
        }
    }
}

impl From<LineLevel> for Tone {
    fn from(level: LineLevel) -> Self {
        match level {
            LineLevel::Error => Tone::Error,
            LineLevel::Warning => Tone::Warning,
            LineLevel::Success => Tone::Success,
            LineLevel::Info => Tone::Info,
        }
    }
}

fn colorize(tone: Tone, text: &str) -> String {
    let s = ColorStream::Stdout;
    match tone {
        Tone::Info => text.if_supports_color(s, |t| t.cyan()).to_string(),
        Tone::Success => text.if_supports_color(s, |t| t.green()).to_string(),
        Tone::Warning => text.if_supports_color(s, |t| t.yellow()).to_string(),
        Tone::Error => text.if_supports_color(s, |t| t.red()).to_string(),
        Tone::Debug => text.if_supports_color(s, |t| t.bright_black()).to_string(),
        Tone::Watch => text.if_supports_color(s, |t| t.magenta()).to_string(),
        Tone::File => text.if_supports_color(s, |t| t.bright_cyan()).to_string(),
    }
}

fn colorize_label(label: &str) -> String {
    let prefix = format!("[{label}]");
    let s = ColorStream::Stdout;
    match label {
        "TAILWIND" => prefix.if_supports_color(s, |t| t.cyan()).to_string(),
        "TAILWIND-MIN" => prefix.if_supports_color(s, |t| t.bright_magenta()).to_string(),
        "VITE" => prefix.if_supports_color(s, |t| t.purple()).to_string(),
        "SHOPIFY" => prefix.if_supports_color(s, |t| t.magenta()).to_string(),
        _ => prefix.if_supports_color(s, |t| t.bright_yellow()).to_string(),
    }
}

/// Shared output handle. Safe to use from reader threads.
pub struct Reporter {
    mode: OutputMode,
    source: &'static str,
    out: Mutex<Box<dyn Write + Send>>,
    last: Mutex<Option<String>>,
}

impl Reporter {
    /// Report to stdout. `source` tags TUI log records (`build`, `watch`).
    pub fn new(mode: OutputMode, source: &'static str) -> Self {
        Self::with_writer(mode, source, Box::new(io::stdout()))
    }

    pub fn with_writer(mode: OutputMode, source: &'static str, out: Box<dyn Write + Send>) -> Self {
        Self {
            mode,
            source,
            out: Mutex::new(out),
            last: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    /// Write a message; consecutive duplicates are dropped
    pub fn say(&self, tone: Tone, message: &str) {
        match self.mode {
            OutputMode::Tui => {
                self.emit(&TuiEvent::log(tone.level(), message, self.source));
            }
            OutputMode::Console { debug } => {
                if tone == Tone::Debug && !debug {
                    return;
                }
                {
                    let mut last = self.last.lock();
                    if last.as_deref() == Some(message) {
                        return;
                    }
                    *last = Some(message.to_string());
                }
                let time = chrono::Local::now().format("%H:%M:%S").to_string();
                let line = format!(
                    "{} {} {}",
                    time.if_supports_color(ColorStream::Stdout, |t| t.bright_black()),
                    tone.icon(),
                    colorize(tone, message)
                );
                self.write_line(&line);
            }
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.say(Tone::Info, message.as_ref());
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.say(Tone::Success, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.say(Tone::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.say(Tone::Error, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.say(Tone::Debug, message.as_ref());
    }

    pub fn watch(&self, message: impl AsRef<str>) {
        self.say(Tone::Watch, message.as_ref());
    }

    pub fn file(&self, message: impl AsRef<str>) {
        self.say(Tone::File, message.as_ref());
    }

    /// Structured record; ignored in console mode
    pub fn emit(&self, event: &TuiEvent) {
        if !self.mode.is_tui() {
            return;
        }
        match event.to_line() {
            Ok(line) => self.write_line(&line),
            Err(e) => tracing::warn!("could not serialize TUI record: {e}"),
        }
    }

    /// Plain line without prefix or colour (banners, summaries). Console only.
    pub fn plain(&self, line: impl AsRef<str>) {
        if !self.mode.is_tui() {
            self.write_line(line.as_ref());
        }
    }
}

impl LineSink for Reporter {
    fn line(&self, line: OutputLine) {
        match self.mode {
            OutputMode::Tui => {
                let source = line.label.to_ascii_lowercase();
                self.emit(&TuiEvent::log(line.level.as_str(), line.text, &source));
            }
            OutputMode::Console { .. } => {
                let text = if line.stream == Stream::Stderr && line.level == LineLevel::Error {
                    colorize(Tone::Error, &line.text)
                } else {
                    line.text
                };
                self.write_line(&format!("{} {text}", colorize_label(&line.label)));
            }
        }
    }
}
