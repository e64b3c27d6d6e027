//! Child process orchestration.
//!
//! Every external tool (Tailwind CLI, Vite, Shopify CLI) is spawned with piped
//! output. One reader thread per stream strips ANSI escapes, classifies each
//! line and forwards it to a [`LineSink`] under the process label. Spawned
//! children are tracked in a [`ChildRegistry`] so shutdown can kill them all.
//!
//! ```ignore
//! let status = ProcessSpec::npx("VITE")
//!     .args(["vite", "build"])
//!     .cwd(&root)
//!     .spawn(&registry, sink.clone())?
//!     .wait(&shutdown)?;
//! ```

pub mod shopify;
pub mod tailwind;
pub mod vite;

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// How often blocking waits re-check the child and the shutdown flag
const POLL: Duration = Duration::from_millis(50);

// ============================================================================
// Line handling
// ============================================================================

/// Severity of one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Error,
    Warning,
    Success,
    Info,
}

impl LineLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineLevel::Error => "error",
            LineLevel::Warning => "warning",
            LineLevel::Success => "success",
            LineLevel::Info => "info",
        }
    }
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One cleaned, classified line of child output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub label: Arc<str>,
    pub text: String,
    pub level: LineLevel,
    pub stream: Stream,
}

/// Receives child output lines. Called from reader threads.
pub trait LineSink: Send + Sync {
    fn line(&self, line: OutputLine);
}

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Literal pattern; compilation cannot fail
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap()
    })
}

/// Remove ANSI escape sequences (colours, cursor movement)
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    ansi_regex().replace_all(s, "")
}

/// Classify a line by keywords, most severe first
pub fn classify_line(line: &str) -> LineLevel {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("failed") || line.contains('❌') {
        LineLevel::Error
    } else if lower.contains("warn") || line.contains('⚠') {
        LineLevel::Warning
    } else if lower.contains("success")
        || lower.contains("done in")
        || lower.contains("built in")
        || line.contains('✓')
        || line.contains('✨')
    {
        LineLevel::Success
    } else {
        LineLevel::Info
    }
}

/// Forward every non-blank line of `reader` to `sink`
fn pump_lines<R: Read>(reader: R, label: Arc<str>, stream: Stream, sink: &dyn LineSink) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let raw = String::from_utf8_lossy(&buf);
                // Progress redraws use `\r`; keep the final state
                let last = raw.trim_end().rsplit('\r').next().unwrap_or_default();
                let text = strip_ansi(last);
                let text = text.trim_end();
                if text.trim().is_empty() {
                    continue;
                }
                sink.line(OutputLine {
                    label: label.clone(),
                    level: classify_line(text),
                    text: text.to_string(),
                    stream,
                });
            }
            Err(e) => {
                tracing::debug!(label = %label, "output reader stopped: {e}");
                break;
            }
        }
    }
}

// ============================================================================
// Child registry
// ============================================================================

struct Tracked {
    label: Arc<str>,
    child: Arc<Mutex<Child>>,
}

/// Every child spawned this session, for cleanup on exit
#[derive(Default)]
pub struct ChildRegistry {
    children: Mutex<Vec<Tracked>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, label: Arc<str>, child: Child) -> Arc<Mutex<Child>> {
        let child = Arc::new(Mutex::new(child));
        let mut children = self.children.lock();
        // Drop entries for children that already exited
        children.retain(|t| matches!(t.child.lock().try_wait(), Ok(None)));
        children.push(Tracked {
            label,
            child: child.clone(),
        });
        child
    }

    /// Children still running
    pub fn running(&self) -> usize {
        self.children
            .lock()
            .iter()
            .filter(|t| matches!(t.child.lock().try_wait(), Ok(None)))
            .count()
    }

    /// Kill and reap every tracked child
    pub fn kill_all(&self) {
        let tracked: Vec<Tracked> = std::mem::take(&mut *self.children.lock());
        for t in tracked {
            let mut child = t.child.lock();
            if let Ok(None) = child.try_wait() {
                tracing::debug!(label = %t.label, pid = child.id(), "killing child process");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

// ============================================================================
// Spawning
// ============================================================================

/// Platform name of the `npx` launcher
#[inline]
pub fn npx_program() -> &'static str {
    if cfg!(windows) {
        "npx.cmd"
    } else {
        "npx"
    }
}

fn install_hint(program: &str) -> &'static str {
    let name = Path::new(program)
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(program);
    match name {
        "npx" | "npm" | "node" => "Install Node.js (https://nodejs.org) and make sure it is on PATH",
        "shopify" => "Install the Shopify CLI: npm install -g @shopify/cli @shopify/theme",
        _ => "Make sure the program is installed and on PATH",
    }
}

/// Builder for a labelled, output-streaming child process
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    label: Arc<str>,
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl ProcessSpec {
    pub fn new<S: AsRef<OsStr>>(label: &str, program: S) -> Self {
        Self {
            label: Arc::from(label),
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    /// `npx` (or `npx.cmd`) as the program
    pub fn npx(label: &str) -> Self {
        Self::new(label, npx_program())
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    pub fn env<K: AsRef<str>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
        self.envs
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.to_string_lossy())
            .chain(self.args.iter().map(|a| a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn with piped output, register the child and start reader threads
    pub fn spawn(
        self,
        registry: &ChildRegistry,
        sink: Arc<dyn LineSink>,
    ) -> Result<RunningProcess, BuildError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(label = %self.label, command = %self.display(), "spawning");

        let mut child = cmd.spawn().map_err(|e| {
            let program = self.program_name();
            if e.kind() == io::ErrorKind::NotFound {
                sink.line(OutputLine {
                    label: self.label.clone(),
                    text: format!("{program} not found. {}", install_hint(&program)),
                    level: LineLevel::Error,
                    stream: Stream::Stderr,
                });
            }
            BuildError::SpawnFailed { program, source: e }
        })?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let (label, sink) = (self.label.clone(), sink.clone());
            readers.push(thread::spawn(move || {
                pump_lines(stdout, label, Stream::Stdout, sink.as_ref())
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let (label, sink) = (self.label.clone(), sink.clone());
            readers.push(thread::spawn(move || {
                pump_lines(stderr, label, Stream::Stderr, sink.as_ref())
            }));
        }

        let child = registry.track(self.label.clone(), child);
        Ok(RunningProcess {
            label: self.label,
            child,
            readers,
        })
    }
}

/// Handle to a spawned child
pub struct RunningProcess {
    label: Arc<str>,
    child: Arc<Mutex<Child>>,
    readers: Vec<JoinHandle<()>>,
}

impl RunningProcess {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> u32 {
        self.child.lock().id()
    }

    /// Exit status if the child has finished
    pub fn try_status(&self) -> Result<Option<ExitStatus>, BuildError> {
        Ok(self.child.lock().try_wait()?)
    }

    /// Block until exit. Shutdown kills the child and returns `Cancelled`.
    pub fn wait(mut self, shutdown: &AtomicBool) -> Result<ExitStatus, BuildError> {
        loop {
            if let Some(status) = self.try_status()? {
                self.join_readers();
                return Ok(status);
            }
            if shutdown.load(Ordering::Relaxed) {
                self.kill();
                return Err(BuildError::Cancelled);
            }
            thread::sleep(POLL);
        }
    }

    /// Wait up to `timeout`. `Ok(None)` means the child is still running.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
        shutdown: &AtomicBool,
    ) -> Result<Option<ExitStatus>, BuildError> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.try_status()? {
                return Ok(Some(status));
            }
            if shutdown.load(Ordering::Relaxed) {
                return Err(BuildError::Cancelled);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }
            thread::sleep(POLL.min(timeout - elapsed));
        }
    }

    /// Kill and reap; output readers are drained
    pub fn kill(&mut self) {
        {
            let mut child = self.child.lock();
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        self.join_readers();
    }

    fn join_readers(&mut self) {
        for handle in self.readers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Map an exit status to `ProcessFailed` unless it is zero
pub fn check_status(label: &str, status: ExitStatus) -> Result<(), BuildError> {
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::ProcessFailed {
            label: label.to_string(),
            code: status.code().unwrap_or(-1),
        })
    }
}

/// Spawn, wait, and fail on a non-zero exit
pub fn run_to_completion(
    spec: ProcessSpec,
    registry: &ChildRegistry,
    sink: Arc<dyn LineSink>,
    shutdown: &AtomicBool,
) -> Result<(), BuildError> {
    let label = spec.label().to_string();
    let status = spec.spawn(registry, sink)?.wait(shutdown)?;
    check_status(&label, status)
}

/// Sleep in short steps. Returns false if shutdown interrupted the sleep.
pub fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(POLL.min(deadline - now));
    }
}

/// Line sink that keeps everything in memory
#[derive(Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<OutputLine>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines.lock().clone()
    }
}

impl LineSink for CollectingSink {
    fn line(&self, line: OutputLine) {
        self.lines.lock().push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[32mDone\x1b[0m in 12ms"), "Done in 12ms");
        assert_eq!(strip_ansi("\x1b[2K\x1b[1Gplain"), "plain");
        assert!(matches!(strip_ansi("no escapes"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("Error: cannot find module"), LineLevel::Error);
        assert_eq!(classify_line("Build FAILED"), LineLevel::Error);
        assert_eq!(classify_line("warn - no utilities found"), LineLevel::Warning);
        assert_eq!(classify_line("Done in 120ms"), LineLevel::Success);
        assert_eq!(classify_line("✓ built in 1.2s"), LineLevel::Success);
        assert_eq!(classify_line("Rebuilding..."), LineLevel::Info);
    }

    #[test]
    fn test_pump_lines_skips_blank_and_strips() {
        let sink = CollectingSink::new();
        let input = b"\x1b[36mfirst\x1b[0m\n\n   \nprogress 10%\rprogress 100%\nerror here\n";
        pump_lines(&input[..], Arc::from("TAILWIND"), Stream::Stdout, &sink);
        let lines = sink.lines();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "progress 100%", "error here"]);
        assert_eq!(lines[2].level, LineLevel::Error);
        assert_eq!(&*lines[0].label, "TAILWIND");
    }

    #[test]
    fn test_spec_display() {
        let spec = ProcessSpec::new("VITE", "npx").args(["vite", "build"]);
        assert_eq!(spec.display(), "npx vite build");
        assert_eq!(spec.label(), "VITE");
    }

    #[test]
    fn test_install_hint() {
        assert!(install_hint("npx.cmd").contains("Node.js"));
        assert!(install_hint("/usr/bin/shopify").contains("Shopify CLI"));
    }

    #[test]
    fn test_spawn_missing_program() {
        let registry = ChildRegistry::new();
        let sink = Arc::new(CollectingSink::new());
        let err = ProcessSpec::new("MISSING", "definitely-not-a-real-binary-xyz")
            .spawn(&registry, sink.clone())
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::SpawnFailed { .. }));
        assert_eq!(sink.lines()[0].level, LineLevel::Error);
    }

    #[test]
    fn test_sleep_unless_shutdown() {
        let shutdown = AtomicBool::new(false);
        assert!(sleep_unless_shutdown(Duration::from_millis(10), &shutdown));
        shutdown.store(true, Ordering::Relaxed);
        assert!(!sleep_unless_shutdown(Duration::from_secs(10), &shutdown));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_to_completion_streams_and_checks_status() {
        let registry = ChildRegistry::new();
        let sink = Arc::new(CollectingSink::new());
        let shutdown = AtomicBool::new(false);

        let ok = ProcessSpec::new("SH", "sh").args(["-c", "echo hello; echo oops >&2"]);
        run_to_completion(ok, &registry, sink.clone(), &shutdown).unwrap();
        let mut texts: Vec<String> = sink.lines().into_iter().map(|l| l.text).collect();
        texts.sort();
        assert_eq!(texts, vec!["hello", "oops"]);

        let failing = ProcessSpec::new("SH", "sh").args(["-c", "exit 3"]);
        let err = run_to_completion(failing, &registry, sink, &shutdown).unwrap_err();
        assert!(matches!(err, BuildError::ProcessFailed { code: 3, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_all() {
        let registry = ChildRegistry::new();
        let sink = Arc::new(CollectingSink::new());
        let running = ProcessSpec::new("SLEEP", "sleep")
            .arg("30")
            .spawn(&registry, sink)
            .unwrap();
        assert_eq!(registry.running(), 1);
        registry.kill_all();
        assert!(running.try_status().unwrap().is_some());
        assert_eq!(registry.running(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_wait_timeout_still_running() {
        let registry = ChildRegistry::new();
        let sink = Arc::new(CollectingSink::new());
        let shutdown = AtomicBool::new(false);
        let mut running = ProcessSpec::new("SLEEP", "sleep")
            .arg("30")
            .spawn(&registry, sink)
            .unwrap();
        let status = running
            .wait_timeout(Duration::from_millis(100), &shutdown)
            .unwrap();
        assert!(status.is_none());
        running.kill();
        assert!(running.try_status().unwrap().is_some());
    }
}
