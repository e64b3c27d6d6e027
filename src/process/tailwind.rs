//! Tailwind CLI runs.
//!
//! A run is two passes: a readable `tailwind.css` for development, then
//! `tailwind.min.css`. The readiness flag is cleared before the first pass
//! and written only after the minified pass succeeds.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::analytics::BuildStats;
use crate::error::BuildError;
use crate::process::{
    check_status, ChildRegistry, LineLevel, LineSink, OutputLine, ProcessSpec, Stream,
};
use crate::sentinel::ReadyFlag;

pub const LABEL: &str = "TAILWIND";
pub const LABEL_MIN: &str = "TAILWIND-MIN";

/// Output file names inside `assets/`
pub const OUTPUT: &str = "tailwind.css";
pub const OUTPUT_MIN: &str = "tailwind.min.css";

/// Everything a Tailwind run needs
#[derive(Debug, Clone)]
pub struct TailwindJob {
    /// Working directory (project root, where `tailwind.config.js` lives)
    pub root: PathBuf,
    /// Entry stylesheet
    pub input: PathBuf,
    /// Build `assets/` directory
    pub assets_dir: PathBuf,
    pub flag: ReadyFlag,
}

impl TailwindJob {
    /// Standard layout: `<src>/styles/tailwind.css` → `<build>/assets/`
    pub fn new(root: &Path, src_root: &Path, build_root: &Path, flag: ReadyFlag) -> Self {
        Self {
            root: root.to_path_buf(),
            input: src_root.join("styles").join("tailwind.css"),
            assets_dir: build_root.join("assets"),
            flag,
        }
    }

    fn pass(&self, label: &str, output: &str, minify: bool) -> ProcessSpec {
        let spec = ProcessSpec::npx(label)
            .arg("tailwindcss")
            .arg("-i")
            .arg(&self.input)
            .arg("-o")
            .arg(self.assets_dir.join(output))
            .cwd(&self.root);
        if minify {
            spec.arg("--minify").env("NODE_ENV", "production")
        } else {
            spec.arg("--minify=false").env("NODE_ENV", "development")
        }
    }
}

/// How a run ended when it did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailwindOutcome {
    /// Both passes succeeded and the flag was written
    Complete,
    /// Development pass succeeded; minified pass exited with `code`
    MinifyFailed { code: i32 },
    /// Entry stylesheet does not exist
    Skipped,
}

fn note(sink: &dyn LineSink, level: LineLevel, text: impl Into<String>) {
    sink.line(OutputLine {
        label: Arc::from(LABEL),
        text: text.into(),
        level,
        stream: Stream::Stdout,
    });
}

/// Run both passes. Failure of the first pass is an error; failure of the
/// second leaves the readable output in place and does not signal.
/// Without an input stylesheet nothing runs and the flag is signalled at once,
/// so style batches never wait on a pass that will not happen.
pub fn run_tailwind(
    job: &TailwindJob,
    registry: &ChildRegistry,
    sink: Arc<dyn LineSink>,
    shutdown: &AtomicBool,
) -> Result<TailwindOutcome, BuildError> {
    if !job.input.is_file() {
        note(
            sink.as_ref(),
            LineLevel::Warning,
            format!("{} not found, skipping Tailwind", job.input.display()),
        );
        if let Err(e) = job.flag.signal() {
            tracing::debug!("could not signal ready flag: {e}");
        }
        return Ok(TailwindOutcome::Skipped);
    }

    if let Err(e) = job.flag.clear() {
        tracing::debug!("could not clear ready flag: {e}");
    }

    let status = job
        .pass(LABEL, OUTPUT, false)
        .spawn(registry, sink.clone())?
        .wait(shutdown)?;
    check_status(LABEL, status)?;
    note(
        sink.as_ref(),
        LineLevel::Success,
        "Tailwind CSS (non-minified) processed successfully",
    );

    let status = job
        .pass(LABEL_MIN, OUTPUT_MIN, true)
        .spawn(registry, sink.clone())?
        .wait(shutdown)?;
    if let Err(BuildError::ProcessFailed { code, .. }) = check_status(LABEL_MIN, status) {
        note(
            sink.as_ref(),
            LineLevel::Warning,
            format!("Tailwind CSS minified processing failed with code {code}"),
        );
        return Ok(TailwindOutcome::MinifyFailed { code });
    }
    note(
        sink.as_ref(),
        LineLevel::Success,
        "Tailwind CSS (minified) processed successfully",
    );

    match job.flag.signal() {
        Ok(()) => {
            tracing::debug!(flag = %job.flag.path().display(), "signalled Tailwind completion")
        }
        Err(e) => note(
            sink.as_ref(),
            LineLevel::Error,
            format!("Error creating Tailwind ready flag: {e}"),
        ),
    }
    Ok(TailwindOutcome::Complete)
}

enum Request {
    Rebuild,
    Stop,
}

/// Background Tailwind runner for watch mode.
///
/// Requests queued while a run is in progress collapse into one follow-up run.
pub struct TailwindWorker {
    tx: Sender<Request>,
    handle: Option<JoinHandle<()>>,
}

impl TailwindWorker {
    pub fn spawn(
        job: TailwindJob,
        registry: Arc<ChildRegistry>,
        sink: Arc<dyn LineSink>,
        stats: Arc<BuildStats>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("tailwind-worker".to_string())
            .spawn(move || worker_loop(rx, &job, &registry, sink, &stats, &shutdown))
            .map_err(|e| tracing::error!("failed to start Tailwind worker: {e}"))
            .ok();
        Self { tx, handle }
    }

    /// Queue a rebuild. Never blocks.
    pub fn request(&self) {
        let _ = self.tx.send(Request::Rebuild);
    }

    /// Stop after the current run and join the thread
    pub fn stop(mut self) {
        let _ = self.tx.send(Request::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    rx: Receiver<Request>,
    job: &TailwindJob,
    registry: &ChildRegistry,
    sink: Arc<dyn LineSink>,
    stats: &BuildStats,
    shutdown: &AtomicBool,
) {
    while let Ok(Request::Rebuild) = rx.recv() {
        let mut stop = false;
        let mut coalesced = 0usize;
        for pending in rx.try_iter() {
            match pending {
                Request::Rebuild => coalesced += 1,
                Request::Stop => stop = true,
            }
        }
        if coalesced > 0 {
            tracing::debug!(coalesced, "coalesced queued Tailwind requests");
        }

        stats.record_tailwind_run();
        match run_tailwind(job, registry, sink.clone(), shutdown) {
            Ok(outcome) => tracing::debug!(?outcome, "Tailwind run finished"),
            Err(BuildError::Cancelled) => break,
            Err(e) => note(sink.as_ref(), LineLevel::Error, format!("Tailwind build error: {e}")),
        }

        if stop {
            break;
        }
    }
}
