//! One-shot build: copy sources, run Tailwind and Vite, write manifests and
//! record analytics.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::adapter::build::{weighted_progress, STEPS};
use crate::analytics::{
    format_bytes, format_millis, BuildHistory, BuildMetrics, BuildStats, StatsSnapshot, DATA_DIR,
};
use crate::config::{BuildOptions, Config};
use crate::copier::{collect_source_files, copy_files, CopySummary};
use crate::error::BuildError;
use crate::manifest;
use crate::process::tailwind::{run_tailwind, TailwindJob, TailwindOutcome};
use crate::process::{vite, ChildRegistry, LineSink};
use crate::report::{Reporter, StatsRecord, StepStatus, TuiEvent};
use crate::splitting;

const STEP_COPY: usize = 0;
const STEP_STYLES: usize = 1;
const STEP_SCRIPTS: usize = 2;

/// What a finished build did
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub copy: CopySummary,
    pub stats: StatsSnapshot,
    pub elapsed: Duration,
    /// `None` when Tailwind was skipped by flag
    pub tailwind: Option<TailwindOutcome>,
    pub vite_ran: bool,
    pub regression: bool,
}

/// Emits `progress` records for the build steps
struct StepReporter<'a> {
    reporter: &'a Reporter,
    started: Instant,
}

impl StepReporter<'_> {
    fn emit(&self, step: usize, step_percent: u32, status: StepStatus, message: &str) {
        self.reporter.emit(&TuiEvent::Progress {
            step: STEPS[step].phase.to_string(),
            progress: weighted_progress(step, step_percent),
            status,
            message: message.to_string(),
            current_step: step,
            total_steps: STEPS.len(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        });
    }

    fn running(&self, step: usize, message: &str) {
        self.emit(step, 0, StepStatus::Running, message);
        self.reporter.info(message);
    }

    fn completed(&self, step: usize, message: &str) {
        self.emit(step, 100, StepStatus::Completed, message);
        self.reporter.success(message);
    }

    fn failed(&self, step: usize, message: &str) {
        self.emit(step, 0, StepStatus::Failed, message);
        self.reporter.error(message);
    }
}

fn copy_progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn copy_step(
    config: &Config,
    opts: BuildOptions,
    steps: &StepReporter<'_>,
    stats: &BuildStats,
    shutdown: &AtomicBool,
) -> Result<CopySummary, BuildError> {
    steps.running(STEP_COPY, "Copying files...");
    if !config.src_root.is_dir() {
        steps.failed(STEP_COPY, "Source directory not found");
        return Err(BuildError::SourceRootNotFound {
            path: config.src_root.clone(),
        });
    }

    let files = collect_source_files(&config.src_root, &config.build_root);
    let total = files.len();
    let pb = copy_progress_bar(total as u64, !config.mode.is_tui());
    let done = AtomicUsize::new(0);
    let last_bucket = AtomicU32::new(0);

    let summary = copy_files(
        &config.src_root,
        &config.build_root,
        &files,
        shutdown,
        stats,
        opts.force,
        || {
            pb.inc(1);
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            let percent = (n * 100 / total.max(1)) as u32;
            let bucket = percent / 10;
            if last_bucket.fetch_max(bucket, Ordering::Relaxed) < bucket {
                steps.emit(STEP_COPY, percent, StepStatus::Running, "Copying files...");
            }
        },
    );
    pb.finish_and_clear();
    let summary = summary?;

    steps.completed(
        STEP_COPY,
        &format!(
            "Copied {} files ({} up to date, {} failed)",
            summary.copied, summary.skipped, summary.failed
        ),
    );
    Ok(summary)
}

fn styles_step(
    config: &Config,
    steps: &StepReporter<'_>,
    reporter: &Arc<Reporter>,
    registry: &ChildRegistry,
    stats: &BuildStats,
    shutdown: &AtomicBool,
) -> Result<TailwindOutcome, BuildError> {
    steps.running(STEP_STYLES, "Building styles with Tailwind CSS...");
    let job = TailwindJob::new(
        &config.root,
        &config.src_root,
        &config.build_root,
        config.ready_flag.clone(),
    );
    let sink: Arc<dyn LineSink> = reporter.clone();
    match run_tailwind(&job, registry, sink, shutdown) {
        Ok(outcome) => {
            if outcome != TailwindOutcome::Skipped {
                stats.record_tailwind_run();
            }
            let message = match outcome {
                TailwindOutcome::Complete => "Tailwind CSS build complete".to_string(),
                TailwindOutcome::MinifyFailed { code } => {
                    format!("Tailwind CSS built; minified output failed with code {code}")
                }
                TailwindOutcome::Skipped => "No Tailwind entry stylesheet, skipped".to_string(),
            };
            steps.completed(STEP_STYLES, &message);
            Ok(outcome)
        }
        Err(BuildError::Cancelled) => Err(BuildError::Cancelled),
        Err(e) => {
            steps.failed(STEP_STYLES, &format!("Tailwind CSS failed: {e}"));
            Err(e)
        }
    }
}

fn scripts_step(
    config: &Config,
    steps: &StepReporter<'_>,
    reporter: &Arc<Reporter>,
    registry: &ChildRegistry,
    shutdown: &AtomicBool,
) -> Result<bool, BuildError> {
    if vite::find_config(&config.root).is_none() {
        steps.completed(STEP_SCRIPTS, "No Vite config found, skipping scripts");
        return Ok(false);
    }
    steps.running(STEP_SCRIPTS, "Building scripts with Vite...");
    let sink: Arc<dyn LineSink> = reporter.clone();
    match vite::run_build(&config.root, registry, sink, shutdown) {
        Ok(()) => {
            steps.completed(STEP_SCRIPTS, "Vite build complete");
            Ok(true)
        }
        Err(BuildError::Cancelled) => Err(BuildError::Cancelled),
        Err(e) => {
            steps.failed(STEP_SCRIPTS, &format!("Vite build failed: {e}"));
            Err(e)
        }
    }
}

/// Manifests are advisory: failures are reported, never fatal
fn write_manifests(config: &Config, reporter: &Reporter) {
    match manifest::write_manifest(&config.build_root) {
        Ok(m) => reporter.success(format!("Generated asset manifest with {} files", m.len())),
        Err(e) => reporter.warn(format!("Failed to generate asset manifest: {e}")),
    }
    match splitting::write_manifest(&config.src_root, &config.build_root) {
        Ok(m) => reporter.debug(format!(
            "Code splitting: {} modules, {} critical, {} lazy",
            m.stats.total_files, m.stats.critical_modules, m.stats.lazy_modules
        )),
        Err(e) => reporter.warn(format!("Failed to analyze code splitting: {e}")),
    }
}

/// Append this build to the history. Returns whether it regressed.
fn record_history(config: &Config, metrics: BuildMetrics, reporter: &Reporter) -> bool {
    let mut history = BuildHistory::load(&config.root.join(DATA_DIR));
    let regression = history.is_regression(&metrics);
    if regression {
        reporter.warn(format!(
            "Build time regression: {} (previous average {})",
            format_millis(metrics.build_time),
            format_millis(history.average_build_time())
        ));
    }
    for warning in &metrics.warnings {
        reporter.warn(warning);
    }
    history.push(metrics);
    if let Err(e) = history.save() {
        reporter.warn(format!("Failed to save build history: {e}"));
    }
    regression
}

fn print_report(reporter: &Reporter, summary: &BuildSummary, config: &Config) {
    let history = BuildHistory::load(&config.root.join(DATA_DIR));
    reporter.plain("");
    reporter.plain("Build report");
    reporter.plain(format!(
        "  Duration:          {}",
        format_millis(summary.elapsed.as_millis() as u64)
    ));
    reporter.plain(format!("  Files copied:      {}", summary.stats.files_copied));
    reporter.plain(format!("  Up to date:        {}", summary.stats.cache_hits));
    reporter.plain(format!("  Bytes copied:      {}", format_bytes(summary.stats.bytes_copied)));
    reporter.plain(format!("  Cache efficiency:  {}%", summary.stats.cache_efficiency()));
    reporter.plain(format!("  Errors:            {}", summary.stats.errors));
    reporter.plain(format!(
        "  History:           {} builds, average {}",
        history.entries().len(),
        format_millis(history.average_build_time())
    ));
}

/// Run the whole build.
///
/// Copy errors are counted and reported; Tailwind (first pass) and Vite
/// failures abort the build.
pub fn run_build(
    config: &Config,
    opts: BuildOptions,
    reporter: Arc<Reporter>,
    registry: &ChildRegistry,
    shutdown: &AtomicBool,
) -> Result<BuildSummary, BuildError> {
    let started = Instant::now();
    let stats = BuildStats::new();
    let steps = StepReporter {
        reporter: &reporter,
        started,
    };

    reporter.info("Starting optimized build process...");
    tracing::debug!(
        src = %config.src_root.display(),
        out = %config.build_root.display(),
        force = opts.force,
        "build configuration"
    );

    let copy = copy_step(config, opts, &steps, &stats, shutdown)?;

    let tailwind = if opts.skip_tailwind {
        steps.completed(STEP_STYLES, "Tailwind CSS skipped");
        None
    } else {
        Some(styles_step(config, &steps, &reporter, registry, &stats, shutdown)?)
    };

    let vite_ran = if opts.skip_vite {
        steps.completed(STEP_SCRIPTS, "Vite build skipped");
        false
    } else {
        scripts_step(config, &steps, &reporter, registry, shutdown)?
    };

    write_manifests(config, &reporter);

    let elapsed = started.elapsed();
    let snapshot = stats.snapshot();
    let regression = record_history(
        config,
        BuildMetrics::from_stats(&snapshot, elapsed),
        &reporter,
    );

    reporter.emit(&TuiEvent::Stats(StatsRecord {
        duration: Some(elapsed.as_millis() as u64),
        files_copied: Some(snapshot.files_copied),
        bytes_copied: Some(snapshot.bytes_copied),
        cache_hits: Some(snapshot.cache_hits),
        files_processed: Some(snapshot.files_copied + snapshot.cache_hits),
        errors: Some(snapshot.errors),
        ..Default::default()
    }));
    reporter.success(format!(
        "Build completed in {} ({} files, {})",
        format_millis(elapsed.as_millis() as u64),
        snapshot.files_copied + snapshot.cache_hits,
        format_bytes(snapshot.bytes_copied)
    ));

    let summary = BuildSummary {
        copy,
        stats: snapshot,
        elapsed,
        tailwind,
        vite_ran,
        regression,
    };
    if opts.report {
        print_report(&reporter, &summary, config);
    }
    Ok(summary)
}
