//! Build output adapter: turns `npm run build` chatter into progress records.

use std::time::Instant;

use super::patterns;
use super::AdapterOutput;
use crate::process::strip_ansi;
use crate::report::{StatsRecord, StepStatus, Tone, TuiEvent};

/// A build phase with its share of overall progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStep {
    pub name: &'static str,
    pub phase: &'static str,
    pub weight: u32,
}

pub const STEPS: [BuildStep; 3] = [
    BuildStep {
        name: "File Copy",
        phase: "copy",
        weight: 40,
    },
    BuildStep {
        name: "Tailwind CSS",
        phase: "styles",
        weight: 30,
    },
    BuildStep {
        name: "Vite Build",
        phase: "scripts",
        weight: 30,
    },
];

/// Keywords announcing each step, indexed like [`STEPS`]
const STEP_KEYWORDS: [(&[&str], &str); 3] = [
    (&["Copying files", "File copy"], "Copying files..."),
    (&["Building styles", "Tailwind"], "Building styles with Tailwind CSS..."),
    (&["Building scripts", "Vite"], "Building scripts with Vite..."),
];

/// Overall progress given the current step and its own percentage
pub fn weighted_progress(step: usize, step_percent: u32) -> u32 {
    let done: u32 = STEPS.iter().take(step).map(|s| s.weight).sum();
    let current = STEPS
        .get(step)
        .map_or(0, |s| s.weight * step_percent.min(100) / 100);
    (done + current).min(100)
}

/// Incremental parser for build output. Pure: callers route the outputs.
pub struct BuildAdapter {
    tui: bool,
    started: Instant,
    current_step: Option<usize>,
    last_bucket: u32,
    completed: bool,
    cache_reported: bool,
    optimizations_reported: bool,
    files_reported: bool,
}

impl BuildAdapter {
    pub fn new(tui: bool) -> Self {
        Self {
            tui,
            started: Instant::now(),
            current_step: None,
            last_bucket: 0,
            completed: false,
            cache_reported: false,
            optimizations_reported: false,
            files_reported: false,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn progress_event(
        &self,
        step: &str,
        progress: u32,
        status: StepStatus,
        message: &str,
    ) -> AdapterOutput {
        AdapterOutput::Event(TuiEvent::Progress {
            step: step.to_string(),
            progress,
            status,
            message: message.to_string(),
            current_step: self.current_step.unwrap_or(0),
            total_steps: STEPS.len(),
            elapsed_ms: self.elapsed_ms(),
        })
    }

    fn clean(tone: Tone, message: impl Into<String>) -> AdapterOutput {
        AdapterOutput::Clean {
            tone,
            message: message.into(),
        }
    }

    /// Opening records for a new build
    pub fn start(&mut self) -> Vec<AdapterOutput> {
        if self.tui {
            vec![
                AdapterOutput::Event(TuiEvent::log(
                    "info",
                    "Starting optimized build process",
                    "build",
                )),
                self.progress_event("init", 0, StepStatus::Running, "Initializing build system"),
            ]
        } else {
            vec![Self::clean(Tone::Info, "Starting optimized build process...")]
        }
    }

    /// Parse one line of output
    pub fn handle_line(&mut self, raw: &str) -> Vec<AdapterOutput> {
        let line = strip_ansi(raw);
        let line = line.as_ref();
        let mut out = Vec::new();

        if let Some(pct) = patterns::capture_number(patterns::percent(), line) {
            let pct = pct.min(100) as u32;
            if self.tui {
                let step = self.current_step.unwrap_or(0);
                let phase = STEPS[step.min(STEPS.len() - 1)].phase;
                out.push(self.progress_event(
                    phase,
                    weighted_progress(step, pct),
                    StepStatus::Running,
                    "",
                ));
            } else {
                let bucket = pct / 10 * 10;
                if bucket > self.last_bucket {
                    self.last_bucket = bucket;
                    out.push(Self::clean(Tone::Info, format!("Build progress: {pct}%")));
                }
            }
        }

        if let Some(idx) = STEP_KEYWORDS
            .iter()
            .position(|(keys, _)| keys.iter().any(|k| line.contains(k)))
        {
            if self.current_step != Some(idx) {
                let message = STEP_KEYWORDS[idx].1;
                if self.tui {
                    if let Some(prev) = self.current_step {
                        let step = STEPS[prev];
                        out.push(self.progress_event(
                            step.phase,
                            weighted_progress(prev + 1, 0),
                            StepStatus::Completed,
                            &format!("{} completed", step.name),
                        ));
                    }
                    self.current_step = Some(idx);
                    out.push(self.progress_event(
                        STEPS[idx].phase,
                        weighted_progress(idx, 0),
                        StepStatus::Running,
                        message,
                    ));
                } else {
                    self.current_step = Some(idx);
                    out.push(Self::clean(Tone::Info, message));
                }
            }
        }

        if (line.contains("Build completed") || line.contains('✨')) && !self.completed {
            self.completed = true;
            if self.tui {
                out.push(self.progress_event(
                    "complete",
                    100,
                    StepStatus::Completed,
                    "Build completed successfully!",
                ));
            } else {
                out.push(Self::clean(Tone::Success, "Build completed successfully!"));
            }
        }

        self.report_count(
            &mut out,
            patterns::capture_number(patterns::cache_hits(), line),
            |r| r.cache_reported,
            |r| r.cache_reported = true,
            |n| StatsRecord {
                cache_hits: Some(n),
                ..Default::default()
            },
            |n| format!("{n} cache hits"),
        );
        self.report_count(
            &mut out,
            patterns::capture_number(patterns::optimizations(), line),
            |r| r.optimizations_reported,
            |r| r.optimizations_reported = true,
            |n| StatsRecord {
                optimizations: Some(n),
                ..Default::default()
            },
            |n| format!("{n} optimizations applied"),
        );
        self.report_count(
            &mut out,
            patterns::capture_number(patterns::files_processed(), line),
            |r| r.files_reported,
            |r| r.files_reported = true,
            |n| StatsRecord {
                files_processed: Some(n),
                ..Default::default()
            },
            |n| format!("{n} files processed"),
        );

        if self.tui && patterns::is_significant(line) {
            out.push(AdapterOutput::Event(TuiEvent::log(
                patterns::log_level(line),
                line.trim(),
                "build",
            )));
        }

        out
    }

    /// TUI mode reports every occurrence; clean mode only the first
    fn report_count(
        &mut self,
        out: &mut Vec<AdapterOutput>,
        value: Option<u64>,
        reported: fn(&Self) -> bool,
        mark: fn(&mut Self),
        record: impl Fn(u64) -> StatsRecord,
        text: impl Fn(u64) -> String,
    ) {
        let Some(n) = value else { return };
        if self.tui {
            out.push(AdapterOutput::Event(TuiEvent::Stats(record(n))));
        } else if !reported(self) {
            mark(self);
            out.push(Self::clean(Tone::Info, text(n)));
        }
    }

    /// Closing records once the wrapped command exits
    pub fn finish(&mut self, success: bool, code: i32) -> Vec<AdapterOutput> {
        let elapsed = self.elapsed_ms();
        if success {
            if self.tui {
                vec![
                    self.progress_event(
                        "complete",
                        100,
                        StepStatus::Completed,
                        "Build completed successfully!",
                    ),
                    AdapterOutput::Event(TuiEvent::log(
                        "success",
                        format!("Build completed in {elapsed}ms"),
                        "build",
                    )),
                    AdapterOutput::Event(TuiEvent::Stats(StatsRecord {
                        duration: Some(elapsed),
                        ..Default::default()
                    })),
                ]
            } else {
                vec![Self::clean(
                    Tone::Success,
                    format!("Build completed successfully in {elapsed}ms!"),
                )]
            }
        } else if self.tui {
            let progress = weighted_progress(self.current_step.unwrap_or(0), 0);
            vec![
                self.progress_event(
                    "error",
                    progress,
                    StepStatus::Failed,
                    &format!("Build failed with code {code}"),
                ),
                AdapterOutput::Event(TuiEvent::log(
                    "error",
                    format!("Build process failed with exit code {code}"),
                    "build",
                )),
                AdapterOutput::Event(TuiEvent::Stats(StatsRecord {
                    duration: Some(elapsed),
                    errors: Some(1),
                    ..Default::default()
                })),
            ]
        } else {
            vec![Self::clean(
                Tone::Error,
                format!("Build process failed with exit code {code}"),
            )]
        }
    }
}
