use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use theme_build::adapter::run_adapter;
use theme_build::builder::run_build;
use theme_build::config::{Cli, Config, RunCommand};
use theme_build::error::BuildError;
use theme_build::logging::init_logging;
use theme_build::process::ChildRegistry;
use theme_build::report::Reporter;
use theme_build::watch::run_watch;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            let code = e
                .downcast_ref::<BuildError>()
                .map_or(1, BuildError::exit_code);
            if code != 130 {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    init_logging(config.log_level.as_deref(), config.debug);
    tracing::debug!(?config, "configuration resolved");

    // Children are killed here as well as by the loops; either may notice first
    let shutdown = Arc::new(AtomicBool::new(false));
    let registry = Arc::new(ChildRegistry::new());
    {
        let shutdown = shutdown.clone();
        let registry = registry.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            registry.kill_all();
        })
        .context("Failed to set Ctrl+C handler")?;
    }

    // Configure Rayon thread pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build_global()
        .ok();

    match &config.command {
        RunCommand::Build(opts) => {
            let reporter = Arc::new(Reporter::new(config.mode, "build"));
            run_build(&config, *opts, reporter, &registry, &shutdown)?;
            Ok(ExitCode::SUCCESS)
        }
        RunCommand::Watch(opts) => {
            let reporter = Arc::new(Reporter::new(config.mode, "watch"));
            run_watch(&config, opts, reporter, registry.clone(), shutdown.clone())?;
            Ok(ExitCode::SUCCESS)
        }
        RunCommand::Adapt(request) => {
            let reporter = Arc::new(Reporter::new(config.mode, "adapter"));
            let code = run_adapter(request, reporter, &registry, &shutdown)
                .with_context(|| format!("Failed to run {}", request.command_line().join(" ")))?;
            Ok(ExitCode::from(code as u8))
        }
    }
}
