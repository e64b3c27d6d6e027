//! CLI configuration and runtime settings for theme builds.

use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapter::{AdaptKind, AdaptRequest};
use crate::batcher::DebounceConfig;
use crate::process::shopify::DEFAULT_ALIVE_WINDOW;
use crate::report::OutputMode;
use crate::sentinel::{ReadyFlag, READY_FLAG_ENV};
use crate::theme::{default_store_sequence, StoreDomain};

/// Build and watch pipeline for Shopify themes
#[derive(Parser, Debug)]
#[command(name = "theme-build")]
#[command(version)]
#[command(about = "Build and watch pipeline for Shopify themes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Project root (where package.json and tailwind.config.js live)
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Source directory, relative to the root
    #[arg(long, global = true, default_value = "src")]
    pub src: PathBuf,

    /// Build output directory, relative to the root
    #[arg(long, global = true, default_value = "Curalife-Theme-Build")]
    pub out: PathBuf,

    /// Verbose output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit TUI_DATA records instead of coloured text
    #[arg(long, global = true)]
    pub tui_mode: bool,

    /// Diagnostic log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Number of parallel copy workers
    #[arg(short, long, global = true, default_value_t = num_cpus::get())]
    pub jobs: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// One-shot build: copy, Tailwind, Vite, manifests
    Build(BuildArgs),
    /// Incremental rebuilds on file changes
    Watch(WatchArgs),
    /// Wrap a build or watch command and translate its output
    Adapt(AdaptArgs),
}

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Print the full build report
    #[arg(long)]
    pub report: bool,

    /// Copy every file even if the build copy is up to date
    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub skip_tailwind: bool,

    #[arg(long)]
    pub skip_vite: bool,
}

#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Also run `shopify theme dev` against the store sequence
    #[arg(long)]
    pub shopify: bool,

    /// Store to connect to; repeat to set a fallback order
    #[arg(long = "store")]
    pub stores: Vec<String>,

    /// Seconds `theme dev` must keep running to count as connected
    #[arg(long)]
    pub alive_window_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct AdaptArgs {
    #[arg(value_enum)]
    pub kind: AdaptKind,

    #[arg(long)]
    pub report: bool,

    #[arg(long)]
    pub shopify: bool,

    /// Command to wrap instead of the npm script
    #[arg(last = true)]
    pub command: Vec<String>,
}

/// Environment variables consulted at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub shopify_store: Option<String>,
    pub ready_flag: Option<PathBuf>,
    pub watch_combined: bool,
    pub tui_mode: bool,
}

fn truthy(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

impl EnvOverrides {
    pub fn from_process() -> Self {
        Self {
            shopify_store: env::var("SHOPIFY_STORE").ok().filter(|s| !s.trim().is_empty()),
            ready_flag: env::var_os(READY_FLAG_ENV).map(PathBuf::from),
            watch_combined: truthy(env::var("WATCH_COMBINED").ok()),
            tui_mode: truthy(env::var("TUI_MODE").ok()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildOptions {
    pub report: bool,
    pub force: bool,
    pub skip_tailwind: bool,
    pub skip_vite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Run the Shopify CLI alongside the watcher
    pub combined: bool,
    pub stores: Vec<StoreDomain>,
    pub alive_window: Duration,
    pub debounce: DebounceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunCommand {
    Build(BuildOptions),
    Watch(WatchOptions),
    Adapt(AdaptRequest),
}

/// Runtime configuration parsed from CLI and environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root
    pub root: PathBuf,
    pub src_root: PathBuf,
    pub build_root: PathBuf,
    pub mode: OutputMode,
    pub debug: bool,
    pub log_level: Option<String>,
    /// Number of parallel workers
    pub jobs: usize,
    pub ready_flag: ReadyFlag,
    pub command: RunCommand,
}

fn under_root(root: &Path, dir: PathBuf) -> PathBuf {
    if dir.is_absolute() {
        dir
    } else {
        root.join(dir)
    }
}

/// `--store` flags, else `SHOPIFY_STORE`, else the default sequence
fn store_sequence(flags: &[String], env_store: Option<&str>) -> anyhow::Result<Vec<StoreDomain>> {
    if !flags.is_empty() {
        return flags
            .iter()
            .map(|s| StoreDomain::validated(s).map_err(anyhow::Error::from))
            .collect();
    }
    match env_store {
        Some(store) => Ok(vec![StoreDomain::validated(store)?]),
        None => Ok(default_store_sequence()),
    }
}

impl Config {
    /// Create Config from CLI arguments and the process environment
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        Self::from_parts(cli, EnvOverrides::from_process())
    }

    pub fn from_parts(cli: Cli, env: EnvOverrides) -> anyhow::Result<Self> {
        let root = cli.root.canonicalize().unwrap_or(cli.root);
        let src_root = under_root(&root, cli.src);
        let build_root = under_root(&root, cli.out);

        let mode = if cli.tui_mode || env.tui_mode {
            OutputMode::Tui
        } else {
            OutputMode::Console { debug: cli.debug }
        };

        let command = match cli.command {
            Command::Build(args) => RunCommand::Build(BuildOptions {
                report: args.report,
                force: args.force,
                skip_tailwind: args.skip_tailwind,
                skip_vite: args.skip_vite,
            }),
            Command::Watch(args) => RunCommand::Watch(WatchOptions {
                combined: args.shopify || env.watch_combined,
                stores: store_sequence(&args.stores, env.shopify_store.as_deref())?,
                alive_window: args
                    .alive_window_secs
                    .map_or(DEFAULT_ALIVE_WINDOW, Duration::from_secs),
                debounce: DebounceConfig::default(),
            }),
            Command::Adapt(args) => RunCommand::Adapt(AdaptRequest {
                kind: args.kind,
                report: args.report,
                shopify: args.shopify,
                command: args.command,
            }),
        };

        Ok(Config {
            root,
            src_root,
            build_root,
            mode,
            debug: cli.debug,
            log_level: cli.log_level,
            jobs: cli.jobs.max(1),
            ready_flag: ReadyFlag::from_env_or_temp(env.ready_flag),
            command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cli(command: Command, jobs: usize, tui_mode: bool) -> Cli {
        Cli {
            command,
            root: PathBuf::from("/tmp/theme"),
            src: PathBuf::from("src"),
            out: PathBuf::from("Curalife-Theme-Build"),
            debug: false,
            tui_mode,
            log_level: None,
            jobs,
        }
    }

    fn watch(args: WatchArgs) -> Command {
        Command::Watch(args)
    }

    // ==================== Cli parsing tests ====================

    #[test]
    fn test_cli_parses_build_flags() {
        let cli = Cli::try_parse_from(["theme-build", "build", "--force", "--skip-vite"]).unwrap();
        match cli.command {
            Command::Build(args) => {
                assert!(args.force);
                assert!(args.skip_vite);
                assert!(!args.skip_tailwind);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.out, PathBuf::from("Curalife-Theme-Build"));
    }

    #[test]
    fn test_cli_parses_global_after_subcommand() {
        let cli =
            Cli::try_parse_from(["theme-build", "watch", "--shopify", "--tui-mode", "--debug"])
                .unwrap();
        assert!(cli.tui_mode);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_parses_adapt_trailing_command() {
        let cli =
            Cli::try_parse_from(["theme-build", "adapt", "build", "--", "make", "theme"]).unwrap();
        match cli.command {
            Command::Adapt(args) => {
                assert_eq!(args.kind, AdaptKind::Build);
                assert_eq!(args.command, vec!["make", "theme"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    // ==================== Config::from_parts tests ====================

    #[test]
    fn test_config_paths_under_root() {
        let cli = make_cli(Command::Build(BuildArgs::default()), 4, false);
        let config = Config::from_parts(cli, EnvOverrides::default()).unwrap();
        assert!(config.src_root.ends_with("src"));
        assert!(config.build_root.ends_with("Curalife-Theme-Build"));
        assert!(config.build_root.starts_with(&config.root));
        assert_eq!(config.jobs, 4);
        assert_eq!(config.mode, OutputMode::Console { debug: false });
    }

    #[test]
    fn test_config_absolute_out_kept() {
        let mut cli = make_cli(Command::Build(BuildArgs::default()), 4, false);
        cli.out = PathBuf::from("/var/out");
        let config = Config::from_parts(cli, EnvOverrides::default()).unwrap();
        assert_eq!(config.build_root, PathBuf::from("/var/out"));
    }

    #[test]
    fn test_config_jobs_minimum_one() {
        let cli = make_cli(Command::Build(BuildArgs::default()), 0, false);
        let config = Config::from_parts(cli, EnvOverrides::default()).unwrap();
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_tui_mode_from_env() {
        let cli = make_cli(Command::Build(BuildArgs::default()), 2, false);
        let env = EnvOverrides {
            tui_mode: true,
            ..Default::default()
        };
        let config = Config::from_parts(cli, env).unwrap();
        assert!(config.mode.is_tui());
    }

    #[test]
    fn test_watch_defaults() {
        let cli = make_cli(watch(WatchArgs::default()), 2, false);
        let config = Config::from_parts(cli, EnvOverrides::default()).unwrap();
        match config.command {
            RunCommand::Watch(opts) => {
                assert!(!opts.combined);
                assert_eq!(opts.stores, default_store_sequence());
                assert_eq!(opts.alive_window, DEFAULT_ALIVE_WINDOW);
                assert_eq!(opts.debounce, DebounceConfig::default());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_shopify_store_env_replaces_sequence() {
        let cli = make_cli(watch(WatchArgs::default()), 2, false);
        let env = EnvOverrides {
            shopify_store: Some("https://my-store.myshopify.com/".to_string()),
            watch_combined: true,
            ..Default::default()
        };
        let config = Config::from_parts(cli, env).unwrap();
        match config.command {
            RunCommand::Watch(opts) => {
                assert!(opts.combined);
                assert_eq!(opts.stores, vec![StoreDomain::new("my-store.myshopify.com")]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_store_flags_win_over_env() {
        let args = WatchArgs {
            shopify: true,
            stores: vec!["a.myshopify.com".to_string(), "b.myshopify.com".to_string()],
            alive_window_secs: Some(10),
        };
        let env = EnvOverrides {
            shopify_store: Some("env.myshopify.com".to_string()),
            ..Default::default()
        };
        let config = Config::from_parts(make_cli(watch(args), 2, false), env).unwrap();
        match config.command {
            RunCommand::Watch(opts) => {
                assert_eq!(opts.stores.len(), 2);
                assert_eq!(opts.stores[0].as_str(), "a.myshopify.com");
                assert_eq!(opts.alive_window, Duration::from_secs(10));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_store_rejected() {
        let args = WatchArgs {
            stores: vec!["not a store".to_string()],
            ..Default::default()
        };
        let result = Config::from_parts(make_cli(watch(args), 2, false), EnvOverrides::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_ready_flag_override() {
        let env = EnvOverrides {
            ready_flag: Some(PathBuf::from("/tmp/flag")),
            ..Default::default()
        };
        let config =
            Config::from_parts(make_cli(Command::Build(BuildArgs::default()), 2, false), env)
                .unwrap();
        assert_eq!(config.ready_flag.path(), Path::new("/tmp/flag"));
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(Some("true".to_string())));
        assert!(truthy(Some(" 1 ".to_string())));
        assert!(!truthy(Some("false".to_string())));
        assert!(!truthy(None));
    }
}
