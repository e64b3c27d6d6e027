//! # Theme Build
//!
//! Incremental build and watch pipeline for Shopify themes.
//!
//! Source files under `src/` are flattened into the five directories Shopify
//! accepts (`assets`, `layout`, `sections`, `snippets`, `blocks`). Tailwind and
//! Vite run as child processes; their output is relayed either as coloured
//! console lines or as `TUI_DATA:` JSON records for a dashboard.
//!
//! ## Features
//!
//! - Parallel copying with up-to-date checks using Rayon
//! - Debounced watch mode with Tailwind class-change detection
//! - Shopify `theme dev` with store fallback
//! - Asset integrity and code-splitting manifests
//! - Build history with regression warnings
//!
//! ## Usage
//!
//! ```ignore
//! use theme_build::classifier::resolve_destination;
//!
//! let dest = resolve_destination(&src_root, &build_root, &changed_file);
//! println!("{} → {}", changed_file.display(), dest.dir);
//! ```

/// Output adapters for external build commands
pub mod adapter;

/// Counters, metrics and build history
pub mod analytics;

/// Debounced change batching
pub mod batcher;

/// One-shot production build
pub mod builder;

/// Tailwind class fingerprints
pub mod classes;

/// Source path → theme directory routing
pub mod classifier;

/// CLI configuration and argument parsing
pub mod config;

/// File copying operations
pub mod copier;

/// Error types
pub mod error;

/// Diagnostic logging setup
pub mod logging;

/// Asset integrity manifest
pub mod manifest;

/// Child process supervision
pub mod process;

/// Console and TUI output
pub mod report;

/// Tailwind readiness flag
pub mod sentinel;

/// Code-splitting analysis
pub mod splitting;

/// Theme directories and store domains
pub mod theme;

/// Watch mode
pub mod watch;
