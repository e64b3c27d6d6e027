//! Watch mode.
//!
//! File-system events from `notify` are debounced by a [`ChangeBatcher`];
//! each flushed batch is copied or deleted in the build tree and checked for
//! Tailwind class changes. At most one Tailwind rebuild is requested per
//! batch. Style batches wait for the Tailwind readiness flag before they are
//! applied so stylesheets do not race a running Tailwind pass.
//!
//! Combined mode additionally runs `shopify theme dev` against the store
//! sequence, falling back store by store and degrading to watch-only when
//! none connects.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::adapter::patterns;
use crate::adapter::watch::WatchStats;
use crate::analytics::{format_millis, BuildStats};
use crate::batcher::{Batch, ChangeBatcher, ChangeKind, DebounceConfig};
use crate::classes::{is_style_related, ClassCache, ClassCheck, RebuildReason};
use crate::classifier::{relative_source_path, resolve_destination, Destination};
use crate::config::{Config, WatchOptions};
use crate::copier::{collect_source_files, copy_tree, delete_file, is_ignored_source, DirCache};
use crate::error::BuildError;
use crate::process::shopify::{
    connect_with_fallback, FallbackPolicy, ShopifyCli, TROUBLESHOOTING,
};
use crate::process::tailwind::{run_tailwind, TailwindJob, TailwindWorker};
use crate::process::{
    sleep_unless_shutdown, vite, ChildRegistry, LineSink, OutputLine, RunningProcess,
};
use crate::report::{Reporter, TuiEvent};
use crate::sentinel::{ReadyFlag, DEFAULT_WAIT, POLL_INTERVAL};

/// Longest the loop blocks on the event channel while idle
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Pause before the Shopify CLI starts in combined mode
const SHOPIFY_START_DELAY: Duration = Duration::from_secs(2);

/// Receives Tailwind rebuild requests from the watch session
pub trait StyleRebuilder {
    fn request_rebuild(&self);
}

impl StyleRebuilder for TailwindWorker {
    fn request_rebuild(&self) {
        self.request();
    }
}

/// What a flushed batch did to the build tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    pub copied: Vec<Destination>,
    pub deleted: Vec<Destination>,
    pub failed: usize,
    /// Set when a rebuild was requested for this batch
    pub rebuild: Option<RebuildReason>,
    /// `Some(false)` when a style batch gave up waiting for Tailwind
    pub styles_ready: Option<bool>,
}

impl FlushOutcome {
    /// File names touched by the batch
    pub fn file_names(&self) -> Vec<String> {
        self.copied
            .iter()
            .chain(&self.deleted)
            .filter_map(|d| d.path.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.copied.is_empty() && self.deleted.is_empty() && self.failed == 0
    }
}

/// Session state: caches, the batcher and the rebuild target.
///
/// Owned by the watch loop; nothing here is shared across threads.
pub struct WatchSession<R: StyleRebuilder> {
    src_root: PathBuf,
    build_root: PathBuf,
    classes: ClassCache,
    dirs: DirCache,
    batcher: ChangeBatcher,
    flag: ReadyFlag,
    style_wait: Duration,
    rebuilder: R,
    stats: Arc<BuildStats>,
}

impl<R: StyleRebuilder> WatchSession<R> {
    pub fn new(
        src_root: &Path,
        build_root: &Path,
        flag: ReadyFlag,
        debounce: DebounceConfig,
        rebuilder: R,
        stats: Arc<BuildStats>,
    ) -> Self {
        Self {
            src_root: src_root.to_path_buf(),
            build_root: build_root.to_path_buf(),
            classes: ClassCache::new(),
            dirs: DirCache::new(),
            batcher: ChangeBatcher::new(debounce),
            flag,
            style_wait: DEFAULT_WAIT,
            rebuilder,
            stats,
        }
    }

    /// Bound on the readiness wait before a style batch
    pub fn with_style_wait(mut self, wait: Duration) -> Self {
        self.style_wait = wait;
        self
    }

    pub fn rebuilder(&self) -> &R {
        &self.rebuilder
    }

    pub fn classes(&self) -> &ClassCache {
        &self.classes
    }

    /// Fingerprint every source file before events start flowing
    pub fn prime(&mut self) -> usize {
        self.classes
            .prime(collect_source_files(&self.src_root, &self.build_root));
        self.classes.len()
    }

    fn relative(&self, path: &Path) -> String {
        relative_source_path(&self.src_root, path)
    }

    /// Record one path change. Ignored paths return false.
    pub fn record(&mut self, path: &Path, kind: ChangeKind, now: Instant) -> bool {
        if is_ignored_source(&self.src_root, &self.build_root, path) {
            return false;
        }
        if kind == ChangeKind::Upsert && path.is_dir() {
            return false;
        }
        let relative = self.relative(path);
        let style = is_style_related(path, &relative);
        tracing::trace!(path = %relative, ?kind, style, "change recorded");
        self.batcher.record(path, kind, style, now);
        true
    }

    /// Feed a raw watcher event. Returns how many paths were recorded.
    pub fn handle_event(&mut self, event: &notify::Event, now: Instant) -> usize {
        let kind = match event.kind {
            EventKind::Create(_) => Some(ChangeKind::Upsert),
            EventKind::Remove(_) => Some(ChangeKind::Remove),
            // mtime/chmod noise
            EventKind::Modify(ModifyKind::Metadata(_)) => return 0,
            // Renames: decide per path by whether it still exists
            EventKind::Modify(ModifyKind::Name(_)) => None,
            EventKind::Modify(_) => Some(ChangeKind::Upsert),
            _ => return 0,
        };
        event
            .paths
            .iter()
            .filter(|path| {
                let kind = kind.unwrap_or(if path.exists() {
                    ChangeKind::Upsert
                } else {
                    ChangeKind::Remove
                });
                self.record(path, kind, now)
            })
            .count()
    }

    pub fn time_until_flush(&self, now: Instant) -> Option<Duration> {
        self.batcher.time_until_flush(now)
    }

    pub fn pending(&self) -> usize {
        self.batcher.pending_len()
    }

    /// Flush the batch if its deadline passed
    pub fn poll(&mut self, now: Instant, shutdown: &AtomicBool) -> Option<FlushOutcome> {
        let batch = self.batcher.take_if_due(now)?;
        Some(self.flush(batch, shutdown))
    }

    /// Apply copies, then deletes, then request at most one rebuild
    pub fn flush(&mut self, batch: Batch, shutdown: &AtomicBool) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();

        if batch.style_related {
            let ready = self.flag.wait(self.style_wait, POLL_INTERVAL, shutdown);
            if !ready {
                tracing::warn!(
                    "Tailwind did not signal ready within {}, applying changes anyway",
                    format_millis(self.style_wait.as_millis() as u64)
                );
            }
            outcome.styles_ready = Some(ready);
        }

        let mut rebuild: Option<RebuildReason> = None;
        let mut note = |check: ClassCheck| {
            if let ClassCheck::Rebuild(reason) = check {
                rebuild.get_or_insert(reason);
            }
        };

        for src in &batch.copies {
            let relative = relative_source_path(&self.src_root, src);
            let dest = resolve_destination(&self.src_root, &self.build_root, src);
            // Deleted again before the flush: treat as a delete
            if !src.exists() {
                self.delete_one(src, dest, &mut outcome, &mut note);
                continue;
            }
            match self.dirs.copy(src, &dest.path) {
                Ok(bytes) => {
                    self.stats.record_copy(bytes);
                    tracing::debug!(
                        src = %relative,
                        dst = %dest.path.display(),
                        rule = ?dest.rule,
                        "copied"
                    );
                    note(self.classes.check_file(src, &relative));
                    outcome.copied.push(dest);
                }
                Err(e) => {
                    self.stats.record_error();
                    tracing::warn!("{e}");
                    outcome.failed += 1;
                }
            }
        }

        for src in &batch.deletes {
            let dest = resolve_destination(&self.src_root, &self.build_root, src);
            self.delete_one(src, dest, &mut outcome, &mut note);
        }

        if let Some(reason) = rebuild {
            tracing::debug!(reason = reason.describe(), "requesting Tailwind rebuild");
            self.rebuilder.request_rebuild();
            outcome.rebuild = Some(reason);
        }
        outcome
    }

    fn delete_one<F: FnMut(ClassCheck)>(
        &mut self,
        src: &Path,
        dest: Destination,
        outcome: &mut FlushOutcome,
        note: &mut F,
    ) {
        note(self.classes.forget(src));
        match delete_file(&dest.path) {
            Ok(true) => outcome.deleted.push(dest),
            Ok(false) => tracing::debug!(path = %dest.path.display(), "nothing to delete"),
            Err(e) => {
                self.stats.record_error();
                tracing::warn!("{e}");
                outcome.failed += 1;
            }
        }
    }
}

/// Forwards Shopify CLI output and picks up preview URLs for the status
struct ShopifySink {
    reporter: Arc<Reporter>,
    status: Arc<Mutex<WatchStats>>,
}

impl LineSink for ShopifySink {
    fn line(&self, line: OutputLine) {
        let mut changed = false;
        {
            let mut status = self.status.lock();
            for m in patterns::url().find_iter(&line.text) {
                let url = patterns::clean_url(m.as_str());
                if url.contains("127.0.0.1") || url.contains("localhost") {
                    changed |= status.set_local_url(url);
                } else if url.contains("myshopify.com") && url.contains("preview_theme_id") {
                    changed |= status.set_preview_url(url);
                }
            }
        }
        self.reporter.line(line);
        if changed {
            let snapshot = self.status.lock().snapshot();
            self.reporter.emit(&TuiEvent::WatchStatus(snapshot));
        }
    }
}

fn print_banner(reporter: &Reporter, config: &Config, opts: &WatchOptions) {
    reporter.plain("");
    reporter.plain("  Theme watch");
    reporter.plain(format!("  Source: {}", config.src_root.display()));
    reporter.plain(format!("  Build:  {}", config.build_root.display()));
    if opts.combined {
        let stores: Vec<&str> = opts.stores.iter().map(|s| s.as_str()).collect();
        reporter.plain(format!("  Stores: {}", stores.join(" → ")));
    }
    reporter.plain("");
}

/// Start `theme dev` on a background thread so watching begins immediately
fn start_shopify(
    config: &Config,
    opts: &WatchOptions,
    reporter: Arc<Reporter>,
    status: Arc<Mutex<WatchStats>>,
    registry: Arc<ChildRegistry>,
    shutdown: Arc<AtomicBool>,
) -> Option<JoinHandle<Option<RunningProcess>>> {
    let stores = opts.stores.clone();
    let build_root = config.build_root.clone();
    let alive_window = opts.alive_window;

    thread::Builder::new()
        .name("shopify-connect".to_string())
        .spawn(move || {
            if !sleep_unless_shutdown(SHOPIFY_START_DELAY, &shutdown) {
                return None;
            }
            let sink: Arc<dyn LineSink> = Arc::new(ShopifySink {
                reporter: reporter.clone(),
                status,
            });
            let mut cli = ShopifyCli {
                build_root,
                alive_window,
                registry,
                sink: sink.clone(),
                shutdown: shutdown.clone(),
            };
            match connect_with_fallback(
                &mut cli,
                &stores,
                FallbackPolicy::default(),
                sink.as_ref(),
                &shutdown,
            ) {
                Ok(connected) => {
                    reporter.success(format!(
                        "Shopify theme dev running against {}",
                        connected.store
                    ));
                    Some(connected.session)
                }
                Err(BuildError::Cancelled) => None,
                Err(e) => {
                    reporter.error(format!("Shopify CLI failed: {e}"));
                    reporter.warn("Troubleshooting:");
                    for hint in TROUBLESHOOTING {
                        reporter.warn(format!("  - {hint}"));
                    }
                    reporter.info("Continuing in watch-only mode");
                    None
                }
            }
        })
        .map_err(|e| tracing::error!("failed to start Shopify thread: {e}"))
        .ok()
}

fn report_flush(
    reporter: &Reporter,
    outcome: &FlushOutcome,
    status: &Mutex<WatchStats>,
    stats: &BuildStats,
) {
    for dest in &outcome.copied {
        if let Some(name) = dest.path.file_name() {
            reporter.file(format!("{} → {}", name.to_string_lossy(), dest.dir));
        }
    }
    for dest in &outcome.deleted {
        if let Some(name) = dest.path.file_name() {
            reporter.file(format!("{} removed from {}", name.to_string_lossy(), dest.dir));
        }
    }
    if outcome.styles_ready == Some(false) {
        reporter.warn("Tailwind not ready in time; applied style changes anyway");
    }
    if let Some(reason) = outcome.rebuild {
        reporter.info(format!("Rebuilding Tailwind CSS ({})", reason.describe()));
    }
    if outcome.failed > 0 {
        reporter.error(format!("{} file(s) failed to sync", outcome.failed));
    }

    let snapshot = {
        let mut status = status.lock();
        status.record_change(outcome.file_names());
        let counters = stats.snapshot();
        status.set_cache_hits(counters.cache_hits);
        status.set_tailwind_runs(counters.tailwind_runs);
        status.snapshot()
    };
    reporter.emit(&TuiEvent::WatchStatus(snapshot));
}

/// Run watch mode until shutdown.
///
/// Always ends with `Cancelled` after a Ctrl+C; children are killed and the
/// readiness flag removed on the way out.
pub fn run_watch(
    config: &Config,
    opts: &WatchOptions,
    reporter: Arc<Reporter>,
    registry: Arc<ChildRegistry>,
    shutdown: Arc<AtomicBool>,
) -> Result<(), BuildError> {
    let result = watch_loop(config, opts, reporter.clone(), registry.clone(), shutdown.clone());

    registry.kill_all();
    config.ready_flag.remove();
    reporter.info("Watch stopped");

    match result {
        Err(e) => Err(e),
        Ok(()) if shutdown.load(Ordering::Relaxed) => Err(BuildError::Cancelled),
        Ok(()) => Ok(()),
    }
}

fn watch_loop(
    config: &Config,
    opts: &WatchOptions,
    reporter: Arc<Reporter>,
    registry: Arc<ChildRegistry>,
    shutdown: Arc<AtomicBool>,
) -> Result<(), BuildError> {
    let stats = Arc::new(BuildStats::new());
    let status = Arc::new(Mutex::new(WatchStats::new(if opts.combined {
        "shopify"
    } else {
        "standard"
    })));
    let sink: Arc<dyn LineSink> = reporter.clone();

    print_banner(&reporter, config, opts);

    // Start watching before the initial copy so no edits fall into the gap
    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&config.src_root, RecursiveMode::Recursive)?;

    reporter.info("Copying source files...");
    let started = Instant::now();
    let copied = copy_tree(&config.src_root, &config.build_root, &shutdown, &stats, false, || {})?;
    reporter.success(format!(
        "Initial sync: {} copied, {} up to date in {}",
        copied.copied,
        copied.skipped,
        format_millis(started.elapsed().as_millis() as u64)
    ));

    let job = TailwindJob::new(
        &config.root,
        &config.src_root,
        &config.build_root,
        config.ready_flag.clone(),
    );
    stats.record_tailwind_run();
    match run_tailwind(&job, &registry, sink.clone(), &shutdown) {
        Ok(_) => {}
        Err(BuildError::Cancelled) => return Ok(()),
        Err(e) => reporter.error(format!("Initial Tailwind build failed: {e}")),
    }

    let worker = TailwindWorker::spawn(
        job,
        registry.clone(),
        sink.clone(),
        stats.clone(),
        shutdown.clone(),
    );
    let mut session = WatchSession::new(
        &config.src_root,
        &config.build_root,
        config.ready_flag.clone(),
        opts.debounce,
        worker,
        stats.clone(),
    );
    let primed = session.prime();
    reporter.debug(format!("Tailwind class cache primed with {primed} files"));

    let shopify = if opts.combined {
        start_shopify(
            config,
            opts,
            reporter.clone(),
            status.clone(),
            registry.clone(),
            shutdown.clone(),
        )
    } else {
        None
    };

    if vite::find_config(&config.root).is_some() {
        if let Err(e) = vite::spawn_watch(&config.root, config.debug, &registry, sink.clone()) {
            reporter.warn(format!("Vite watch not started: {e}"));
        }
    }

    {
        let mut status = status.lock();
        status.set_active(true);
        reporter.emit(&TuiEvent::WatchStatus(status.snapshot()));
    }
    reporter.watch(format!(
        "Watching {} for changes (Ctrl+C to stop)",
        config.src_root.display()
    ));

    while !shutdown.load(Ordering::Relaxed) {
        let timeout = session
            .time_until_flush(Instant::now())
            .map_or(IDLE_POLL, |d| d.min(IDLE_POLL));
        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                session.handle_event(&event, Instant::now());
            }
            Ok(Err(e)) => tracing::warn!("watcher error: {e}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                reporter.error("File watcher stopped unexpectedly");
                break;
            }
        }
        if let Some(outcome) = session.poll(Instant::now(), &shutdown) {
            if !outcome.is_empty() {
                report_flush(&reporter, &outcome, &status, &stats);
            }
        }
    }

    status.lock().set_active(false);
    drop(watcher);
    let WatchSession { rebuilder, .. } = session;
    rebuilder.stop();
    if let Some(handle) = shopify {
        let _ = handle.join();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    use crate::theme::ThemeDir;

    #[derive(Default)]
    struct Counting(Cell<usize>);

    impl StyleRebuilder for Counting {
        fn request_rebuild(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct Fixture {
        _tmp: TempDir,
        src: PathBuf,
        build: PathBuf,
        flag: ReadyFlag,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let build = tmp.path().join("build");
        fs::create_dir_all(&src).unwrap();
        let flag = ReadyFlag::new(tmp.path().join(".ready"));
        flag.signal().unwrap();
        Fixture {
            _tmp: tmp,
            src,
            build,
            flag,
        }
    }

    fn session(f: &Fixture) -> WatchSession<Counting> {
        WatchSession::new(
            &f.src,
            &f.build,
            f.flag.clone(),
            DebounceConfig::default(),
            Counting::default(),
            Arc::new(BuildStats::new()),
        )
        .with_style_wait(Duration::from_millis(50))
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn event(kind: EventKind, path: &Path) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![path.to_path_buf()],
            attrs: Default::default(),
        }
    }

    fn modify() -> EventKind {
        EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Any))
    }

    // ==================== event mapping ====================

    #[test]
    fn test_ignored_events() {
        let f = fixture();
        let mut s = session(&f);
        let now = Instant::now();
        write(&f.src.join(".hidden"), "x");
        assert_eq!(s.handle_event(&event(modify(), &f.src.join(".hidden")), now), 0);
        assert_eq!(s.handle_event(&event(modify(), &f.src.join("a.liquid.swp")), now), 0);
        let meta = EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Any));
        write(&f.src.join("a.liquid"), "x");
        assert_eq!(s.handle_event(&event(meta, &f.src.join("a.liquid")), now), 0);
        fs::create_dir_all(f.src.join("dir")).unwrap();
        assert_eq!(
            s.handle_event(
                &event(EventKind::Create(notify::event::CreateKind::Folder), &f.src.join("dir")),
                now
            ),
            0
        );
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_rename_decided_by_existence() {
        let f = fixture();
        let mut s = session(&f);
        let now = Instant::now();
        let kept = f.src.join("liquid/snippets/new.liquid");
        write(&kept, "x");
        let rename = EventKind::Modify(ModifyKind::Name(notify::event::RenameMode::Both));
        let ev = notify::Event {
            kind: rename,
            paths: vec![f.src.join("liquid/snippets/old.liquid"), kept.clone()],
            attrs: Default::default(),
        };
        assert_eq!(s.handle_event(&ev, now), 2);
        let batch = s.batcher.take();
        assert_eq!(batch.copies, vec![kept]);
        assert_eq!(batch.deletes.len(), 1);
    }

    // ==================== flushing ====================

    #[test]
    fn test_copy_and_delete_in_one_batch() {
        let f = fixture();
        let mut s = session(&f);
        let hero = f.src.join("liquid/sections/hero.liquid");
        let old = f.src.join("liquid/snippets/old.liquid");
        write(&hero, "<div></div>");
        write(&f.build.join("snippets/old.liquid"), "stale");

        let now = Instant::now();
        s.record(&hero, ChangeKind::Upsert, now);
        s.record(&old, ChangeKind::Remove, now);
        assert!(s.poll(now, &AtomicBool::new(false)).is_none());

        let outcome = s
            .poll(now + Duration::from_millis(150), &AtomicBool::new(false))
            .unwrap();
        assert_eq!(outcome.copied.len(), 1);
        assert_eq!(outcome.copied[0].dir, ThemeDir::Sections);
        assert_eq!(outcome.deleted.len(), 1);
        assert!(f.build.join("sections/hero.liquid").is_file());
        assert!(!f.build.join("snippets/old.liquid").exists());
        assert_eq!(outcome.rebuild, None);
        assert_eq!(outcome.styles_ready, None);
        assert_eq!(s.rebuilder().0.get(), 0);
    }

    #[test]
    fn test_class_change_requests_one_rebuild() {
        let f = fixture();
        let a = f.src.join("liquid/sections/a.liquid");
        let b = f.src.join("liquid/sections/b.liquid");
        write(&a, "<div class=\"p-4\"></div>");
        write(&b, "<div class=\"m-2\"></div>");
        let mut s = session(&f);
        s.prime();

        // Unchanged content: no rebuild
        let now = Instant::now();
        s.record(&a, ChangeKind::Upsert, now);
        let outcome = s.poll(now + Duration::from_secs(1), &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.rebuild, None);

        // Two files gain classes in one batch: one request
        write(&a, "<div class=\"p-4 flex\"></div>");
        write(&b, "<div class=\"m-2 grid\"></div>");
        s.record(&a, ChangeKind::Upsert, now);
        s.record(&b, ChangeKind::Upsert, now);
        let outcome = s.poll(now + Duration::from_secs(1), &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.rebuild, Some(RebuildReason::ClassesChanged));
        assert_eq!(s.rebuilder().0.get(), 1);
        assert_eq!(s.classes().get(&a), Some("flex,p-4"));
    }

    #[test]
    fn test_style_batch_waits_for_flag() {
        let f = fixture();
        let mut s = session(&f);
        let css = f.src.join("styles/css/foo.css");
        write(&css, ".foo{}");
        f.flag.clear().unwrap();

        let now = Instant::now();
        s.record(&css, ChangeKind::Upsert, now);
        // Quick delay is not enough once a style file is pending
        assert!(s.poll(now + Duration::from_millis(150), &AtomicBool::new(false)).is_none());
        let outcome = s
            .poll(now + Duration::from_millis(600), &AtomicBool::new(false))
            .unwrap();
        assert_eq!(outcome.styles_ready, Some(false));
        assert!(f.build.join("assets/foo.css").is_file());
        assert_eq!(outcome.rebuild, Some(RebuildReason::Stylesheet));
    }

    #[test]
    fn test_vanished_source_becomes_delete() {
        let f = fixture();
        let mut s = session(&f);
        let gone = f.src.join("images/logo.png");
        write(&f.build.join("assets/logo.png"), "png");
        let now = Instant::now();
        s.record(&gone, ChangeKind::Upsert, now);
        let outcome = s.poll(now + Duration::from_secs(1), &AtomicBool::new(false)).unwrap();
        assert!(outcome.copied.is_empty());
        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.file_names(), vec!["logo.png"]);
    }

    #[test]
    fn test_stylesheet_delete_requests_rebuild() {
        let f = fixture();
        let mut s = session(&f);
        let css = f.src.join("styles/old.css");
        write(&f.build.join("assets/old.css"), "x");
        let now = Instant::now();
        s.record(&css, ChangeKind::Remove, now);
        let outcome = s.poll(now + Duration::from_secs(1), &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.rebuild, Some(RebuildReason::Stylesheet));
        assert_eq!(outcome.styles_ready, Some(true));
        assert_eq!(s.rebuilder().0.get(), 1);
    }

    #[test]
    fn test_image_delete_under_style_folder_skips_rebuild() {
        let f = fixture();
        let mut s = session(&f);
        let sprite = f.src.join("styles/css-sprite.png");
        write(&f.build.join("assets/css-sprite.png"), "png");
        let now = Instant::now();
        s.record(&sprite, ChangeKind::Remove, now);
        let outcome = s.poll(now + Duration::from_secs(1), &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.deleted.len(), 1);
        assert!(!f.build.join("assets/css-sprite.png").exists());
        assert_eq!(outcome.rebuild, None);
        assert_eq!(s.rebuilder().0.get(), 0);
    }

    #[test]
    fn test_shopify_sink_tracks_urls() {
        use crate::process::{LineLevel, Stream};
        use crate::report::tests::capture;
        use crate::report::OutputMode;

        let (reporter, buf) = capture(OutputMode::Tui, "watch");
        let status = Arc::new(Mutex::new(WatchStats::new("shopify")));
        let sink = ShopifySink {
            reporter: Arc::new(reporter),
            status: status.clone(),
        };
        sink.line(OutputLine {
            label: Arc::from("SHOPIFY"),
            text: "Preview your theme: http://127.0.0.1:9293".to_string(),
            level: LineLevel::Info,
            stream: Stream::Stdout,
        });
        assert_eq!(status.lock().shopify_url(), "http://127.0.0.1:9293");
        let records = buf.records();
        assert!(records.iter().any(|r| r["type"] == "log" && r["source"] == "shopify"));
        assert!(records.iter().any(|r| r["type"] == "watch_status"));
    }
}
