//! Watch-session statistics and the watch output adapter.

use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use super::patterns;
use super::AdapterOutput;
use crate::process::strip_ansi;
use crate::report::{ChangeRecord, Tone, TuiEvent, WatchStatus};

/// Recent change entries kept for `watch_status`
pub const RECENT_LIMIT: usize = 10;

/// Running counters behind `watch_status` records
#[derive(Debug)]
pub struct WatchStats {
    started: Instant,
    mode: &'static str,
    is_active: bool,
    change_count: u64,
    last_change: String,
    recent: VecDeque<ChangeRecord>,
    unique: BTreeSet<String>,
    shopify_url: String,
    preview_url: String,
    cache_hits: u64,
    time_saved: u64,
    tailwind_runs: u64,
}

impl WatchStats {
    /// `mode` is `standard` or `shopify`
    pub fn new(mode: &'static str) -> Self {
        Self {
            started: Instant::now(),
            mode,
            is_active: false,
            change_count: 0,
            last_change: String::new(),
            recent: VecDeque::with_capacity(RECENT_LIMIT + 1),
            unique: BTreeSet::new(),
            shopify_url: String::new(),
            preview_url: String::new(),
            cache_hits: 0,
            time_saved: 0,
            tailwind_runs: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    pub fn last_change(&self) -> &str {
        &self.last_change
    }

    /// Record one change event touching `files` (file names, no directories)
    pub fn record_change(&mut self, files: Vec<String>) {
        self.change_count += 1;
        self.last_change = match files.len() {
            0 => "Files updated".to_string(),
            1 => files[0].clone(),
            n => format!("{n} files"),
        };
        if files.is_empty() {
            return;
        }
        self.unique.extend(files.iter().cloned());
        self.recent.push_back(ChangeRecord {
            count: files.len(),
            files,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        while self.recent.len() > RECENT_LIMIT {
            self.recent.pop_front();
        }
    }

    /// Returns true when the URL is new
    pub fn set_local_url(&mut self, url: &str) -> bool {
        if self.shopify_url == url {
            return false;
        }
        self.shopify_url = url.to_string();
        true
    }

    pub fn set_preview_url(&mut self, url: &str) -> bool {
        if self.preview_url == url {
            return false;
        }
        self.preview_url = url.to_string();
        true
    }

    pub fn shopify_url(&self) -> &str {
        &self.shopify_url
    }

    pub fn preview_url(&self) -> &str {
        &self.preview_url
    }

    pub fn set_cache_hits(&mut self, hits: u64) {
        self.cache_hits = hits;
    }

    pub fn add_time_saved(&mut self, ms: u64) {
        self.time_saved += ms;
    }

    pub fn set_tailwind_runs(&mut self, runs: u64) {
        self.tailwind_runs = runs;
    }

    pub fn snapshot(&self) -> WatchStatus {
        WatchStatus {
            is_active: self.is_active,
            mode: self.mode.to_string(),
            uptime: self.started.elapsed().as_millis() as u64,
            change_count: self.change_count,
            last_change: self.last_change.clone(),
            recent_changes: self.recent.iter().cloned().collect(),
            unique_files_changed: self.unique.iter().cloned().collect(),
            total_files_changed: self.unique.len(),
            shopify_url: self.shopify_url.clone(),
            preview_url: self.preview_url.clone(),
            cache_hits: self.cache_hits,
            time_saved: self.time_saved,
            tailwind_runs: self.tailwind_runs,
        }
    }
}

/// File names mentioned in a change line, directories stripped, deduplicated
pub fn extract_file_names(line: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in patterns::file_name().captures_iter(line) {
        let Some(m) = cap.get(1) else { continue };
        if m.as_str().contains("://") {
            continue;
        }
        let name = m
            .as_str()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Incremental parser for watch output
pub struct WatchAdapter {
    tui: bool,
    stats: WatchStats,
}

impl WatchAdapter {
    pub fn new(tui: bool, shopify: bool) -> Self {
        Self {
            tui,
            stats: WatchStats::new(if shopify { "shopify" } else { "standard" }),
        }
    }

    pub fn stats(&self) -> &WatchStats {
        &self.stats
    }

    fn status_event(&self) -> AdapterOutput {
        AdapterOutput::Event(TuiEvent::WatchStatus(self.stats.snapshot()))
    }

    fn note(&self, out: &mut Vec<AdapterOutput>, tone: Tone, level: &str, message: String) {
        if self.tui {
            out.push(AdapterOutput::Event(TuiEvent::log(level, message, "watch")));
        } else {
            out.push(AdapterOutput::Clean { tone, message });
        }
    }

    /// Child process came up
    pub fn start(&mut self) -> Vec<AdapterOutput> {
        self.stats.set_active(true);
        let mut out = Vec::new();
        if self.tui {
            out.push(self.status_event());
        }
        self.note(
            &mut out,
            Tone::Success,
            "info",
            "Watch process started successfully".to_string(),
        );
        out
    }

    pub fn handle_line(&mut self, raw: &str) -> Vec<AdapterOutput> {
        let line = strip_ansi(raw);
        let line = line.as_ref();
        let mut out = Vec::new();
        let mut changed = false;

        for m in patterns::url().find_iter(line) {
            let url = patterns::clean_url(m.as_str());
            if url.contains("127.0.0.1") || url.contains("localhost") {
                if self.stats.set_local_url(url) {
                    changed = true;
                    self.note(
                        &mut out,
                        Tone::Success,
                        "info",
                        format!("Local development server: {url}"),
                    );
                }
            } else if url.contains("myshopify.com")
                && url.contains("preview_theme_id")
                && self.stats.set_preview_url(url)
            {
                changed = true;
                self.note(
                    &mut out,
                    Tone::Success,
                    "info",
                    format!("Store preview: {url}"),
                );
            }
        }

        if !self.stats.is_active() && patterns::watch_active().is_match(line) {
            self.stats.set_active(true);
            changed = true;
            self.note(
                &mut out,
                Tone::Success,
                "success",
                "File watching active".to_string(),
            );
        }

        if !patterns::status_line().is_match(line) && patterns::change_line().is_match(line) {
            let files = extract_file_names(line);
            let message = match files.len() {
                0 => "Files updated".to_string(),
                1 => format!("File updated: {}", files[0]),
                _ => format!("Multiple files updated: {}", files.join(", ")),
            };
            self.stats.record_change(files);
            changed = true;
            self.note(&mut out, Tone::File, "success", message);
        }

        if let Some(hits) = patterns::capture_number(patterns::cache_hits(), line) {
            self.stats.set_cache_hits(hits);
            changed = true;
        }
        if let Some(ms) = patterns::capture_number(patterns::time_saved(), line) {
            self.stats.add_time_saved(ms);
            changed = true;
        }

        if patterns::server_ready().is_match(line) {
            self.note(
                &mut out,
                Tone::Success,
                "success",
                "Shopify development server ready".to_string(),
            );
        }

        if self.tui {
            if changed {
                out.push(self.status_event());
            }
            if patterns::is_significant(line) {
                out.push(AdapterOutput::Event(TuiEvent::log(
                    patterns::log_level(line),
                    line.trim(),
                    "watch",
                )));
            }
        }
        out
    }

    /// Child exited
    pub fn finish(&mut self, code: Option<i32>) -> Vec<AdapterOutput> {
        self.stats.set_active(false);
        let mut out = Vec::new();
        if self.tui {
            out.push(self.status_event());
        }
        match code {
            Some(0) => self.note(
                &mut out,
                Tone::Info,
                "info",
                "Watch process ended normally".to_string(),
            ),
            None => self.note(&mut out, Tone::Info, "info", "Watch process stopped".to_string()),
            Some(c) => self.note(
                &mut out,
                Tone::Error,
                "error",
                format!("Watch process ended with code {c}"),
            ),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(outputs: &[AdapterOutput]) -> Option<WatchStatus> {
        outputs.iter().rev().find_map(|o| match o {
            AdapterOutput::Event(TuiEvent::WatchStatus(s)) => Some(s.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_detects_local_and_preview_urls() {
        let mut adapter = WatchAdapter::new(true, true);
        adapter.handle_line("│ Local: http://127.0.0.1:9293 │");
        adapter.handle_line(
            "Preview: https://curalife-commerce.myshopify.com/?preview_theme_id=12345.",
        );
        let snap = adapter.stats().snapshot();
        assert_eq!(snap.shopify_url, "http://127.0.0.1:9293");
        assert_eq!(
            snap.preview_url,
            "https://curalife-commerce.myshopify.com/?preview_theme_id=12345"
        );
        assert_eq!(snap.mode, "shopify");
    }

    #[test]
    fn test_storefront_url_without_preview_id_ignored() {
        let mut adapter = WatchAdapter::new(false, true);
        adapter.handle_line("Visit https://curalife-commerce.myshopify.com/admin");
        assert_eq!(adapter.stats().preview_url(), "");
    }

    #[test]
    fn test_clean_url_reported_once() {
        let mut adapter = WatchAdapter::new(false, true);
        let first = adapter.handle_line("http://localhost:9293");
        let second = adapter.handle_line("http://localhost:9293");
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_change_lines_counted() {
        let mut adapter = WatchAdapter::new(true, false);
        let outputs = adapter.handle_line("hero.liquid → copied to sections");
        let status = status_of(&outputs).unwrap();
        assert_eq!(status.change_count, 1);
        assert_eq!(status.last_change, "hero.liquid");
        assert_eq!(status.unique_files_changed, vec!["hero.liquid"]);

        adapter.handle_line("File changed: src/styles/css/foo.css");
        adapter.handle_line("File changed: src/liquid/sections/hero.liquid");
        let snap = adapter.stats().snapshot();
        assert_eq!(snap.change_count, 3);
        assert_eq!(snap.total_files_changed, 2);
    }

    #[test]
    fn test_status_lines_are_not_changes() {
        let mut adapter = WatchAdapter::new(false, false);
        adapter.handle_line("Watching for changes in src/ (updated config)");
        assert_eq!(adapter.stats().change_count(), 0);
        assert!(adapter.stats().is_active());
    }

    #[test]
    fn test_recent_changes_capped() {
        let mut stats = WatchStats::new("standard");
        for i in 0..15 {
            stats.record_change(vec![format!("file{i}.liquid")]);
        }
        let snap = stats.snapshot();
        assert_eq!(snap.recent_changes.len(), RECENT_LIMIT);
        assert_eq!(snap.recent_changes[0].files, vec!["file5.liquid"]);
        assert_eq!(snap.total_files_changed, 15);
    }

    #[test]
    fn test_multi_file_change() {
        let mut stats = WatchStats::new("standard");
        stats.record_change(vec!["a.css".to_string(), "b.js".to_string()]);
        assert_eq!(stats.last_change(), "2 files");
        stats.record_change(vec![]);
        assert_eq!(stats.last_change(), "Files updated");
        assert_eq!(stats.snapshot().recent_changes.len(), 1);
    }

    #[test]
    fn test_cache_hits_and_time_saved() {
        let mut adapter = WatchAdapter::new(true, false);
        adapter.handle_line("42 cache hits");
        adapter.handle_line("120ms saved");
        adapter.handle_line("80ms saved");
        let snap = adapter.stats().snapshot();
        assert_eq!(snap.cache_hits, 42);
        assert_eq!(snap.time_saved, 200);
    }

    #[test]
    fn test_extract_file_names() {
        assert_eq!(
            extract_file_names("copied src/a/b/hero.liquid and C:\\x\\icon.svg"),
            vec!["hero.liquid", "icon.svg"]
        );
        assert!(extract_file_names("no files here").is_empty());
    }

    #[test]
    fn test_finish_codes() {
        let mut adapter = WatchAdapter::new(false, false);
        let out = adapter.finish(Some(1));
        assert!(matches!(
            &out[0],
            AdapterOutput::Clean { tone: Tone::Error, .. }
        ));
        assert!(!adapter.stats().is_active());
    }
}
