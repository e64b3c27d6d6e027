//! Code-splitting analysis of theme sources.
//!
//! Scans scripts, Liquid templates and stylesheets under the source root,
//! builds an import/render dependency graph, marks critical-path modules and
//! lazy-load candidates, and writes `code-splitting-manifest.json` into the
//! build root. The manifest is advisory; nothing in the build consumes it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::adapter::patterns::pattern;
use crate::analytics::format_bytes;
use crate::classifier::relative_source_path;
use crate::error::BuildError;

pub const MANIFEST_FILE: &str = "code-splitting-manifest.json";
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Route chunks above this size get a recommendation
pub const MAX_CHUNK_SIZE: u64 = 250 * 1024;
/// Critical bundle above this size gets a recommendation
pub const MAX_CRITICAL_SIZE: u64 = 100 * 1024;

const CRITICAL_PATHS: &[&str] = &[
    "layout/",
    "sections/header",
    "sections/footer",
    "snippets/critical",
    "styles/critical",
    "scripts/performance",
];
const CRITICAL_MARKERS: &[&str] = &[
    "document.addEventListener",
    "DOMContentLoaded",
    "critical",
    "above-the-fold",
    "hero",
    "header",
    "navigation",
];
const LAZY_PATHS: &[&str] = &[
    "components/modal",
    "components/carousel",
    "components/accordion",
    "sections/footer",
    "sections/testimonials",
    "scripts/analytics",
    "scripts/tracking",
];
const LAZY_MARKERS: &[&str] = &[
    "intersection",
    "lazy",
    "defer",
    "modal",
    "popup",
    "carousel",
    "accordion",
    "analytics",
    "tracking",
];

pattern!(
    es6_import,
    r#"import\s+(?:(?:\{[^}]*\}|\*\s+as\s+\w+|\w+)(?:\s*,\s*(?:\{[^}]*\}|\*\s+as\s+\w+|\w+))*\s+from\s+)?['"`]([^'"`]+)['"`]"#
);
pattern!(dynamic_import, r#"import\s*\(\s*['"`]([^'"`]+)['"`]\s*\)"#);
pattern!(require_call, r#"require\s*\(\s*['"`]([^'"`]+)['"`]\s*\)"#);
pattern!(css_import, r#"@import\s+['"`]([^'"`]+)['"`]"#);
pattern!(
    liquid_reference,
    r#"\{%-?\s*(?:include|render|section)\s+['"]([^'"]+)['"]"#
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Stylesheet,
    Template,
}

impl ModuleKind {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "js" => Some(ModuleKind::Script),
            "css" | "scss" => Some(ModuleKind::Stylesheet),
            "liquid" => Some(ModuleKind::Template),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Static,
    Dynamic,
    Require,
    Css,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub kind: ImportKind,
    pub module: String,
}

fn captures<'a>(re: &'a regex::Regex, content: &'a str) -> impl Iterator<Item = String> + 'a {
    re.captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
}

/// Imports of a script or stylesheet
pub fn extract_imports(kind: ModuleKind, content: &str) -> Vec<Import> {
    let tagged = |kind: ImportKind| move |module: String| Import { kind, module };
    match kind {
        ModuleKind::Script => captures(es6_import(), content)
            .map(tagged(ImportKind::Static))
            .chain(captures(dynamic_import(), content).map(tagged(ImportKind::Dynamic)))
            .chain(captures(require_call(), content).map(tagged(ImportKind::Require)))
            .collect(),
        ModuleKind::Stylesheet => captures(css_import(), content)
            .map(tagged(ImportKind::Css))
            .collect(),
        ModuleKind::Template => Vec::new(),
    }
}

/// Names passed to `include`, `render` and `section` tags
pub fn extract_liquid_references(content: &str) -> BTreeSet<String> {
    captures(liquid_reference(), content).collect()
}

/// One scanned source file
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub relative: String,
    pub kind: ModuleKind,
    pub size: u64,
    /// First 8 hex chars of the content's sha256
    pub hash: String,
    pub imports: Vec<Import>,
    pub references: BTreeSet<String>,
    pub route: Option<String>,
    pub component: Option<String>,
    pub critical: bool,
    pub lazy: bool,
}

fn file_stem(relative: &str) -> String {
    Path::new(relative)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl SourceModule {
    pub fn new(relative: &str, kind: ModuleKind, content: &str) -> Self {
        let lower = content.to_lowercase();
        let critical = CRITICAL_PATHS.iter().any(|p| relative.contains(p))
            || CRITICAL_MARKERS.iter().any(|m| content.contains(m));
        let lazy = LAZY_PATHS.iter().any(|p| relative.contains(p))
            || LAZY_MARKERS.iter().any(|m| lower.contains(m));

        Self {
            relative: relative.to_string(),
            kind,
            size: content.len() as u64,
            hash: hex::encode(Sha256::digest(content.as_bytes()))[..8].to_string(),
            imports: extract_imports(kind, content),
            references: if kind == ModuleKind::Template {
                extract_liquid_references(content)
            } else {
                BTreeSet::new()
            },
            route: relative.contains("templates/").then(|| file_stem(relative)),
            component: (relative.contains("components/") || relative.contains("snippets/"))
                .then(|| file_stem(relative)),
            critical,
            lazy,
        }
    }
}

/// Normalize `dir/../x/./y` without touching the filesystem
fn normalize(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(p) => parts.push(p.to_string_lossy().to_string()),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub name: String,
    pub files: Vec<String>,
    pub size: u64,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteChunk {
    pub chunk: String,
    pub files: Vec<String>,
    pub size: u64,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentChunk {
    pub chunk: String,
    pub files: Vec<String>,
    pub size: u64,
    pub lazy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LazyChunk {
    pub chunk: String,
    pub module: String,
    pub importers: Vec<String>,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplittingStats {
    pub total_files: usize,
    pub total_size: u64,
    pub critical_modules: usize,
    pub routes: usize,
    pub components: usize,
    pub lazy_modules: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedSavings {
    /// Percent of total size kept out of the critical bundle
    pub initial_bundle_reduction: u64,
    pub lazy_loadable_savings: String,
    pub estimated_load_time_improvement: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Optimizations {
    pub estimated_savings: EstimatedSavings,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplittingManifest {
    pub version: String,
    pub chunks: BTreeMap<String, Chunk>,
    pub routes: BTreeMap<String, RouteChunk>,
    pub components: BTreeMap<String, ComponentChunk>,
    pub critical: Vec<String>,
    pub lazy: Vec<LazyChunk>,
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub generated: String,
    pub stats: SplittingStats,
    pub optimizations: Optimizations,
}

/// Analyzer state: scanned modules and their resolved dependencies
#[derive(Debug, Default)]
pub struct CodeSplitter {
    modules: BTreeMap<String, SourceModule>,
    graph: BTreeMap<String, BTreeSet<String>>,
    critical: BTreeSet<String>,
}

impl CodeSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `scripts/`, `liquid/` and `styles/` under the source root
    pub fn scan(src_root: &Path) -> Result<Self, BuildError> {
        if !src_root.is_dir() {
            return Err(BuildError::SourceRootNotFound {
                path: src_root.to_path_buf(),
            });
        }
        let mut splitter = Self::new();
        for top in ["scripts", "liquid", "styles"] {
            for entry in WalkDir::new(src_root.join(top))
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let Some(kind) = ModuleKind::from_path(path) else {
                    continue;
                };
                // Scripts are only analysed under scripts/
                if kind == ModuleKind::Script && top != "scripts" {
                    continue;
                }
                match fs::read_to_string(path) {
                    Ok(content) => {
                        let relative = relative_source_path(src_root, path);
                        splitter.add(SourceModule::new(&relative, kind, &content));
                    }
                    Err(e) => {
                        tracing::debug!(path = %path.display(), "skipping unreadable source: {e}")
                    }
                }
            }
        }
        Ok(splitter)
    }

    pub fn add(&mut self, module: SourceModule) {
        self.modules.insert(module.relative.clone(), module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Relative import to a scanned module, trying `.js`, `.css`, `.scss`
    fn resolve_import(&self, module: &str, from: &str) -> Option<String> {
        if !(module.starts_with("./") || module.starts_with("../")) {
            return None;
        }
        let base = Path::new(from).parent().unwrap_or_else(|| Path::new(""));
        let joined = normalize(&base.join(module))?;
        if self.modules.contains_key(&joined) {
            return Some(joined);
        }
        [".js", ".css", ".scss"]
            .iter()
            .map(|ext| format!("{joined}{ext}"))
            .find(|candidate| self.modules.contains_key(candidate))
    }

    fn resolve_reference(&self, name: &str) -> Option<String> {
        ["liquid/snippets", "liquid/sections"]
            .iter()
            .map(|dir| format!("{dir}/{name}.liquid"))
            .find(|candidate| self.modules.contains_key(candidate))
    }

    fn build_graph(&mut self) {
        let mut graph = BTreeMap::new();
        for (path, module) in &self.modules {
            let deps: BTreeSet<String> = module
                .imports
                .iter()
                .filter_map(|imp| self.resolve_import(&imp.module, path))
                .chain(
                    module
                        .references
                        .iter()
                        .filter_map(|name| self.resolve_reference(name)),
                )
                .collect();
            graph.insert(path.clone(), deps);
        }
        self.graph = graph;
    }

    /// Entry points (layouts, templates) are critical; their dependencies
    /// are critical when they look critical themselves, two levels deep.
    fn mark_critical(&mut self) {
        self.critical = self
            .modules
            .values()
            .filter(|m| m.critical)
            .map(|m| m.relative.clone())
            .collect();

        let entries: Vec<String> = self
            .modules
            .keys()
            .filter(|p| p.contains("layout/") || p.contains("templates/"))
            .cloned()
            .collect();
        for entry in entries {
            self.critical.insert(entry.clone());
            let mut frontier = vec![entry];
            for _ in 0..2 {
                let mut next = Vec::new();
                for path in &frontier {
                    for dep in self.graph.get(path).into_iter().flatten() {
                        if self.modules.get(dep).is_some_and(|m| m.critical) {
                            self.critical.insert(dep.clone());
                            next.push(dep.clone());
                        }
                    }
                }
                frontier = next;
            }
        }
    }

    fn size_of(&self, path: &str) -> u64 {
        self.modules.get(path).map_or(0, |m| m.size)
    }

    fn route_chunks(&self) -> BTreeMap<String, RouteChunk> {
        let mut routes = BTreeMap::new();
        for module in self.modules.values() {
            let Some(route) = &module.route else { continue };
            let mut files = BTreeSet::from([module.relative.clone()]);
            let mut stack = vec![module.relative.clone()];
            let mut seen = BTreeSet::new();
            while let Some(path) = stack.pop() {
                if !seen.insert(path.clone()) {
                    continue;
                }
                for dep in self.graph.get(&path).into_iter().flatten() {
                    if self.modules.contains_key(dep) && !self.critical.contains(dep) {
                        files.insert(dep.clone());
                        stack.push(dep.clone());
                    }
                }
            }
            let size = files.iter().map(|f| self.size_of(f)).sum();
            routes.insert(
                route.clone(),
                RouteChunk {
                    chunk: format!("route-{route}"),
                    files: files.into_iter().collect(),
                    size,
                    critical: module.critical,
                },
            );
        }
        routes
    }

    fn component_chunks(&self) -> BTreeMap<String, ComponentChunk> {
        self.modules
            .values()
            .filter(|m| !m.critical)
            .filter_map(|m| {
                let name = m.component.as_ref()?;
                Some((
                    name.clone(),
                    ComponentChunk {
                        chunk: format!("component-{name}"),
                        files: vec![m.relative.clone()],
                        size: m.size,
                        lazy: m.lazy,
                    },
                ))
            })
            .collect()
    }

    /// Modules imported dynamically by more than one importer
    fn lazy_chunks(&self) -> Vec<LazyChunk> {
        let mut importers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (path, module) in &self.modules {
            for imp in module.imports.iter().filter(|i| i.kind == ImportKind::Dynamic) {
                if let Some(target) = self.resolve_import(&imp.module, path) {
                    importers.entry(target).or_default().push(path.clone());
                }
            }
        }
        importers
            .into_iter()
            .filter(|(_, from)| from.len() > 1)
            .filter_map(|(target, from)| {
                let module = self.modules.get(&target)?;
                Some(LazyChunk {
                    chunk: format!("dynamic-{}", file_stem(&target)),
                    size: module.size,
                    module: target,
                    importers: from,
                })
            })
            .collect()
    }

    fn bundle_chunks(&self) -> BTreeMap<String, Chunk> {
        let mut chunks = BTreeMap::new();
        let critical: Vec<String> = self.critical.iter().cloned().collect();
        chunks.insert(
            "critical".to_string(),
            Chunk {
                name: "critical".to_string(),
                size: critical.iter().map(|f| self.size_of(f)).sum(),
                files: critical,
                priority: "high".to_string(),
                preload: Some(true),
                cache: None,
            },
        );

        let vendor: Vec<String> = self
            .modules
            .keys()
            .filter(|p| p.contains("node_modules") || p.contains("vendor"))
            .cloned()
            .collect();
        if !vendor.is_empty() {
            chunks.insert(
                "vendor".to_string(),
                Chunk {
                    name: "vendor".to_string(),
                    size: vendor.iter().map(|f| self.size_of(f)).sum(),
                    files: vendor,
                    priority: "medium".to_string(),
                    preload: None,
                    cache: Some("long-term".to_string()),
                },
            );
        }
        chunks
    }

    pub fn analyze(mut self) -> SplittingManifest {
        self.build_graph();
        self.mark_critical();

        let routes = self.route_chunks();
        let components = self.component_chunks();
        let lazy = self.lazy_chunks();
        let chunks = self.bundle_chunks();

        let stats = SplittingStats {
            total_files: self.modules.len(),
            total_size: self.modules.values().map(|m| m.size).sum(),
            critical_modules: self.critical.len(),
            routes: routes.len(),
            components: self.modules.values().filter(|m| m.component.is_some()).count(),
            lazy_modules: lazy.len(),
        };

        let critical_size = chunks.get("critical").map_or(0, |c| c.size);
        let lazy_size: u64 = lazy.iter().map(|l| l.size).sum();
        let outside_critical = stats.total_size.saturating_sub(critical_size);
        let estimated_savings = EstimatedSavings {
            initial_bundle_reduction: if stats.total_size == 0 {
                0
            } else {
                ((outside_critical as f64 / stats.total_size as f64) * 100.0).round() as u64
            },
            lazy_loadable_savings: format_bytes(lazy_size),
            estimated_load_time_improvement: outside_critical / 100,
        };

        let mut recommendations: Vec<Recommendation> = routes
            .iter()
            .filter(|(_, r)| r.size > MAX_CHUNK_SIZE)
            .map(|(name, r)| Recommendation {
                kind: "chunk-size".to_string(),
                severity: "warning".to_string(),
                message: format!("Route chunk '{name}' is large ({})", format_bytes(r.size)),
                suggestion: "Consider further component splitting or lazy loading".to_string(),
            })
            .collect();
        if critical_size > MAX_CRITICAL_SIZE {
            recommendations.push(Recommendation {
                kind: "critical-path".to_string(),
                severity: "error".to_string(),
                message: format!("Critical bundle is large ({})", format_bytes(critical_size)),
                suggestion: "Move non-essential code to lazy chunks".to_string(),
            });
        }

        let dependencies = self
            .graph
            .iter()
            .filter(|(_, deps)| !deps.is_empty())
            .map(|(path, deps)| (path.clone(), deps.iter().cloned().collect()))
            .collect();

        SplittingManifest {
            version: MANIFEST_VERSION.to_string(),
            chunks,
            routes,
            components,
            critical: self.critical.into_iter().collect(),
            lazy,
            dependencies,
            generated: chrono::Utc::now().to_rfc3339(),
            stats,
            optimizations: Optimizations {
                estimated_savings,
                recommendations,
            },
        }
    }
}

/// Analyze `src_root` and write the manifest into `build_root`
pub fn write_manifest(src_root: &Path, build_root: &Path) -> Result<SplittingManifest, BuildError> {
    let manifest = CodeSplitter::scan(src_root)?.analyze();
    let path: PathBuf = build_root.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest).map_err(|source| BuildError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json)?;
    tracing::debug!(
        files = manifest.stats.total_files,
        critical = manifest.stats.critical_modules,
        "code-splitting manifest written"
    );
    Ok(manifest)
}
