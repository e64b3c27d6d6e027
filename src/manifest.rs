//! Asset manifest with sizes and integrity hashes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BuildError;
use crate::theme::ThemeDir;

pub const MANIFEST_FILE: &str = "asset-manifest.json";
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub size: u64,
    /// RFC 3339 modification time
    pub modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub generated: String,
    pub version: String,
    pub files: BTreeMap<String, AssetEntry>,
    /// `sha256-<hex>` per file name
    pub integrity: BTreeMap<String, String>,
}

impl AssetManifest {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// `sha256-<hex>` of `bytes`
pub fn integrity_of(bytes: &[u8]) -> String {
    format!("sha256-{}", hex::encode(Sha256::digest(bytes)))
}

fn describe(path: &Path) -> Result<(String, AssetEntry, String), BuildError> {
    let meta = fs::metadata(path)?;
    let content = fs::read(path)?;
    let modified: DateTime<Utc> = meta.modified()?.into();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok((
        name,
        AssetEntry {
            size: meta.len(),
            modified: modified.to_rfc3339(),
        },
        integrity_of(&content),
    ))
}

/// Hash every regular file directly under `<build_root>/assets`.
///
/// Unreadable files are skipped with a warning.
pub fn build_manifest(build_root: &Path) -> Result<AssetManifest, BuildError> {
    let assets = build_root.join(ThemeDir::Assets.as_str());
    let mut files: Vec<PathBuf> = fs::read_dir(&assets)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    files.sort();

    let described: Vec<_> = files
        .par_iter()
        .filter_map(|path| match describe(path) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping asset in manifest: {e}");
                None
            }
        })
        .collect();

    let mut manifest = AssetManifest {
        generated: Utc::now().to_rfc3339(),
        version: MANIFEST_VERSION.to_string(),
        files: BTreeMap::new(),
        integrity: BTreeMap::new(),
    };
    for (name, entry, hash) in described {
        manifest.files.insert(name.clone(), entry);
        manifest.integrity.insert(name, hash);
    }
    Ok(manifest)
}

/// Build and write `asset-manifest.json` into the build root
pub fn write_manifest(build_root: &Path) -> Result<AssetManifest, BuildError> {
    let manifest = build_manifest(build_root)?;
    let path = build_root.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(&manifest).map_err(|source| BuildError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json)?;
    tracing::debug!(files = manifest.len(), path = %path.display(), "asset manifest written");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let assets = tmp.path().join("assets");
        fs::create_dir_all(assets.join("nested")).unwrap();
        fs::write(assets.join("app.js"), b"console.log(1)").unwrap();
        fs::write(assets.join("theme.css"), b"").unwrap();
        fs::write(assets.join("nested/skip.css"), b"x").unwrap();
        tmp
    }

    #[test]
    fn test_integrity_known_hash() {
        assert_eq!(
            integrity_of(b""),
            "sha256-e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_manifest_covers_top_level_assets() {
        let tmp = build_tree();
        let manifest = build_manifest(tmp.path()).unwrap();

        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.files["app.js"].size, 14);
        assert_eq!(manifest.files["theme.css"].size, 0);
        assert!(!manifest.files.contains_key("skip.css"));
        assert_eq!(
            manifest.integrity["app.js"],
            integrity_of(b"console.log(1)")
        );
        assert!(DateTime::parse_from_rfc3339(&manifest.files["app.js"].modified).is_ok());
    }

    #[test]
    fn test_write_manifest() {
        let tmp = build_tree();
        write_manifest(tmp.path()).unwrap();
        let raw = fs::read_to_string(tmp.path().join(MANIFEST_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json["generated"].is_string());
        assert!(json["integrity"]["theme.css"]
            .as_str()
            .unwrap()
            .starts_with("sha256-"));
    }

    #[test]
    fn test_missing_assets_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(build_manifest(tmp.path()).is_err());
    }
}
