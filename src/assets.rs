//! Staging of local build output that gets shipped into the site bucket.
//!
//! A staged asset is a directory plus a content fingerprint. Packaging the
//! directory into `<fingerprint>.zip` and uploading it to the asset bucket
//! is left to the deploy tooling, which reads the asset manifest.
//!
//! The asset manifest (`<stack>.assets.json`) is this crate's own format,
//! not the cdk asset manifest. It has one entry per fingerprint:
//!
//! ```json
//! {
//!   "version": "...",
//!   "files": {
//!     "<sha256 hex>": {
//!       "source": { "path": "<build dir>", "packaging": "zip" },
//!       "destination": { "bucketName": "<name or ${AWS::..} pattern>", "objectKey": "<sha256 hex>.zip", "region": "<optional>" }
//!     }
//!   }
//! }
//! ```
//!
//! `source.path` is the build directory as configured. relative paths are
//! relative to the working directory synthesis ran in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Result, StackError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub source_path: PathBuf,
    pub fingerprint: String,
    pub object_key: String,
    pub file_count: usize,
    pub total_bytes: u64,
}

fn asset_error(path: &Path, message: impl Into<String>) -> StackError {
    StackError::Asset { path: path.to_path_buf(), message: message.into() }
}

/// every file under `start_dir`, in a stable order.
pub fn iter_files_recursively(start_dir: &Path, callback: &mut impl FnMut(PathBuf) -> Result<()>) -> Result<()> {
    let readdir = std::fs::read_dir(start_dir)
        .map_err(|e| asset_error(start_dir, format!("Failed to read dir\n{e}")))?;
    let mut entries = vec![];
    for entry in readdir {
        let direntry = entry.map_err(|e| asset_error(start_dir, format!("Failed to get readdir entry\n{e}")))?;
        entries.push(direntry.path());
    }
    entries.sort();
    for path in entries {
        if path.is_dir() {
            iter_files_recursively(&path, callback)?;
        } else {
            callback(path)?;
        }
    }
    Ok(())
}

/// fingerprint a directory of build output. both the relative file names and
/// their contents feed the hash, so renames change the fingerprint too.
/// every file is framed by its name and length so that bytes cannot move
/// between neighbouring files without changing the digest.
pub fn stage_directory(source: &Path) -> Result<StagedAsset> {
    let meta = std::fs::metadata(source)
        .map_err(|e| asset_error(source, format!("Asset path does not exist\n{e}")))?;
    if !meta.is_dir() {
        return Err(asset_error(source, "Asset path must be a directory"));
    }

    let mut hasher = Sha256::new();
    let mut file_count = 0;
    let mut total_bytes = 0u64;
    iter_files_recursively(source, &mut |path| {
        let relative = path.strip_prefix(source).unwrap_or(&path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        let contents = std::fs::read(&path)
            .map_err(|e| asset_error(&path, format!("Failed to read file\n{e}")))?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
        file_count += 1;
        total_bytes += contents.len() as u64;
        Ok(())
    })?;
    if file_count == 0 {
        return Err(asset_error(source, "Asset directory is empty"));
    }

    let fingerprint = hex::encode(hasher.finalize());
    debug!(path = ?source, %fingerprint, file_count, "staged asset");
    Ok(StagedAsset {
        source_path: source.to_path_buf(),
        object_key: format!("{fingerprint}.zip"),
        fingerprint,
        file_count,
        total_bytes,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSource {
    pub path: String,
    pub packaging: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDestination {
    /// a literal name, or a `${AWS::...}` pattern the deploy tooling expands
    pub bucket_name: String,
    pub object_key: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub source: AssetSource,
    pub destination: AssetDestination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub version: String,
    pub files: BTreeMap<String, AssetEntry>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self { version: crate::template::MANIFEST_VERSION.to_string(), files: Default::default() }
    }

    pub fn add(&mut self, asset: &StagedAsset, bucket_name: &str, region: Option<&str>) {
        self.files.insert(asset.fingerprint.clone(), AssetEntry {
            source: AssetSource {
                path: asset.source_path.to_string_lossy().to_string(),
                packaging: "zip".to_string(),
            },
            destination: AssetDestination {
                bucket_name: bucket_name.to_string(),
                object_key: asset.object_key.clone(),
                region: region.map(|r| r.to_string()),
            },
        });
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        write(dir.path(), "static/js/main.js", "console.log(1)");
        let first = stage_directory(dir.path()).unwrap();
        let second = stage_directory(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_count, 2);
        assert_eq!(first.object_key, format!("{}.zip", first.fingerprint));

        write(dir.path(), "static/js/main.js", "console.log(2)");
        let changed = stage_directory(dir.path()).unwrap();
        assert_ne!(first.fingerprint, changed.fingerprint);
    }

    #[test]
    fn anagram_contents_get_distinct_fingerprints() {
        // same bytes in a different order sum to the same adler32
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "index.html", "abba");
        write(b.path(), "index.html", "baab");
        let a = stage_directory(a.path()).unwrap();
        let b = stage_directory(b.path()).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_ne!(a.object_key, b.object_key);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn bytes_moving_between_files_change_the_fingerprint() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "a.js", "12");
        write(a.path(), "b.js", "3");
        write(b.path(), "a.js", "1");
        write(b.path(), "b.js", "23");
        assert_ne!(stage_directory(a.path()).unwrap().fingerprint, stage_directory(b.path()).unwrap().fingerprint);
    }

    #[test]
    fn renaming_a_file_changes_the_fingerprint() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "index.html", "same");
        write(b.path(), "main.html", "same");
        assert_ne!(stage_directory(a.path()).unwrap().fingerprint, stage_directory(b.path()).unwrap().fingerprint);
    }

    #[test]
    fn missing_and_empty_directories_are_rejected() {
        let err = stage_directory(Path::new("/no/such/build/dir")).unwrap_err();
        assert!(matches!(err, StackError::Asset { .. }));
        let empty = tempfile::tempdir().unwrap();
        assert!(stage_directory(empty.path()).unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn files_are_not_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "x");
        let err = stage_directory(&dir.path().join("index.html")).unwrap_err();
        assert!(err.to_string().contains("must be a directory"));
    }

    #[test]
    fn manifest_entries_are_keyed_by_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        let asset = stage_directory(dir.path()).unwrap();
        let mut manifest = AssetManifest::new();
        manifest.add(&asset, "site-assets", Some("eu-west-1"));
        manifest.add(&asset, "site-assets", Some("eu-west-1"));

        let json = serde_json::to_value(&manifest).unwrap();
        let files = json["files"].as_object().unwrap();
        assert_eq!(files.len(), 1);
        let entry = &files[&asset.fingerprint];
        assert_eq!(entry["source"]["packaging"], "zip");
        assert_eq!(entry["source"]["path"], &*dir.path().to_string_lossy());
        assert_eq!(entry["destination"], serde_json::json!({
            "bucketName": "site-assets",
            "objectKey": format!("{}.zip", asset.fingerprint),
            "region": "eu-west-1",
        }));

        let mut no_region = AssetManifest::new();
        no_region.add(&asset, "site-assets", None);
        let json = serde_json::to_value(&no_region).unwrap();
        assert!(json["files"][&asset.fingerprint]["destination"].get("region").is_none());
    }
}
