/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Task discovery.
//!
//! By the time `run` is called, every `#[task(...)]`-annotated function
//! linked into this binary has already registered itself via its
//! `ctor`-generated constructor — registration happens at process
//! startup, before `main`. What remains here is closer to a manifest
//! reconciliation than a dynamic import: confirm that each source file
//! the build manifest names is present and readable, then report the
//! registry's contents (and per-file read failures) back to the
//! coordinator.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use trigger_wire::{ImportError, IndexCompletePayload, WorkerManifest};

use crate::registry;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read build manifest at {path}: {source}")]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("build manifest at {path} is not valid JSON: {source}")]
    ManifestMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry in the manifest's `files` array. The coordinator emits either
/// key; `filePath` wins when both are present.
#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(rename = "filePath", default)]
    file_path: Option<String>,
    #[serde(default)]
    entry: Option<String>,
}

impl ManifestFile {
    fn path(&self) -> Option<&str> {
        self.file_path.as_deref().or(self.entry.as_deref())
    }
}

/// Minimal shape of the `build-manifest.json` file this worker consumes.
/// Only the fields the indexer needs; anything else is ignored.
#[derive(Debug, Deserialize)]
struct BuildManifest {
    #[serde(rename = "configPath", default)]
    config_path: String,
    #[serde(rename = "files")]
    files: Vec<ManifestFile>,
    #[serde(rename = "runWorkerEntryPoint", default)]
    worker_entry_point: String,
    #[serde(default = "default_runtime")]
    runtime: String,
}

fn default_runtime() -> String {
    "rust".to_string()
}

pub fn load_manifest(path: &Path) -> Result<BuildManifest, LoaderError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoaderError::ManifestUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoaderError::ManifestMalformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Walk the manifest's file list, checking each path exists and is
/// readable. A missing/unreadable file becomes an `ImportError` entry
/// rather than aborting the whole index — the coordinator needs to know
/// about every other task even if one file moved. An entry naming
/// neither `filePath` nor `entry` is itself reported as an error.
fn check_files(files: &[ManifestFile]) -> Vec<ImportError> {
    files
        .iter()
        .filter_map(|file| {
            let Some(file_path) = file.path() else {
                return Some(ImportError {
                    file_path: String::new(),
                    error: "manifest file entry has neither filePath nor entry".to_string(),
                });
            };
            let path = Path::new(file_path);
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => None,
                Ok(_) => Some(ImportError {
                    file_path: file_path.to_string(),
                    error: "path exists but is not a regular file".to_string(),
                }),
                Err(err) => Some(ImportError {
                    file_path: file_path.to_string(),
                    error: err.to_string(),
                }),
            }
        })
        .collect()
}

/// Run the index: load the manifest, verify each file, collect the
/// registry snapshot, and build the `INDEX_COMPLETE` payload.
///
/// Incompatible packages (spec.md §4.9) have no Rust analogue — there is
/// no foreign package resolver to consult — so that list is always
/// empty; the field is carried for wire-shape fidelity only.
pub fn build_index(manifest_path: &Path) -> Result<IndexCompletePayload, LoaderError> {
    let manifest = load_manifest(manifest_path)?;
    let import_errors = check_files(&manifest.files);
    let tasks = registry::list_resources();

    Ok(IndexCompletePayload {
        manifest: WorkerManifest {
            config_path: manifest.config_path,
            tasks,
            incompatible_packages: Vec::new(),
            worker_entry_point: manifest.worker_entry_point,
            runtime: manifest.runtime,
        },
        import_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, files: &[&str]) -> PathBuf {
        let files_json: Vec<String> = files
            .iter()
            .map(|f| format!(r#"{{"filePath":"{f}"}}"#))
            .collect();
        let manifest = format!(
            r#"{{"configPath":"trigger.config.ts","files":[{}],"runWorkerEntryPoint":"/entry.rs"}}"#,
            files_json.join(",")
        );
        let path = dir.path().join("build-manifest.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(manifest.as_bytes()).unwrap();
        path
    }

    #[test]
    #[serial]
    fn build_index_reports_missing_files_as_import_errors() {
        registry::clear();
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.rs");
        std::fs::write(&present, "// task file").unwrap();

        let manifest_path = write_manifest(
            &dir,
            &[present.to_str().unwrap(), "/definitely/missing.rs"],
        );

        let payload = build_index(&manifest_path).unwrap();
        assert_eq!(payload.import_errors.len(), 1);
        assert_eq!(payload.import_errors[0].file_path, "/definitely/missing.rs");
        assert_eq!(payload.manifest.config_path, "trigger.config.ts");
        registry::clear();
    }

    #[test]
    fn entry_key_is_accepted_when_file_path_is_absent() {
        let manifest: BuildManifest = serde_json::from_str(
            r#"{"configPath":"c.ts","files":[{"entry":"/legacy.rs"}],"runWorkerEntryPoint":"/e.rs"}"#,
        )
        .unwrap();
        assert_eq!(manifest.files[0].path(), Some("/legacy.rs"));
        assert_eq!(manifest.worker_entry_point, "/e.rs");
    }

    #[test]
    fn file_path_wins_when_both_keys_are_present() {
        let manifest: BuildManifest = serde_json::from_str(
            r#"{"configPath":"c.ts","files":[{"filePath":"/new.rs","entry":"/old.rs"}]}"#,
        )
        .unwrap();
        assert_eq!(manifest.files[0].path(), Some("/new.rs"));
    }

    #[test]
    fn unreadable_manifest_path_is_an_error() {
        let result = load_manifest(Path::new("/definitely/not/a/real/path.json"));
        assert!(matches!(result, Err(LoaderError::ManifestUnreadable { .. })));
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = load_manifest(&path);
        assert!(matches!(result, Err(LoaderError::ManifestMalformed { .. })));
    }
}
