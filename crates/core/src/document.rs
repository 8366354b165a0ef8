//! Durable JSON documents.
//!
//! Every persisted file (deployment record, pending-action ledger, manifests)
//! goes through here. Writes are full-file rewrites: the value is rendered with
//! two-space indentation and a trailing newline into a sibling temp file which
//! is then renamed over the target, so a crash leaves either the old or the new
//! document, never a torn one. Key ordering is whatever the value's maps give;
//! callers use `BTreeMap` so diffs stay minimal.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::result::{Result, ResultExt};

/// Read and decode a JSON document.
///
/// # Errors
///
/// Returns [`Error::FileReadFailed`] when the file cannot be read and
/// [`Error::JsonParseFailed`] when it is not valid for `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| Error::json_parse_failed(path, e.to_string()))
}

/// Read a JSON document, falling back to `T::default()` when the file is absent.
///
/// # Errors
///
/// Same as [`read_json`] for files that exist.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json(path)
    } else {
        debug!(path = %path.display(), "document absent, starting empty");
        Ok(T::default())
    }
}

/// Encode `value` and atomically replace the document at `path`.
///
/// # Errors
///
/// Returns a storage error when the parent directory cannot be created, the
/// value cannot be encoded, or the temp file cannot be written or renamed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::directory_creation_failed(parent, e.to_string()))?;
    }

    let mut rendered = serde_json::to_string_pretty(value).map_err(|e| Error::JsonEncodeFailed {
        reason: e.to_string(),
    })?;
    rendered.push('\n');

    let staging = staging_path(path);
    fs::write(&staging, rendered)
        .map_err(|e| Error::file_write_failed(&staging, e.to_string()))
        .and_then(|()| {
            fs::rename(&staging, path).map_err(|e| Error::file_write_failed(path, e.to_string()))
        })
        .inspect_error(|e| tracing::error!(path = %path.display(), error = %e, "document write failed"))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_missing_document_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.json");
        let doc: BTreeMap<String, u32> = read_json_or_default(&path).expect("default");
        assert!(doc.is_empty());
    }

    #[test]
    fn test_write_is_sorted_and_newline_terminated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("doc.json");
        let mut doc = BTreeMap::new();
        doc.insert("zeta".to_string(), 1);
        doc.insert("alpha".to_string(), 2);

        write_json(&path, &doc).expect("write");

        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.ends_with('\n'));
        let alpha = raw.find("alpha").expect("alpha key");
        let zeta = raw.find("zeta").expect("zeta key");
        assert!(alpha < zeta, "keys must be written in sorted order");
        assert!(!staging_path(&path).exists(), "staging file must be renamed away");
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").expect("seed");
        let result: Result<BTreeMap<String, u32>> = read_json(&path);
        assert!(matches!(result, Err(Error::JsonParseFailed { .. })));
    }
}
