//! File-backed persistence for outcome stores and evaluation results.
//!
//! Every document is written whole: serialized, written to a temporary file
//! in the destination directory, synced, then renamed over the old file.

pub mod evaluation_writer;
pub mod json_outcome_store;

pub use evaluation_writer::EvaluationWriter;
pub use json_outcome_store::JsonOutcomeStore;

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::domain::errors::{DomainError, DomainResult};

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub async fn write_json_atomic<T>(path: &Path, value: &T) -> DomainResult<()>
where
    T: Serialize + ?Sized,
{
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path.to_path_buf(), bytes).await
}

/// Atomically replace `path` with `bytes`, creating parent directories.
pub async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> DomainResult<()> {
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &bytes))
        .await
        .map_err(|e| DomainError::StorageError(format!("write task failed: {e}")))?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> DomainResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        DomainError::StorageError(format!("failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Read a file, treating a missing file as `None`.
pub async fn read_optional(path: &Path) -> DomainResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::StorageError(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/doc.json");

        write_json_atomic(&path, &serde_json::json!({"a": 1})).await.unwrap();
        write_json_atomic(&path, &serde_json::json!({"a": 2})).await.unwrap();

        let text = read_optional(&path).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["a"], 2);

        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1, "temporary files must not be left behind");
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_optional(&dir.path().join("absent.json"))
            .await
            .unwrap()
            .is_none());
    }
}
