//! Task catalog loader.
//!
//! Accepts a JSON file holding either an array of tasks or `{"tasks": [...]}`,
//! or a directory whose sub-directories each hold a `tasks.json` (for example
//! `tasks/tier1/tasks.json`). Loose `*.json` files in the directory are read
//! too.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Task;

/// File name looked up inside each catalog sub-directory.
pub const TASKS_FILE: &str = "tasks.json";

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskDocument {
    List(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

impl TaskDocument {
    fn into_tasks(self) -> Vec<Task> {
        match self {
            Self::List(tasks) | Self::Wrapped { tasks } => tasks,
        }
    }
}

/// Loads and validates the task catalog.
pub struct TaskLoader {
    path: PathBuf,
}

impl TaskLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load every task, normalized, in file order.
    ///
    /// # Errors
    /// `DuplicateTask` when two tasks share an id, `InvalidTask` when a task
    /// has no gating numeric field.
    pub async fn load(&self) -> DomainResult<Vec<Task>> {
        let files = self.catalog_files().await?;
        if files.is_empty() {
            return Err(DomainError::StorageError(format!(
                "no task files found under {}",
                self.path.display()
            )));
        }

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for file in files {
            let loaded = read_document(&file).await?;
            debug!(path = %file.display(), count = loaded.len(), "read task file");
            for task in loaded {
                let task = task.normalized()?;
                if !seen.insert(task.id.clone()) {
                    return Err(DomainError::DuplicateTask(task.id));
                }
                tasks.push(task);
            }
        }

        info!(path = %self.path.display(), tasks = tasks.len(), "task catalog loaded");
        Ok(tasks)
    }

    async fn catalog_files(&self) -> DomainResult<Vec<PathBuf>> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            DomainError::StorageError(format!("cannot read task catalog {}: {e}", self.path.display()))
        })?;
        if metadata.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                let nested = path.join(TASKS_FILE);
                if tokio::fs::try_exists(&nested).await.unwrap_or(false) {
                    files.push(nested);
                }
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

async fn read_document(path: &Path) -> DomainResult<Vec<Task>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        DomainError::StorageError(format!("cannot read {}: {e}", path.display()))
    })?;
    let document: TaskDocument = serde_json::from_str(&text).map_err(|e| {
        DomainError::SerializationError(format!("invalid task file {}: {e}", path.display()))
    })?;
    Ok(document.into_tasks())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &serde_json::Value) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_directory_of_tiers() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "tier2/tasks.json",
            &serde_json::json!({"tasks": [
                {"id": "t2-anova-001", "question": "q", "ground_truth": {"total_sample_size": 120}}
            ]}),
        );
        write(
            dir.path(),
            "tier1/tasks.json",
            &serde_json::json!({"tasks": [
                {"id": "t1-ttest-001", "question": "q", "ground_truth": {"sample_size_per_group": 64, "method": "pwr"}},
                {"id": "t1-ttest-002", "question": "q", "ground_truth": {"power": 0.8}}
            ]}),
        );
        write(dir.path(), "notes/readme.txt", &serde_json::json!("ignored"));

        let tasks = TaskLoader::new(dir.path()).load().await.unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1-ttest-001", "t1-ttest-002", "t2-anova-001"]);
        assert_eq!(tasks[2].tier, 2);
        assert!(!tasks[0].ground_truth.contains_key("method"));
    }

    #[tokio::test]
    async fn test_single_file_array() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "all_tasks.json",
            &serde_json::json!([
                {"id": "t3-surv-001", "tier": 3, "question": "q", "ground_truth": {"events_needed": 88}}
            ]),
        );
        let tasks = TaskLoader::new(dir.path().join("all_tasks.json")).load().await.unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let task = serde_json::json!({"id": "t1-a", "question": "q", "ground_truth": {"sample_size": 10}});
        write(dir.path(), "tier1/tasks.json", &serde_json::json!([task.clone()]));
        write(dir.path(), "extra.json", &serde_json::json!([task]));

        assert!(matches!(
            TaskLoader::new(dir.path()).load().await,
            Err(DomainError::DuplicateTask(id)) if id == "t1-a"
        ));
    }

    #[tokio::test]
    async fn test_missing_catalog() {
        let dir = TempDir::new().unwrap();
        assert!(TaskLoader::new(dir.path().join("nope")).load().await.is_err());
    }
}
