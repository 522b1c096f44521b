//! Pure I/O over the task-definition directory: one YAML file holds
//! zero or more named task entries (`{task_name: TaskConfig}`), and a
//! single task's entry lives in whichever file it was loaded from or
//! created in. Writes go through a temp-file-then-rename so a reader
//! never observes a half-written file.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::task_config::TaskConfig;
use crate::NightWatchError;

pub struct TaskLoader {
    tasks_location: PathBuf,
}

impl TaskLoader {
    pub fn new(tasks_location: impl Into<PathBuf>) -> Self {
        Self {
            tasks_location: tasks_location.into(),
        }
    }

    fn file_path(&self, filename: &str) -> PathBuf {
        self.tasks_location.join(filename)
    }

    /// Reads and parses one task file. `None` if the file does not
    /// exist — callers that want "create on first write" semantics
    /// treat that as an empty document.
    pub fn load_task_file(&self, filename: &str) -> crate::Result<Option<BTreeMap<String, TaskConfig>>> {
        let path = self.file_path(filename);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            NightWatchError::TaskFileIOError(format!(
                "failed to read task file {}: {e}",
                path.display()
            ))
        })?;
        let tasks: BTreeMap<String, TaskConfig> = serde_yaml::from_str(&content).map_err(|e| {
            NightWatchError::TaskFileInvalid(format!(
                "task file {} is not valid YAML: {e}",
                filename
            ))
        })?;
        Ok(Some(tasks))
    }

    pub fn load_task_from_file(&self, filename: &str, task_name: &str) -> crate::Result<TaskConfig> {
        let tasks = self.load_task_file(filename)?.ok_or_else(|| {
            NightWatchError::TaskFileIOError(format!("task file {filename} does not exist"))
        })?;
        tasks.get(task_name).cloned().ok_or_else(|| {
            NightWatchError::TaskNotFound(format!(
                "task \"{task_name}\" not found in file {filename}"
            ))
            .into()
        })
    }

    /// Loads every task file in the tasks directory, keyed by filename.
    /// The outer map (by filename) carries no ordering requirement of its
    /// own; each file's own task map is a `BTreeMap` so re-serialising it
    /// produces a stable key order.
    pub fn load_all_tasks(&self) -> crate::Result<HashMap<String, BTreeMap<String, TaskConfig>>> {
        let mut result = HashMap::new();
        for filename in self.list_task_files()? {
            if let Some(tasks) = self.load_task_file(&filename)? {
                result.insert(filename, tasks);
            }
        }
        Ok(result)
    }

    fn list_task_files(&self) -> crate::Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.tasks_location).map_err(|e| {
            NightWatchError::TaskFileIOError(format!(
                "can't list tasks directory {}: {e}",
                self.tasks_location.display()
            ))
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                NightWatchError::TaskFileIOError(format!("failed to read directory entry: {e}"))
            })?;
            if entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }
        Ok(files)
    }

    /// Overwrites `filename` with exactly the given task map, atomically.
    pub fn write_tasks_file(&self, filename: &str, tasks: &BTreeMap<String, TaskConfig>) -> crate::Result<()> {
        std::fs::create_dir_all(&self.tasks_location).map_err(|e| {
            NightWatchError::TaskFileIOError(format!("failed to create tasks directory: {e}"))
        })?;
        let content = serde_yaml::to_string(tasks).map_err(|e| {
            NightWatchError::TaskFileIOError(format!("failed to serialise task file {filename}: {e}"))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.tasks_location).map_err(|e| {
            NightWatchError::TaskFileIOError(format!("failed to create temp file: {e}"))
        })?;
        use std::io::Write;
        tmp.write_all(content.as_bytes()).map_err(|e| {
            NightWatchError::TaskFileIOError(format!("failed to write temp file: {e}"))
        })?;
        tmp.persist(self.file_path(filename)).map_err(|e| {
            NightWatchError::TaskFileIOError(format!(
                "failed to persist task file {filename}: {e}"
            ))
        })?;
        Ok(())
    }

    pub fn delete_tasks_file(&self, filename: &str) -> crate::Result<()> {
        let path = self.file_path(filename);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| {
                NightWatchError::TaskFileIOError(format!(
                    "failed to delete task file {filename}: {e}"
                ))
            })?;
        }
        Ok(())
    }

    /// Inserts or overwrites a single task's entry within its file.
    pub fn put_task_in_file(&self, filename: &str, task_name: &str, config: &TaskConfig) -> crate::Result<()> {
        let mut tasks = self.load_task_file(filename)?.unwrap_or_default();
        tasks.insert(task_name.to_string(), config.clone());
        self.write_tasks_file(filename, &tasks)
    }

    /// Removes a single task's entry from its file, deleting the file
    /// entirely if it ends up empty.
    pub fn remove_task_from_file(&self, filename: &str, task_name: &str) -> crate::Result<()> {
        let mut tasks = self.load_task_file(filename)?.unwrap_or_default();
        tasks.remove(task_name);
        if tasks.is_empty() {
            self.delete_tasks_file(filename)
        } else {
            self.write_tasks_file(filename, &tasks)
        }
    }
}
