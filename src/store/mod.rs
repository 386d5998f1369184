//! Durable keyed storage for task records.
//!
//! One file per task under `tasks/`, archived records under `archive/` plus
//! an append-only `archive/archive.log`. An in-memory index fronts the files;
//! writers to the same id are serialised with an optimistic version check,
//! distinct ids never contend.

pub mod archive;
pub mod record;

pub use archive::ArchiveRecord;

use crate::errors::StoreError;
use crate::task::{self, Task, TaskId, TaskStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

#[derive(Debug, Clone)]
struct Versioned {
    task: Task,
    version: u64,
}

#[derive(Debug, Clone)]
struct ArchivedEntry {
    task: Task,
    final_status: TaskStatus,
}

#[derive(Debug, Default)]
struct StoreInner {
    active: HashMap<TaskId, Versioned>,
    archived: HashMap<TaskId, ArchivedEntry>,
}

/// File-backed task store.
pub struct TaskStore {
    tasks_dir: PathBuf,
    archive_dir: PathBuf,
    log_path: PathBuf,
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    /// Open (or initialise) a store rooted at `root`.
    ///
    /// Existing records are loaded eagerly; a record that fails to parse is
    /// skipped with a warning rather than poisoning the whole store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let tasks_dir = root.join("tasks");
        let archive_dir = root.join("archive");
        fs::create_dir_all(&tasks_dir)?;
        fs::create_dir_all(&archive_dir)?;

        let mut inner = StoreInner::default();

        for path in list_record_files(&tasks_dir)? {
            match fs::read_to_string(&path).map_err(StoreError::Io).and_then(|c| {
                record::parse(&c, &path)
            }) {
                Ok(parsed) => {
                    inner.active.insert(
                        parsed.task.id,
                        Versioned {
                            task: parsed.task,
                            version: 0,
                        },
                    );
                }
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable task record"),
            }
        }

        for path in list_record_files(&archive_dir)? {
            match fs::read_to_string(&path).map_err(StoreError::Io).and_then(|c| {
                record::parse(&c, &path)
            }) {
                Ok(parsed) => {
                    let final_status = parsed.final_status.unwrap_or_else(|| {
                        if parsed.task.error_log.is_some() {
                            TaskStatus::Failed
                        } else {
                            TaskStatus::Completed
                        }
                    });
                    inner.archived.insert(
                        parsed.task.id,
                        ArchivedEntry {
                            task: parsed.task,
                            final_status,
                        },
                    );
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable archived record")
                }
            }
        }

        Ok(Self {
            log_path: archive_dir.join("archive.log"),
            tasks_dir,
            archive_dir,
            inner: RwLock::new(inner),
        })
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the active record file for `id`.
    pub fn task_path(&self, id: TaskId) -> PathBuf {
        self.tasks_dir.join(format!("{}.md", id.file_stem()))
    }

    /// Path of the archived record file for `id`.
    pub fn archive_path(&self, id: TaskId) -> PathBuf {
        self.archive_dir.join(format!("{}.md", id.file_stem()))
    }

    /// Path of the append-only archive log.
    pub fn archive_log_path(&self) -> &Path {
        &self.log_path
    }

    /// Create a new task. Fails if the id exists in active or archived
    /// storage; the record is persisted before it becomes visible.
    pub fn create(&self, mut task: Task) -> Result<TaskId, StoreError> {
        task.normalize_dependencies();
        let id = task.id;
        let mut inner = self.write_inner();
        if inner.active.contains_key(&id) || inner.archived.contains_key(&id) {
            return Err(StoreError::DuplicateId { id });
        }
        fs::write(self.task_path(id), record::render(&task, None))?;
        inner.active.insert(id, Versioned { task, version: 0 });
        Ok(id)
    }

    /// Fetch an active task.
    pub fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        self.read_inner()
            .active
            .get(&id)
            .map(|v| v.task.clone())
            .ok_or(StoreError::NotFound { id })
    }

    /// Fetch an active task together with its store version, for a later
    /// version-pinned update.
    pub fn get_versioned(&self, id: TaskId) -> Result<(Task, u64), StoreError> {
        self.read_inner()
            .active
            .get(&id)
            .map(|v| (v.task.clone(), v.version))
            .ok_or(StoreError::NotFound { id })
    }

    /// Fetch an archived task and the status it held when archived.
    pub fn get_archived(&self, id: TaskId) -> Option<(Task, TaskStatus)> {
        self.read_inner()
            .archived
            .get(&id)
            .map(|e| (e.task.clone(), e.final_status))
    }

    /// Whether the id is known at all (active or archived).
    pub fn contains(&self, id: TaskId) -> bool {
        let inner = self.read_inner();
        inner.active.contains_key(&id) || inner.archived.contains_key(&id)
    }

    /// Effective status for dependency resolution: an active task's current
    /// status, or the final status an archived task held when it was moved.
    pub fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        let inner = self.read_inner();
        inner
            .active
            .get(&id)
            .map(|v| v.task.status)
            .or_else(|| inner.archived.get(&id).map(|e| e.final_status))
    }

    /// Dependency edges of a task, active or archived.
    pub fn dependencies_of(&self, id: TaskId) -> Option<Vec<TaskId>> {
        let inner = self.read_inner();
        inner
            .active
            .get(&id)
            .map(|v| v.task.dependencies.clone())
            .or_else(|| inner.archived.get(&id).map(|e| e.task.dependencies.clone()))
    }

    /// Apply a mutation to an active task. The snapshot/commit pair uses an
    /// optimistic version check; a writer that raced another update gets
    /// `ConcurrentModification` and must retry from a fresh read.
    pub fn update<F>(&self, id: TaskId, mutator: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let (_, version) = self.get_versioned(id)?;
        self.update_pinned(id, version, mutator)
    }

    /// Apply a mutation only if the store version still matches
    /// `expected_version`. The id field cannot be changed by a mutator.
    pub fn update_pinned<F>(
        &self,
        id: TaskId,
        expected_version: u64,
        mutator: F,
    ) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let mut inner = self.write_inner();
        let entry = inner
            .active
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;
        if entry.version != expected_version {
            return Err(StoreError::ConcurrentModification { id });
        }
        let mut task = entry.task.clone();
        mutator(&mut task);
        task.id = id;
        task.normalize_dependencies();
        fs::write(self.task_path(id), record::render(&task, None))?;
        entry.task = task.clone();
        entry.version += 1;
        Ok(task)
    }

    /// List active tasks matching a predicate, ordered by id.
    pub fn list<P>(&self, predicate: P) -> Vec<Task>
    where
        P: Fn(&Task) -> bool,
    {
        let inner = self.read_inner();
        let mut tasks: Vec<Task> = inner
            .active
            .values()
            .filter(|v| predicate(&v.task))
            .map(|v| v.task.clone())
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// List archived tasks with their final statuses, ordered by id.
    pub fn list_archived(&self) -> Vec<(Task, TaskStatus)> {
        let inner = self.read_inner();
        let mut tasks: Vec<(Task, TaskStatus)> = inner
            .archived
            .values()
            .map(|e| (e.task.clone(), e.final_status))
            .collect();
        tasks.sort_by_key(|(t, _)| t.id);
        tasks
    }

    /// Atomically move a task from active storage to the archive and append
    /// the log entry. All-or-nothing: on any I/O failure the partial archive
    /// copy is removed and the active record is left untouched.
    pub fn move_to_archive(&self, id: TaskId) -> Result<ArchiveRecord, StoreError> {
        let mut inner = self.write_inner();
        let entry = inner
            .active
            .get(&id)
            .ok_or(StoreError::NotFound { id })?;

        let final_status = entry.task.status;
        let record = ArchiveRecord::from_task(&entry.task, Utc::now());
        let mut archived_task = entry.task.clone();
        archived_task.status = TaskStatus::Archived;

        let archive_path = self.archive_path(id);
        let archive_io = |source: std::io::Error| StoreError::ArchiveIo { id, source };

        fs::write(
            &archive_path,
            record::render(&archived_task, Some(final_status)),
        )
        .map_err(archive_io)?;

        if let Err(source) = archive::append(&self.log_path, &record) {
            let _ = fs::remove_file(&archive_path);
            return Err(archive_io(source));
        }

        if let Err(source) = fs::remove_file(self.task_path(id)) {
            let _ = fs::remove_file(&archive_path);
            return Err(archive_io(source));
        }

        inner.active.remove(&id);
        inner.archived.insert(
            id,
            ArchivedEntry {
                task: archived_task,
                final_status,
            },
        );
        Ok(record)
    }

    /// Next free id: top-level when `parent` is `None`, otherwise the next
    /// sub-id scoped under `parent`. Considers active and archived ids so an
    /// id is never reused.
    pub fn next_id(&self, parent: Option<u32>) -> TaskId {
        let inner = self.read_inner();
        let ids = inner
            .active
            .keys()
            .chain(inner.archived.keys())
            .copied()
            .collect::<Vec<_>>();
        match parent {
            None => task::next_top_level_id(ids),
            Some(parent) => task::next_sub_id(ids, parent),
        }
    }
}

fn list_record_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "md").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}
