//! The engine: sole mutation entry point for the task lifecycle.
//!
//! Every caller, automated or manual, goes through this object. It owns
//! the status state machine, gates transitions on the dependency graph,
//! commits the store mutation, and only then dispatches the lifecycle event
//! through the hook pipeline, so hooks always observe post-transition state.

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::graph;
use crate::hooks::{
    CommandRunner, Event, HookDispatcher, HookExecutor, HookRegistry, ShellRunner,
};
use crate::store::{ArchiveRecord, TaskStore};
use crate::task::{Priority, Task, TaskId, TaskStatus};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Input for creating a task. Everything beyond the title is optional.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    /// Explicit id; when absent the next free id is assigned.
    pub id: Option<TaskId>,
    /// Parent root for sub-task id assignment (ignored when `id` is set).
    pub parent: Option<u32>,
    pub priority: Priority,
    pub feature: String,
    pub commit_type: String,
    pub dependencies: Vec<TaskId>,
    pub body: String,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Task lifecycle engine.
pub struct Engine {
    store: TaskStore,
    dispatcher: HookDispatcher,
}

impl Engine {
    /// Open an engine rooted at `root`, loading `taskweave.toml` from the
    /// same directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, EngineError> {
        let root = root.as_ref();
        let config = EngineConfig::load_or_default(root)?;
        Self::with_config(root, config)
    }

    /// Open an engine with an explicit configuration, running hooks through
    /// the default shell runner.
    pub fn with_config(root: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let root = root.as_ref();
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(root));
        Self::with_runner(root, config, runner)
    }

    /// Open an engine with an explicit `CommandRunner`; this is the seam for
    /// sandboxed execution and for tests.
    pub fn with_runner(
        root: impl AsRef<Path>,
        config: EngineConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, EngineError> {
        let root = root.as_ref();
        let store = TaskStore::open(root)?;
        let registry = HookRegistry::new(config.system_hooks_root(root), config.user_hooks_root());
        let executor = HookExecutor::new(
            runner,
            Duration::from_secs(config.default_hook_timeout_secs),
        );
        let dispatcher = HookDispatcher::new(registry, executor, config.effective_hooks_enabled());
        Ok(Self { store, dispatcher })
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Hook inspection for the CLI.
    pub fn hooks(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    /// Dispatch an event, honouring the hook error policy: failures from
    /// non-"before" triggers are logged and swallowed, never surfaced to
    /// the lifecycle caller.
    async fn emit(&self, event: Event) {
        debug_assert!(!event.is_fail_fast(), "before events must use dispatch directly");
        if let Err(err) = self.dispatcher.dispatch(&event).await {
            warn!(%err, event = %event.kind, trigger = %event.trigger, "hook dispatch failed");
        }
    }

    /// Create a task in `pending`. Rejects duplicate ids, self-dependencies,
    /// and dependency declarations that would close a cycle; nothing is
    /// persisted on rejection. Emits `(plan_update, task_created)`.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, EngineError> {
        let id = match draft.id {
            Some(id) => id,
            None => self.store.next_id(draft.parent),
        };

        let mut dependencies = draft.dependencies;
        dependencies.sort();
        dependencies.dedup();
        self.check_cycles(id, &dependencies)?;

        let mut task = Task::new(id, draft.title);
        task.priority = draft.priority;
        task.feature = draft.feature;
        task.commit_type = draft.commit_type;
        task.dependencies = dependencies;
        task.body = draft.body;

        self.store.create(task.clone())?;
        info!(task = %id, "task created");
        self.emit(Event::task_created(&task, &self.store.task_path(id)))
            .await;
        Ok(task)
    }

    /// Replace a task's dependency declarations. The same cycle check as at
    /// creation time applies; a rejected declaration persists no edge.
    pub async fn set_dependencies(
        &self,
        id: TaskId,
        mut dependencies: Vec<TaskId>,
    ) -> Result<Task, EngineError> {
        dependencies.sort();
        dependencies.dedup();
        // Validate against the graph without the task's current edges so a
        // task may keep a subset of what it already declares.
        self.store.get(id)?;
        self.check_cycles(id, &dependencies)?;
        let task = self
            .store
            .update(id, |t| t.dependencies = dependencies)?;
        Ok(task)
    }

    fn check_cycles(&self, id: TaskId, dependencies: &[TaskId]) -> Result<(), EngineError> {
        if let Some(path) = graph::would_cycle(&self.store, id, dependencies) {
            return Err(EngineError::CyclicDependency { id, path });
        }
        Ok(())
    }

    /// `pending -> inprogress`: requires every dependency satisfied; sets
    /// `started_at` on the first start and records the assigned agent.
    pub async fn start(&self, id: TaskId, agent: Option<&str>) -> Result<Task, EngineError> {
        let (task, version) = self.store.get_versioned(id)?;
        self.require_transition(&task, TaskStatus::InProgress)?;

        let unmet = graph::unmet_dependencies(&self.store, &task);
        if !unmet.is_empty() {
            return Err(EngineError::DependencyUnmet { id, unmet });
        }

        let agent = agent.map(str::to_owned);
        let updated = self.store.update_pinned(id, version, |t| {
            t.status = TaskStatus::InProgress;
            if t.started_at.is_none() {
                t.started_at = Some(Utc::now());
            }
            t.assigned_agent = agent;
        })?;
        info!(task = %id, "task started");
        self.emit(Event::status_change(&updated, &self.store.task_path(id)))
            .await;
        Ok(updated)
    }

    /// `inprogress -> completed`: stamps `completed_at`, releases the agent.
    pub async fn complete(&self, id: TaskId) -> Result<Task, EngineError> {
        let (task, version) = self.store.get_versioned(id)?;
        self.require_transition(&task, TaskStatus::Completed)?;

        let updated = self.store.update_pinned(id, version, |t| {
            t.status = TaskStatus::Completed;
            t.completed_at = Some(Utc::now());
            t.assigned_agent = None;
        })?;
        info!(task = %id, "task completed");
        self.emit(Event::status_change(&updated, &self.store.task_path(id)))
            .await;
        Ok(updated)
    }

    /// `inprogress -> failed`: stamps `completed_at` and records the error.
    pub async fn fail(&self, id: TaskId, error: &str) -> Result<Task, EngineError> {
        let (task, version) = self.store.get_versioned(id)?;
        self.require_transition(&task, TaskStatus::Failed)?;

        let error = error.to_owned();
        let updated = self.store.update_pinned(id, version, |t| {
            t.status = TaskStatus::Failed;
            t.completed_at = Some(Utc::now());
            t.error_log = Some(error);
        })?;
        info!(task = %id, "task failed");
        self.emit(Event::status_change(&updated, &self.store.task_path(id)))
            .await;
        Ok(updated)
    }

    /// `failed -> pending` (rework): clears the error log and completion
    /// stamp; `started_at` keeps its original value.
    pub async fn rework(&self, id: TaskId) -> Result<Task, EngineError> {
        let (task, version) = self.store.get_versioned(id)?;
        self.require_transition(&task, TaskStatus::Pending)?;

        let updated = self.store.update_pinned(id, version, |t| {
            t.status = TaskStatus::Pending;
            t.error_log = None;
            t.completed_at = None;
        })?;
        info!(task = %id, "task reopened for rework");
        self.emit(Event::status_change(&updated, &self.store.task_path(id)))
            .await;
        Ok(updated)
    }

    /// `{completed, failed} -> archived`: the terminal transition. Moves the
    /// record to the archive atomically, appends the log entry, and emits
    /// `(task_archival, archived)`. On an archival I/O failure the task
    /// keeps its prior active status.
    pub async fn archive(&self, id: TaskId) -> Result<ArchiveRecord, EngineError> {
        let task = self.store.get(id)?;
        if !task.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                id,
                from: task.status,
                to: TaskStatus::Archived,
            });
        }

        let record = self.store.move_to_archive(id)?;
        info!(task = %id, final_status = %record.final_status, "task archived");

        let (archived, _) = self
            .store
            .get_archived(id)
            .unwrap_or((task, record.final_status));
        self.emit(Event::archival(&archived, &record, &self.store.archive_path(id)))
            .await;
        Ok(record)
    }

    /// Run a guarded external operation (e.g. a commit/push) between the
    /// paired `before` and `after` hook events.
    ///
    /// The `before` hooks run fail-fast: if any fails, the operation is
    /// never invoked and the hook error is surfaced; the caller must not
    /// proceed. The `after` hooks run only once the operation succeeds;
    /// their failures are logged and swallowed.
    pub async fn guarded_operation<F, T>(
        &self,
        fields: BTreeMap<String, String>,
        operation: F,
    ) -> Result<T, EngineError>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        let before = Event::git_operation("before", fields.clone());
        self.dispatcher.dispatch(&before).await?;

        let value = operation().map_err(EngineError::Operation)?;

        let after = Event::git_operation("after", fields);
        self.emit(after).await;
        Ok(value)
    }

    fn require_transition(&self, task: &Task, to: TaskStatus) -> Result<(), EngineError> {
        if !TaskStatus::can_transition(task.status, to) {
            return Err(EngineError::InvalidTransition {
                id: task.id,
                from: task.status,
                to,
            });
        }
        Ok(())
    }
}

/// Resolve the store root for a working directory: `<dir>/.taskweave`.
pub fn store_root(project_dir: &Path) -> PathBuf {
    project_dir.join(".taskweave")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use std::fs;
    use tempfile::tempdir;

    fn engine(dir: &Path) -> Engine {
        let config = EngineConfig {
            user_hooks_dir: Some(dir.join("user-hooks")),
            ..Default::default()
        };
        Engine::with_config(dir, config).unwrap()
    }

    fn draft(title: &str, deps: Vec<TaskId>) -> TaskDraft {
        TaskDraft {
            dependencies: deps,
            ..TaskDraft::new(title)
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());

        let a = eng.create_task(TaskDraft::new("a")).await.unwrap();
        let b = eng.create_task(TaskDraft::new("b")).await.unwrap();
        assert_eq!(a.id, TaskId::new(1));
        assert_eq!(b.id, TaskId::new(2));

        let sub = eng
            .create_task(TaskDraft {
                parent: Some(1),
                ..TaskDraft::new("a.1")
            })
            .await
            .unwrap();
        assert_eq!(sub.id, TaskId::sub(1, 1));
    }

    #[tokio::test]
    async fn test_create_with_explicit_duplicate_id_rejected() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        eng.create_task(TaskDraft::new("a")).await.unwrap();

        let err = eng
            .create_task(TaskDraft {
                id: Some(TaskId::new(1)),
                ..TaskDraft::new("dup")
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::DuplicateId { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_requires_completed_dependencies() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());

        // Task 9 pending, task 10 depends on 9: starting 10 is rejected.
        let dep = eng.create_task(TaskDraft::new("dep")).await.unwrap();
        let task = eng
            .create_task(draft("blocked", vec![dep.id]))
            .await
            .unwrap();

        let err = eng.start(task.id, None).await.unwrap_err();
        match err {
            EngineError::DependencyUnmet { unmet, .. } => assert_eq!(unmet, vec![dep.id]),
            other => panic!("expected DependencyUnmet, got {other:?}"),
        }
        // No mutation happened.
        assert_eq!(
            eng.store().get(task.id).unwrap().status,
            TaskStatus::Pending
        );

        // Complete the dependency; now the start goes through.
        eng.start(dep.id, Some("agent-1")).await.unwrap();
        eng.complete(dep.id).await.unwrap();
        let started = eng.start(task.id, Some("agent-2")).await.unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert_eq!(started.assigned_agent.as_deref(), Some("agent-2"));
        assert!(started.started_at.is_some());
    }

    #[tokio::test]
    async fn test_archived_completed_dependency_satisfies() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());

        let dep = eng.create_task(TaskDraft::new("dep")).await.unwrap();
        eng.start(dep.id, None).await.unwrap();
        eng.complete(dep.id).await.unwrap();
        eng.archive(dep.id).await.unwrap();

        let task = eng
            .create_task(draft("follows", vec![dep.id]))
            .await
            .unwrap();
        assert!(eng.start(task.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_transitions_rejected_without_mutation() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let task = eng.create_task(TaskDraft::new("t")).await.unwrap();

        // pending -> completed is not legal.
        let err = eng.complete(task.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        // pending -> archived is not legal either.
        let err = eng.archive(task.id).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(
            eng.store().get(task.id).unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_fail_and_rework_cycle() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let task = eng.create_task(TaskDraft::new("t")).await.unwrap();

        eng.start(task.id, Some("agent")).await.unwrap();
        let failed = eng.fail(task.id, "tests are red").await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_log.as_deref(), Some("tests are red"));
        assert!(failed.completed_at.is_some());

        let reopened = eng.rework(task.id).await.unwrap();
        assert_eq!(reopened.status, TaskStatus::Pending);
        assert!(reopened.error_log.is_none());
        assert!(reopened.completed_at.is_none());
        // started_at survives rework: it is set exactly once.
        assert_eq!(reopened.started_at, failed.started_at);
    }

    #[tokio::test]
    async fn test_cycle_rejected_and_no_edge_persisted() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());

        // 3 transitively depends on 7 via 5; declaring 7 -> 3 must fail.
        let t7 = eng
            .create_task(TaskDraft {
                id: Some(TaskId::new(7)),
                ..TaskDraft::new("seven")
            })
            .await
            .unwrap();
        eng.create_task(TaskDraft {
            id: Some(TaskId::new(5)),
            dependencies: vec![TaskId::new(7)],
            ..TaskDraft::new("five")
        })
        .await
        .unwrap();
        eng.create_task(TaskDraft {
            id: Some(TaskId::new(3)),
            dependencies: vec![TaskId::new(5)],
            ..TaskDraft::new("three")
        })
        .await
        .unwrap();

        let err = eng
            .set_dependencies(t7.id, vec![TaskId::new(3)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
        assert!(eng.store().get(t7.id).unwrap().dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_self_dependency_rejected_at_creation() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());

        let err = eng
            .create_task(TaskDraft {
                id: Some(TaskId::new(1)),
                dependencies: vec![TaskId::new(1)],
                ..TaskDraft::new("selfish")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
        assert!(eng.store().get(TaskId::new(1)).is_err());
    }

    #[tokio::test]
    async fn test_archive_is_irreversible() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let task = eng.create_task(TaskDraft::new("t")).await.unwrap();
        eng.start(task.id, None).await.unwrap();
        eng.complete(task.id).await.unwrap();

        let record = eng.archive(task.id).await.unwrap();
        assert_eq!(record.final_status, TaskStatus::Completed);

        let err = eng.store().get(task.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_status_change_hook_observes_post_transition_state() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();
        let out = dir.path().join("observed.txt");
        fs::write(
            hooks_dir.join("observe.hook.md"),
            format!(
                "---\ntype: task_status_change\ntrigger: completed\n---\n```sh\necho \"{{{{task.id}}}}={{{{task.status}}}}\" > {}\n```\n",
                out.display()
            ),
        )
        .unwrap();

        let eng = engine(dir.path());
        let task = eng.create_task(TaskDraft::new("observed")).await.unwrap();
        eng.start(task.id, None).await.unwrap();
        eng.complete(task.id).await.unwrap();

        let written = fs::read_to_string(&out).unwrap();
        assert_eq!(written.trim(), "1=completed");
    }

    #[tokio::test]
    async fn test_guarded_operation_aborted_by_before_hook() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();
        fs::write(
            hooks_dir.join("gate.hook.md"),
            "---\ntype: git_operation\ntrigger: before\n---\n```sh\necho 'unclean tree' >&2\nexit 1\n```\n",
        )
        .unwrap();

        let eng = engine(dir.path());
        let mut ran = false;
        let result = eng
            .guarded_operation(BTreeMap::new(), || {
                ran = true;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(EngineError::Hook(_))));
        assert!(!ran, "the guarded operation must not run after a failing before hook");
    }

    #[tokio::test]
    async fn test_guarded_operation_runs_after_hooks_on_success() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();
        let marker = dir.path().join("after-ran");
        fs::write(
            hooks_dir.join("post.hook.md"),
            format!(
                "---\ntype: git_operation\ntrigger: after\n---\n```sh\ntouch {}\n```\n",
                marker.display()
            ),
        )
        .unwrap();

        let eng = engine(dir.path());
        let value = eng
            .guarded_operation(BTreeMap::new(), || Ok(42))
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_failing_non_before_hook_never_fails_transition() {
        let dir = tempdir().unwrap();
        let hooks_dir = dir.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();
        fs::write(
            hooks_dir.join("broken.hook.md"),
            "---\ntype: task_status_change\ntrigger: inprogress\n---\n```sh\nexit 9\n```\n",
        )
        .unwrap();

        let eng = engine(dir.path());
        let task = eng.create_task(TaskDraft::new("t")).await.unwrap();
        let started = eng.start(task.id, None).await.unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
    }
}
