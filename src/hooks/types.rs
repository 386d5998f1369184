//! Hook event types.
//!
//! - `EventKind`: the lifecycle event categories that can trigger hooks
//! - `Tier`: provenance of a definition (system before user on ties)
//! - `Event`: one occurrence, with its substitution context
//! - `ExecutionResult`: per-hook outcome used for logging and fail-fast

use crate::store::ArchiveRecord;
use crate::task::Task;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Lifecycle event categories.
///
/// Each kind owns one variable namespace: `task.*` for task events,
/// `plan.*` for plan events, `git.*` for the paired before/after operation.
/// Namespaces are never mixed across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A task changed status (trigger is the new status value)
    TaskStatusChange,
    /// A task was moved to the archive (trigger is `archived`)
    TaskArchival,
    /// The planning collaborator produced a task (trigger is `task_created`)
    PlanUpdate,
    /// Paired guard around an external versioned-publish operation
    /// (trigger is `before` or `after`)
    GitOperation,
}

impl EventKind {
    /// Returns all event kinds.
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::TaskStatusChange,
            EventKind::TaskArchival,
            EventKind::PlanUpdate,
            EventKind::GitOperation,
        ]
    }

    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStatusChange => "task_status_change",
            EventKind::TaskArchival => "task_archival",
            EventKind::PlanUpdate => "plan_update",
            EventKind::GitOperation => "git_operation",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task_status_change" => Ok(EventKind::TaskStatusChange),
            "task_archival" => Ok(EventKind::TaskArchival),
            "plan_update" => Ok(EventKind::PlanUpdate),
            "git_operation" => Ok(EventKind::GitOperation),
            _ => anyhow::bail!(
                "Invalid event type '{}'. Valid values: task_status_change, task_archival, plan_update, git_operation",
                s
            ),
        }
    }
}

/// Provenance of a hook definition. System-tier entries run before user-tier
/// entries of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    System,
    User,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::System => "system",
            Tier::User => "user",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single lifecycle occurrence, produced once per lifecycle action and
/// consumed synchronously by the scheduler/executor pair.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub trigger: String,
    /// Dotted variable names to string values, scoped to the event's kind.
    pub context: BTreeMap<String, String>,
}

impl Event {
    fn task_context(task: &Task, path: &Path) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        context.insert("task.id".into(), task.id.to_string());
        context.insert("task.title".into(), task.title.clone());
        context.insert("task.status".into(), task.status.to_string());
        context.insert("task.priority".into(), task.priority.to_string());
        context.insert("task.commit_type".into(), task.commit_type.clone());
        context.insert("task.feature".into(), task.feature.clone());
        context.insert("task.path".into(), path.display().to_string());
        context
    }

    /// Event for a committed status transition. The trigger is the
    /// post-transition status, so hooks observe the new state.
    pub fn status_change(task: &Task, path: &Path) -> Self {
        Self {
            kind: EventKind::TaskStatusChange,
            trigger: task.status.to_string(),
            context: Self::task_context(task, path),
        }
    }

    /// Event for a completed archival move.
    pub fn archival(task: &Task, record: &ArchiveRecord, path: &Path) -> Self {
        let mut context = Self::task_context(task, path);
        context.insert("task.final_status".into(), record.final_status.to_string());
        Self {
            kind: EventKind::TaskArchival,
            trigger: "archived".into(),
            context,
        }
    }

    /// Event for a task produced by the planning collaborator.
    pub fn task_created(task: &Task, path: &Path) -> Self {
        let mut context = BTreeMap::new();
        context.insert("plan.task_id".into(), task.id.to_string());
        context.insert("plan.title".into(), task.title.clone());
        context.insert("plan.feature".into(), task.feature.clone());
        context.insert("plan.priority".into(), task.priority.to_string());
        context.insert("plan.path".into(), path.display().to_string());
        Self {
            kind: EventKind::PlanUpdate,
            trigger: "task_created".into(),
            context,
        }
    }

    /// Event for one side of the guarded external operation. Fields are
    /// exposed under the `git.*` namespace.
    pub fn git_operation<I, K, V>(trigger: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let context = fields
            .into_iter()
            .map(|(k, v)| (format!("git.{}", k.into()), v.into()))
            .collect();
        Self {
            kind: EventKind::GitOperation,
            trigger: trigger.into(),
            context,
        }
    }

    /// Whether a hook failure on this event must abort the guarded
    /// operation and halt remaining hooks.
    pub fn is_fail_fast(&self) -> bool {
        self.trigger == "before"
    }
}

/// Per-hook outcome. Not persisted beyond the triggering operation; the
/// dispatcher logs it and the executor uses it for fail-fast decisions.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Source name of the definition that ran.
    pub hook: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip)]
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    /// A hook succeeded iff it completed within its timeout and exited zero.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}
