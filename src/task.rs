//! Task model: identifiers, status state machine, priority, and the task
//! record itself.
//!
//! A `TaskId` is hierarchical: a root integer, optionally extended with one
//! dotted sub-segment (`12` or `12.3`). Sub-ids are scoped per parent and
//! independently sequential.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Hierarchical task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    root: u32,
    sub: Option<u32>,
}

impl TaskId {
    /// Create a top-level id.
    pub fn new(root: u32) -> Self {
        Self { root, sub: None }
    }

    /// Create a sub-task id scoped under `root`.
    pub fn sub(root: u32, sub: u32) -> Self {
        Self {
            root,
            sub: Some(sub),
        }
    }

    /// The root segment.
    pub fn root(&self) -> u32 {
        self.root
    }

    /// The sub segment, if this is a sub-task id.
    pub fn sub_segment(&self) -> Option<u32> {
        self.sub
    }

    /// Check if this is a top-level id.
    pub fn is_top_level(&self) -> bool {
        self.sub.is_none()
    }

    /// File stem used for on-disk records (`12` or `12.3`).
    pub fn file_stem(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.root, sub),
            None => write!(f, "{}", self.root),
        }
    }
}

impl std::str::FromStr for TaskId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('.') {
            Some((root, sub)) => {
                let root: u32 = root
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid task id '{}'", s))?;
                let sub: u32 = sub
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid task id '{}'", s))?;
                Ok(TaskId::sub(root, sub))
            }
            None => {
                let root: u32 = s
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid task id '{}'", s))?;
                Ok(TaskId::new(root))
            }
        }
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Archived,
}

impl TaskStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "inprogress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Archived => "archived",
        }
    }

    /// Check whether `from -> to` is a legal lifecycle transition.
    ///
    /// The archival transition (`completed | failed -> archived`) is included
    /// here even though it is performed by the archive manager rather than a
    /// plain status update.
    pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, Pending)
                | (Completed, Archived)
                | (Failed, Archived)
        )
    }

    /// Terminal statuses are eligible for archival.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "inprogress" | "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "archived" => Ok(TaskStatus::Archived),
            _ => anyhow::bail!(
                "Invalid task status '{}'. Valid values: pending, inprogress, completed, failed, archived",
                s
            ),
        }
    }
}

/// Task priority, lower variants sort first when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => anyhow::bail!(
                "Invalid priority '{}'. Valid values: critical, high, medium, low",
                s
            ),
        }
    }
}

/// A trackable unit of work.
///
/// The header fields are parsed and rewritten by the store; `body` holds the
/// free-text sections (description, details, verification strategy) verbatim
/// and is never interpreted by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub feature: String,
    pub commit_type: String,
    /// Sorted, deduplicated dependency ids.
    pub dependencies: Vec<TaskId>,
    pub assigned_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_log: Option<String>,
    #[serde(skip)]
    pub body: String,
}

impl Task {
    /// Create a new pending task with defaults for everything but id/title.
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: TaskStatus::Pending,
            priority: Priority::default(),
            feature: String::new(),
            commit_type: String::new(),
            dependencies: Vec::new(),
            assigned_agent: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_log: None,
            body: String::new(),
        }
    }

    /// Normalise the dependency list: sorted, deduplicated.
    pub fn normalize_dependencies(&mut self) {
        self.dependencies.sort();
        self.dependencies.dedup();
    }
}

/// Next free top-level id given the ids already in use (active + archived).
///
/// With existing roots {1, 2, 4} the next id is 5; with none it is 1.
pub fn next_top_level_id<I: IntoIterator<Item = TaskId>>(existing: I) -> TaskId {
    let max = existing.into_iter().map(|id| id.root()).max().unwrap_or(0);
    TaskId::new(max + 1)
}

/// Next free sub-id under `parent`, scoped per parent and independently
/// sequential.
pub fn next_sub_id<I: IntoIterator<Item = TaskId>>(existing: I, parent: u32) -> TaskId {
    let max = existing
        .into_iter()
        .filter(|id| id.root() == parent)
        .filter_map(|id| id.sub_segment())
        .max()
        .unwrap_or(0);
    TaskId::sub(parent, max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_display_and_parse() {
        assert_eq!(TaskId::new(12).to_string(), "12");
        assert_eq!(TaskId::sub(12, 3).to_string(), "12.3");
        assert_eq!("12".parse::<TaskId>().unwrap(), TaskId::new(12));
        assert_eq!("12.3".parse::<TaskId>().unwrap(), TaskId::sub(12, 3));
        assert_eq!(" 7 ".parse::<TaskId>().unwrap(), TaskId::new(7));
    }

    #[test]
    fn test_task_id_parse_invalid() {
        assert!("".parse::<TaskId>().is_err());
        assert!("a".parse::<TaskId>().is_err());
        assert!("1.2.3".parse::<TaskId>().is_err());
        assert!("1.".parse::<TaskId>().is_err());
        assert!("-1".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_task_id_ordering() {
        let mut ids = vec![TaskId::sub(2, 1), TaskId::new(10), TaskId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![TaskId::new(2), TaskId::sub(2, 1), TaskId::new(10)]);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            "inprogress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert_eq!(
            "in_progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_transition_table() {
        use TaskStatus::*;
        assert!(TaskStatus::can_transition(Pending, InProgress));
        assert!(TaskStatus::can_transition(InProgress, Completed));
        assert!(TaskStatus::can_transition(InProgress, Failed));
        assert!(TaskStatus::can_transition(Failed, Pending));
        assert!(TaskStatus::can_transition(Completed, Archived));
        assert!(TaskStatus::can_transition(Failed, Archived));

        assert!(!TaskStatus::can_transition(Pending, Completed));
        assert!(!TaskStatus::can_transition(Completed, Pending));
        assert!(!TaskStatus::can_transition(Pending, Archived));
        assert!(!TaskStatus::can_transition(Archived, Pending));
        assert!(!TaskStatus::can_transition(Completed, Failed));
    }

    #[test]
    fn test_next_top_level_id_skips_to_max_plus_one() {
        let existing = vec![TaskId::new(1), TaskId::new(2), TaskId::new(4)];
        assert_eq!(next_top_level_id(existing), TaskId::new(5));
        assert_eq!(next_top_level_id(Vec::new()), TaskId::new(1));
    }

    #[test]
    fn test_next_sub_id_scoped_per_parent() {
        let existing = vec![
            TaskId::new(1),
            TaskId::sub(1, 1),
            TaskId::sub(1, 2),
            TaskId::sub(2, 5),
        ];
        assert_eq!(next_sub_id(existing.clone(), 1), TaskId::sub(1, 3));
        assert_eq!(next_sub_id(existing.clone(), 2), TaskId::sub(2, 6));
        assert_eq!(next_sub_id(existing, 3), TaskId::sub(3, 1));
    }

    #[test]
    fn test_normalize_dependencies() {
        let mut task = Task::new(TaskId::new(1), "t");
        task.dependencies = vec![TaskId::new(3), TaskId::new(2), TaskId::new(3)];
        task.normalize_dependencies();
        assert_eq!(task.dependencies, vec![TaskId::new(2), TaskId::new(3)]);
    }

    #[test]
    fn test_priority_default_and_parse() {
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
