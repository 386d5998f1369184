//! Append-only archive log.
//!
//! One line per archival event, `|`-separated, never rewritten:
//! `task_id|final_status|archived_at|title|feature|commit_type`

use crate::task::{Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Immutable summary of an archival event.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveRecord {
    pub task_id: TaskId,
    /// Status the task held when it was archived (completed or failed).
    pub final_status: TaskStatus,
    pub archived_at: DateTime<Utc>,
    pub title: String,
    pub feature: String,
    pub commit_type: String,
}

impl ArchiveRecord {
    /// Build a record from the task as it stands at archival time.
    pub fn from_task(task: &Task, archived_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            final_status: task.status,
            archived_at,
            title: task.title.clone(),
            feature: task.feature.clone(),
            commit_type: task.commit_type.clone(),
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}\n",
            self.task_id,
            self.final_status,
            self.archived_at.to_rfc3339(),
            self.title,
            self.feature,
            self.commit_type
        )
    }

    fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(6, '|');
        let task_id = parts.next()?.parse().ok()?;
        let final_status = parts.next()?.parse().ok()?;
        let archived_at = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Utc);
        let title = parts.next()?.to_string();
        let feature = parts.next().unwrap_or_default().to_string();
        let commit_type = parts.next().unwrap_or_default().to_string();
        Some(Self {
            task_id,
            final_status,
            archived_at,
            title,
            feature,
            commit_type,
        })
    }
}

/// Append one record to the log file, creating it on first use.
pub fn append(log_path: &Path, record: &ArchiveRecord) -> std::io::Result<()> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?
        .write_all(record.to_line().as_bytes())
}

/// Read every record from the log, oldest first. Lines that do not parse are
/// skipped.
pub fn read_log(log_path: &Path) -> std::io::Result<Vec<ArchiveRecord>> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(log_path)?;
    Ok(content.lines().filter_map(ArchiveRecord::parse_line).collect())
}
