//! On-disk task record format.
//!
//! A record is a header block of `key: value` lines terminated by the first
//! blank line, followed by free-text sections the engine stores verbatim.
//! Archived records additionally carry a `final_status` header so dependency
//! resolution can distinguish archived-completed from archived-failed.

use crate::errors::StoreError;
use crate::task::{Priority, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use std::path::Path;

/// A parsed task record.
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub task: Task,
    /// Status held at archival time; present only on archived records.
    pub final_status: Option<TaskStatus>,
}

fn parse_error(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::Parse {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_timestamp(value: &str, key: &str, path: &Path) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| parse_error(path, format!("bad {key} timestamp '{value}': {e}")))
}

/// Parse a record from file content.
pub fn parse(content: &str, path: &Path) -> Result<ParsedRecord, StoreError> {
    let mut lines = content.lines();

    let mut id: Option<TaskId> = None;
    let mut title: Option<String> = None;
    let mut status: Option<TaskStatus> = None;
    let mut final_status: Option<TaskStatus> = None;
    let mut priority = Priority::default();
    let mut feature = String::new();
    let mut commit_type = String::new();
    let mut dependencies: Vec<TaskId> = Vec::new();
    let mut assigned_agent: Option<String> = None;
    let mut created_at: Option<DateTime<Utc>> = None;
    let mut started_at: Option<DateTime<Utc>> = None;
    let mut completed_at: Option<DateTime<Utc>> = None;
    let mut error_log: Option<String> = None;

    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| parse_error(path, format!("header line without ':': '{line}'")))?;
        let key = key.trim();
        let value = value.trim();
        match key {
            "id" => {
                id = Some(
                    value
                        .parse()
                        .map_err(|e| parse_error(path, format!("{e}")))?,
                );
            }
            "title" => title = Some(value.to_string()),
            "status" => {
                status = Some(
                    value
                        .parse()
                        .map_err(|e| parse_error(path, format!("{e}")))?,
                );
            }
            "final_status" => {
                final_status = Some(
                    value
                        .parse()
                        .map_err(|e| parse_error(path, format!("{e}")))?,
                );
            }
            "priority" => {
                priority = value
                    .parse()
                    .map_err(|e| parse_error(path, format!("{e}")))?;
            }
            "feature" => feature = value.to_string(),
            "commit_type" => commit_type = value.to_string(),
            "dependencies" => {
                for part in value.split(',') {
                    let part = part.trim();
                    if part.is_empty() {
                        continue;
                    }
                    dependencies.push(
                        part.parse()
                            .map_err(|e| parse_error(path, format!("{e}")))?,
                    );
                }
            }
            "assigned_agent" => {
                if !value.is_empty() {
                    assigned_agent = Some(value.to_string());
                }
            }
            "created_at" => created_at = Some(parse_timestamp(value, key, path)?),
            "started_at" => started_at = Some(parse_timestamp(value, key, path)?),
            "completed_at" => completed_at = Some(parse_timestamp(value, key, path)?),
            "error_log" => {
                if !value.is_empty() {
                    error_log = Some(value.replace("\\n", "\n"));
                }
            }
            // Unknown header keys are tolerated so records survive additive
            // format changes.
            _ => {}
        }
    }

    let body: String = lines.collect::<Vec<_>>().join("\n");

    let id = id.ok_or_else(|| parse_error(path, "missing required field 'id'"))?;
    let title = title.ok_or_else(|| parse_error(path, "missing required field 'title'"))?;
    let status = status.ok_or_else(|| parse_error(path, "missing required field 'status'"))?;
    let created_at =
        created_at.ok_or_else(|| parse_error(path, "missing required field 'created_at'"))?;

    let mut task = Task {
        id,
        title,
        status,
        priority,
        feature,
        commit_type,
        dependencies,
        assigned_agent,
        created_at,
        started_at,
        completed_at,
        error_log,
        body,
    };
    task.normalize_dependencies();

    Ok(ParsedRecord { task, final_status })
}

/// Render a record to file content. Optional fields are omitted when unset.
pub fn render(task: &Task, final_status: Option<TaskStatus>) -> String {
    let mut out = String::new();
    out.push_str(&format!("id: {}\n", task.id));
    out.push_str(&format!("title: {}\n", task.title));
    out.push_str(&format!("status: {}\n", task.status));
    if let Some(fs) = final_status {
        out.push_str(&format!("final_status: {}\n", fs));
    }
    out.push_str(&format!("priority: {}\n", task.priority));
    if !task.feature.is_empty() {
        out.push_str(&format!("feature: {}\n", task.feature));
    }
    if !task.commit_type.is_empty() {
        out.push_str(&format!("commit_type: {}\n", task.commit_type));
    }
    if !task.dependencies.is_empty() {
        let deps: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
        out.push_str(&format!("dependencies: {}\n", deps.join(", ")));
    }
    if let Some(ref agent) = task.assigned_agent {
        out.push_str(&format!("assigned_agent: {}\n", agent));
    }
    out.push_str(&format!("created_at: {}\n", task.created_at.to_rfc3339()));
    if let Some(started) = task.started_at {
        out.push_str(&format!("started_at: {}\n", started.to_rfc3339()));
    }
    if let Some(completed) = task.completed_at {
        out.push_str(&format!("completed_at: {}\n", completed.to_rfc3339()));
    }
    if let Some(ref err) = task.error_log {
        out.push_str(&format!("error_log: {}\n", err.replace('\n', "\\n")));
    }
    if !task.body.is_empty() {
        out.push('\n');
        out.push_str(&task.body);
        if !task.body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
