//! Hook definition parsing and validation.
//!
//! A definition file (`<name>.hook.md`) is a `---`-fenced header block
//! (`type`, `trigger`, `priority`, `enabled`, `timeout_secs`, `description`)
//! followed by a body containing exactly one fenced command block.
//!
//! A definition missing `type` or `trigger`, or with zero or multiple
//! command blocks, is malformed: skipped and reported, never fatal to the
//! discovery of the remaining definitions.

use super::types::{EventKind, Tier};
use crate::errors::HookError;
use serde::Serialize;
use std::path::Path;

const DEFAULT_PRIORITY: i32 = 100;

/// A single hook definition. Loaded fresh on every event and never mutated
/// by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct HookDefinition {
    /// The event category that triggers this hook
    pub kind: EventKind,
    /// Event subtype: a status value, `archived`, `task_created`,
    /// `before` or `after`
    pub trigger: String,
    /// Lower runs first
    pub priority: i32,
    /// Disabled definitions are discovered but never scheduled
    pub enabled: bool,
    /// Provenance, used as the first tie-break after priority
    pub tier: Tier,
    /// File stem, used as the final tie-break
    pub source_name: String,
    /// The single command block, with `{{namespace.field}}` placeholders
    pub command: String,
    /// Per-hook timeout override in seconds
    pub timeout_secs: Option<u64>,
    pub description: Option<String>,
}

impl HookDefinition {
    /// Check whether this definition matches an event filter.
    pub fn matches(&self, kind: EventKind, trigger: &str) -> bool {
        self.kind == kind && self.trigger == trigger
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> HookError {
    HookError::MalformedDefinition {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse one definition file.
pub fn parse(
    content: &str,
    tier: Tier,
    source_name: &str,
    path: &Path,
) -> Result<HookDefinition, HookError> {
    let mut lines = content.lines().peekable();

    // Skip leading blank lines, then require the opening fence.
    while lines.peek().is_some_and(|l| l.trim().is_empty()) {
        lines.next();
    }
    if lines.next().map(str::trim) != Some("---") {
        return Err(malformed(path, "missing '---' header block"));
    }

    let mut kind: Option<EventKind> = None;
    let mut trigger: Option<String> = None;
    let mut priority = DEFAULT_PRIORITY;
    let mut enabled = true;
    let mut timeout_secs: Option<u64> = None;
    let mut description: Option<String> = None;

    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim() == "---" {
            closed = true;
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(malformed(path, format!("header line without ':': '{line}'")));
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "type" => {
                kind = Some(value.parse().map_err(|e| malformed(path, format!("{e}")))?);
            }
            "trigger" => trigger = Some(value.to_string()),
            "priority" => {
                priority = value
                    .parse()
                    .map_err(|_| malformed(path, format!("invalid priority '{value}'")))?;
            }
            "enabled" => {
                enabled = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(malformed(path, format!("invalid enabled flag '{value}'"))),
                };
            }
            "timeout_secs" => {
                timeout_secs = Some(
                    value
                        .parse()
                        .map_err(|_| malformed(path, format!("invalid timeout_secs '{value}'")))?,
                );
            }
            "description" => description = Some(value.to_string()),
            _ => {}
        }
    }
    if !closed {
        return Err(malformed(path, "unterminated '---' header block"));
    }

    let kind = kind.ok_or_else(|| malformed(path, "missing required field 'type'"))?;
    let trigger = trigger.ok_or_else(|| malformed(path, "missing required field 'trigger'"))?;
    if trigger.is_empty() {
        return Err(malformed(path, "empty 'trigger' field"));
    }

    let command = extract_command_block(lines, path)?;

    Ok(HookDefinition {
        kind,
        trigger,
        priority,
        enabled,
        tier,
        source_name: source_name.to_string(),
        command,
        timeout_secs,
        description,
    })
}

/// The body must contain exactly one fenced command block.
fn extract_command_block<'a, I>(lines: I, path: &Path) -> Result<String, HookError>
where
    I: Iterator<Item = &'a str>,
{
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in lines {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(block) => blocks.push(block.join("\n")),
                None => current = Some(Vec::new()),
            }
        } else if let Some(ref mut block) = current {
            block.push(line);
        }
    }
    if current.is_some() {
        return Err(malformed(path, "unterminated command block"));
    }

    match blocks.len() {
        0 => Err(malformed(path, "no command block in body")),
        1 => {
            let command = blocks.remove(0).trim().to_string();
            if command.is_empty() {
                Err(malformed(path, "empty command block"))
            } else {
                Ok(command)
            }
        }
        n => Err(malformed(path, format!("expected one command block, found {n}"))),
    }
}
