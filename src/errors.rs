//! Typed error hierarchy for the taskweave engine.
//!
//! Four top-level enums cover the four subsystems:
//! - `StoreError` — task storage and archival failures
//! - `HookError` — hook discovery and execution failures
//! - `EngineError` — lifecycle transition failures
//! - `ConfigError` — engine configuration failures

use crate::task::{TaskId, TaskStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the task store (active storage and archive).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {id} already exists")]
    DuplicateId { id: TaskId },

    #[error("task {id} not found")]
    NotFound { id: TaskId },

    #[error("task {id} was modified concurrently")]
    ConcurrentModification { id: TaskId },

    #[error("malformed task record at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("archival of task {id} failed: {source}")]
    ArchiveIo {
        id: TaskId,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the hook subsystem.
///
/// `MalformedDefinition` is recovered locally during discovery: the offending
/// definition is skipped and the rest still load. `Execution` and `Timeout`
/// are surfaced to the caller only from a `before` trigger; on every other
/// trigger they are logged and swallowed.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("malformed hook definition at {path}: {reason}")]
    MalformedDefinition { path: PathBuf, reason: String },

    #[error("hook '{hook}' failed with exit code {exit_code}: {stderr}")]
    Execution {
        hook: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("hook '{hook}' timed out after {timeout_secs}s")]
    Timeout { hook: String, timeout_secs: u64 },
}

/// Errors from lifecycle operations on the engine.
///
/// Structural failures (invalid transition, unmet dependency, cycle) are
/// returned before any state mutation occurs; no partial transition is ever
/// committed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {id} has unmet dependencies")]
    DependencyUnmet { id: TaskId, unmet: Vec<TaskId> },

    #[error("dependency declaration for task {id} would close a cycle")]
    CyclicDependency { id: TaskId, path: Vec<TaskId> },

    #[error("guarded operation failed")]
    Operation(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors loading the engine configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_duplicate_id_carries_id() {
        let err = StoreError::DuplicateId { id: TaskId::new(7) };
        match &err {
            StoreError::DuplicateId { id } => assert_eq!(id.to_string(), "7"),
            _ => panic!("Expected DuplicateId variant"),
        }
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn engine_error_converts_from_store_error() {
        let inner = StoreError::NotFound {
            id: TaskId::sub(3, 1),
        };
        let err: EngineError = inner.into();
        match &err {
            EngineError::Store(StoreError::NotFound { id }) => {
                assert_eq!(id.to_string(), "3.1");
            }
            _ => panic!("Expected EngineError::Store(NotFound)"),
        }
    }

    #[test]
    fn hook_timeout_message_names_hook_and_limit() {
        let err = HookError::Timeout {
            hook: "pre-push-check".into(),
            timeout_secs: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("pre-push-check"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn invalid_transition_message_shows_both_states() {
        let err = EngineError::InvalidTransition {
            id: TaskId::new(2),
            from: TaskStatus::Pending,
            to: TaskStatus::Completed,
        };
        let msg = err.to_string();
        assert!(msg.contains("pending"));
        assert!(msg.contains("completed"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::NotFound { id: TaskId::new(1) });
        assert_std_error(&HookError::Timeout {
            hook: "x".into(),
            timeout_secs: 1,
        });
        assert_std_error(&EngineError::DependencyUnmet {
            id: TaskId::new(1),
            unmet: vec![TaskId::new(2)],
        });
    }
}
