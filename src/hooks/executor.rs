//! Hook execution engine.
//!
//! Each scheduled hook's action template is expanded against the event
//! context, then handed to the `CommandRunner` capability. Hooks for one
//! event run strictly in order, never in parallel; a `before` trigger is
//! fail-fast, every other trigger logs failures and continues.

use super::definition::HookDefinition;
use super::types::{Event, ExecutionResult};
use crate::errors::HookError;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of running one command through a `CommandRunner`.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut,
}

/// Narrow capability for running a hook's expanded action string.
///
/// The engine treats the runner as opaque; swapping it changes how commands
/// execute (shell, sandbox, test double) without touching hook semantics.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, limit: Duration) -> std::io::Result<RunOutcome>;
}

/// Default runner: `sh -c` in a fixed working directory. The child is killed
/// when its future is dropped, so a timeout does not leak the process.
pub struct ShellRunner {
    working_dir: std::path::PathBuf,
}

impl ShellRunner {
    pub fn new(working_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, limit: Duration) -> std::io::Result<RunOutcome> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(RunOutcome::Completed {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => Ok(RunOutcome::TimedOut),
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("valid regex"))
}

/// Expand every `{{namespace.field}}` placeholder in `template` from the
/// event context. A placeholder with no matching entry becomes an empty
/// string, never a literal remnant and never an error.
pub fn substitute(template: &str, context: &BTreeMap<String, String>) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            context.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Runs an ordered hook sequence for one event.
pub struct HookExecutor {
    runner: Arc<dyn CommandRunner>,
    default_timeout: Duration,
}

impl HookExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, default_timeout: Duration) -> Self {
        Self {
            runner,
            default_timeout,
        }
    }

    fn effective_timeout(&self, hook: &HookDefinition) -> Duration {
        hook.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Execute `hooks` in order.
    ///
    /// On a `before` trigger the first failing hook (non-zero exit or
    /// timeout) stops processing immediately and is surfaced as an error;
    /// the caller must abort the guarded operation. On any other trigger a
    /// failure is recorded, logged, and execution continues; it is never
    /// fatal to the lifecycle caller.
    pub async fn run(
        &self,
        hooks: &[&HookDefinition],
        event: &Event,
    ) -> Result<Vec<ExecutionResult>, HookError> {
        let fail_fast = event.is_fail_fast();
        let mut results = Vec::with_capacity(hooks.len());

        for hook in hooks {
            let command = substitute(&hook.command, &event.context);
            let limit = self.effective_timeout(hook);
            debug!(
                hook = %hook.source_name,
                event = %event.kind,
                trigger = %event.trigger,
                timeout_secs = limit.as_secs(),
                "executing hook"
            );

            let started = Instant::now();
            let outcome = self.runner.run(&command, limit).await;
            let duration = started.elapsed();

            let result = match outcome {
                Ok(RunOutcome::Completed {
                    exit_code,
                    stdout,
                    stderr,
                }) => ExecutionResult {
                    hook: hook.source_name.clone(),
                    exit_code,
                    stdout,
                    stderr,
                    duration,
                    timed_out: false,
                },
                Ok(RunOutcome::TimedOut) => ExecutionResult {
                    hook: hook.source_name.clone(),
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: format!("timed out after {}s", limit.as_secs()),
                    duration,
                    timed_out: true,
                },
                Err(err) => ExecutionResult {
                    hook: hook.source_name.clone(),
                    exit_code: 127,
                    stdout: String::new(),
                    stderr: err.to_string(),
                    duration,
                    timed_out: false,
                },
            };

            if !result.success() {
                if fail_fast {
                    return Err(if result.timed_out {
                        HookError::Timeout {
                            hook: result.hook,
                            timeout_secs: limit.as_secs(),
                        }
                    } else {
                        HookError::Execution {
                            hook: result.hook,
                            exit_code: result.exit_code,
                            stderr: result.stderr,
                        }
                    });
                }
                warn!(
                    hook = %result.hook,
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    "hook failed; continuing"
                );
            }

            results.push(result);
        }

        Ok(results)
    }
}
