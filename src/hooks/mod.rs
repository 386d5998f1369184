//! Event-driven hook automation.
//!
//! Definitions are discovered from two ordered roots, selected and ordered
//! per event, then executed through the `CommandRunner` capability. The
//! `HookDispatcher` ties the three stages together and is the engine's only
//! entry point into hook execution.

pub mod definition;
pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use definition::HookDefinition;
pub use executor::{CommandRunner, HookExecutor, ShellRunner};
pub use registry::{Discovery, HookRegistry};
pub use types::{Event, EventKind, ExecutionResult, Tier};

use crate::errors::HookError;
use tracing::{debug, info, warn};

/// Discovers, schedules, and executes hooks for one event at a time.
///
/// Definitions are re-read on every dispatch so edits take effect
/// immediately; the engine never works from a stale cache.
pub struct HookDispatcher {
    registry: HookRegistry,
    executor: HookExecutor,
    /// Global kill-switch: when false no hook ever runs, while lifecycle
    /// transitions proceed untouched.
    enabled: bool,
}

impl HookDispatcher {
    pub fn new(registry: HookRegistry, executor: HookExecutor, enabled: bool) -> Self {
        Self {
            registry,
            executor,
            enabled,
        }
    }

    /// Run every hook matching `event`, in order.
    ///
    /// Errors from this method follow the before-trigger fail-fast policy of
    /// `HookExecutor::run`; discovery problems are reported as warnings and
    /// never fail the dispatch.
    pub async fn dispatch(&self, event: &Event) -> Result<Vec<ExecutionResult>, HookError> {
        if !self.enabled {
            debug!(event = %event.kind, trigger = %event.trigger, "hook execution disabled");
            return Ok(Vec::new());
        }

        let discovery = self.registry.discover();
        for err in &discovery.errors {
            warn!(%err, "skipping malformed hook definition");
        }

        let selected = scheduler::select(&discovery.hooks, event);
        if selected.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            event = %event.kind,
            trigger = %event.trigger,
            hooks = selected.len(),
            "dispatching hooks"
        );

        let results = self.executor.run(&selected, event).await?;
        for result in &results {
            debug!(
                hook = %result.hook,
                exit_code = result.exit_code,
                duration_ms = result.duration.as_millis() as u64,
                "hook finished"
            );
        }
        Ok(results)
    }

    /// One discovery pass without executing anything; used by the CLI to
    /// inspect and validate the configured hook set.
    pub fn inspect(&self) -> Discovery {
        self.registry.discover()
    }
}
