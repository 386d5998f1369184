//! Hook selection and ordering.
//!
//! Filtering keeps enabled definitions whose (type, trigger) match the
//! event. Ordering is total: priority ascending, ties broken by tier
//! (system before user), remaining ties by source name. The sort is stable,
//! so repeated calls on the same input always produce the same sequence.

use super::definition::HookDefinition;
use super::types::Event;

/// Select and order the hooks to run for `event`.
pub fn select<'a>(hooks: &'a [HookDefinition], event: &Event) -> Vec<&'a HookDefinition> {
    let mut selected: Vec<&HookDefinition> = hooks
        .iter()
        .filter(|h| h.enabled && h.matches(event.kind, &event.trigger))
        .collect();
    selected.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.tier.cmp(&b.tier))
            .then_with(|| a.source_name.cmp(&b.source_name))
    });
    selected
}
