//! Two-tier hook discovery.
//!
//! Definitions live in two ordered roots injected at construction: the
//! system tier is always scanned before the user tier. Each root is scanned
//! non-recursively for `*.hook.md` files, in file-name order so repeated
//! scans are deterministic. Discovery runs fresh on every event; the engine
//! never caches a stale hook set.

use super::definition::{self, HookDefinition};
use super::types::Tier;
use crate::errors::HookError;
use std::fs;
use std::path::{Path, PathBuf};

const HOOK_SUFFIX: &str = ".hook.md";

/// Result of one discovery pass: every well-formed definition (disabled ones
/// included, flagged by their `enabled` field) plus the errors for the
/// definitions that were skipped.
#[derive(Debug, Default)]
pub struct Discovery {
    pub hooks: Vec<HookDefinition>,
    pub errors: Vec<HookError>,
}

/// Scans the two definition sources.
pub struct HookRegistry {
    system_root: PathBuf,
    user_root: PathBuf,
}

impl HookRegistry {
    /// Create a registry over explicit system- and user-tier roots.
    pub fn new(system_root: impl Into<PathBuf>, user_root: impl Into<PathBuf>) -> Self {
        Self {
            system_root: system_root.into(),
            user_root: user_root.into(),
        }
    }

    /// Read every definition, system tier first. A malformed definition is
    /// reported in `errors` and skipped; it never aborts discovery of the
    /// remaining definitions. Missing roots simply contribute nothing.
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        scan_root(&self.system_root, Tier::System, &mut discovery);
        scan_root(&self.user_root, Tier::User, &mut discovery);
        discovery
    }
}

fn scan_root(root: &Path, tier: Tier, out: &mut Discovery) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && hook_source_name(p).is_some())
        .collect();
    paths.sort();

    for path in paths {
        let Some(source_name) = hook_source_name(&path) else {
            continue;
        };
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                out.errors.push(HookError::MalformedDefinition {
                    path: path.clone(),
                    reason: format!("unreadable: {err}"),
                });
                continue;
            }
        };
        match definition::parse(&content, tier, &source_name, &path) {
            Ok(hook) => out.hooks.push(hook),
            Err(err) => out.errors.push(err),
        }
    }
}

/// Source name for a definition path: the file name with the `.hook.md`
/// suffix stripped. Files not matching the naming convention are ignored.
fn hook_source_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(HOOK_SUFFIX)?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::types::EventKind;
    use tempfile::tempdir;

    fn write_hook(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(format!("{name}.hook.md")), body).unwrap();
    }

    fn valid_hook(trigger: &str, priority: i32) -> String {
        format!(
            "---\ntype: task_status_change\ntrigger: {trigger}\npriority: {priority}\n---\n```sh\ntrue\n```\n"
        )
    }

    #[test]
    fn test_discover_empty_roots() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        let registry = HookRegistry::new(sys.path(), user.path());
        let discovery = registry.discover();
        assert!(discovery.hooks.is_empty());
        assert!(discovery.errors.is_empty());
    }

    #[test]
    fn test_discover_missing_roots_is_not_an_error() {
        let registry = HookRegistry::new("/nonexistent/system", "/nonexistent/user");
        let discovery = registry.discover();
        assert!(discovery.hooks.is_empty());
        assert!(discovery.errors.is_empty());
    }

    #[test]
    fn test_discover_system_before_user() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        write_hook(sys.path(), "a-check", &valid_hook("completed", 10));
        write_hook(user.path(), "b-notify", &valid_hook("completed", 10));

        let registry = HookRegistry::new(sys.path(), user.path());
        let discovery = registry.discover();
        assert_eq!(discovery.hooks.len(), 2);
        assert_eq!(discovery.hooks[0].tier, Tier::System);
        assert_eq!(discovery.hooks[0].source_name, "a-check");
        assert_eq!(discovery.hooks[1].tier, Tier::User);
    }

    #[test]
    fn test_discover_sorted_within_root() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        write_hook(sys.path(), "zeta", &valid_hook("completed", 1));
        write_hook(sys.path(), "alpha", &valid_hook("completed", 1));

        let registry = HookRegistry::new(sys.path(), user.path());
        let discovery = registry.discover();
        assert_eq!(discovery.hooks[0].source_name, "alpha");
        assert_eq!(discovery.hooks[1].source_name, "zeta");
    }

    #[test]
    fn test_malformed_definition_skipped_not_fatal() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        write_hook(sys.path(), "bad", "---\ntrigger: completed\n---\n```sh\ntrue\n```\n");
        write_hook(sys.path(), "good", &valid_hook("completed", 5));

        let registry = HookRegistry::new(sys.path(), user.path());
        let discovery = registry.discover();
        assert_eq!(discovery.hooks.len(), 1);
        assert_eq!(discovery.hooks[0].source_name, "good");
        assert_eq!(discovery.errors.len(), 1);
        assert!(discovery.errors[0].to_string().contains("type"));
    }

    #[test]
    fn test_disabled_definitions_retained_but_flagged() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        write_hook(
            sys.path(),
            "off",
            "---\ntype: task_status_change\ntrigger: completed\nenabled: false\n---\n```sh\ntrue\n```\n",
        );

        let registry = HookRegistry::new(sys.path(), user.path());
        let discovery = registry.discover();
        assert_eq!(discovery.hooks.len(), 1);
        assert!(!discovery.hooks[0].enabled);
    }

    #[test]
    fn test_non_hook_files_ignored() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        fs::write(sys.path().join("README.md"), "not a hook").unwrap();
        fs::write(sys.path().join("notes.txt"), "nope").unwrap();
        write_hook(sys.path(), "real", &valid_hook("failed", 1));

        let registry = HookRegistry::new(sys.path(), user.path());
        let discovery = registry.discover();
        assert_eq!(discovery.hooks.len(), 1);
        assert!(discovery.errors.is_empty());
    }

    #[test]
    fn test_subdirectories_not_scanned() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        let nested = sys.path().join("nested");
        fs::create_dir(&nested).unwrap();
        write_hook(&nested, "hidden", &valid_hook("completed", 1));

        let registry = HookRegistry::new(sys.path(), user.path());
        assert!(registry.discover().hooks.is_empty());
    }

    #[test]
    fn test_fresh_discovery_sees_new_definitions() {
        let sys = tempdir().unwrap();
        let user = tempdir().unwrap();
        let registry = HookRegistry::new(sys.path(), user.path());
        assert!(registry.discover().hooks.is_empty());

        write_hook(sys.path(), "late", &valid_hook("completed", 1));
        let discovery = registry.discover();
        assert_eq!(discovery.hooks.len(), 1);
        assert_eq!(discovery.hooks[0].kind, EventKind::TaskStatusChange);
    }
}
