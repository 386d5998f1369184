//! CLI command implementations.
//!
//! Each handler opens the engine at `<project>/.taskweave` and prints a
//! short, styled confirmation. Lifecycle errors surface as plain anyhow
//! errors with the engine's message.

use anyhow::{Context, Result, bail};
use console::style;
use std::collections::BTreeMap;
use std::path::Path;
use taskweave::config::{CONFIG_FILE, EngineConfig};
use taskweave::engine::{Engine, TaskDraft, store_root};
use taskweave::store::archive;
use taskweave::task::{Task, TaskId, TaskStatus};

fn open_engine(project_dir: &Path) -> Result<Engine> {
    let root = store_root(project_dir);
    if !root.exists() {
        bail!(
            "No task store at {}. Run 'taskweave init' first.",
            root.display()
        );
    }
    Ok(Engine::open(&root)?)
}

fn parse_id(id: &str) -> Result<TaskId> {
    id.parse()
}

fn parse_ids(ids: &[String]) -> Result<Vec<TaskId>> {
    ids.iter().map(|id| parse_id(id)).collect()
}

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let root = store_root(project_dir);
    std::fs::create_dir_all(root.join("tasks"))?;
    std::fs::create_dir_all(root.join("archive"))?;
    std::fs::create_dir_all(root.join("hooks"))?;

    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        let config = toml::to_string_pretty(&EngineConfig::default())
            .context("Failed to serialize default config")?;
        std::fs::write(&config_path, config)?;
    }

    println!(
        "{} task store at {}",
        style("Initialized").green().bold(),
        root.display()
    );
    println!("  system hooks: {}", root.join("hooks").display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_create(
    project_dir: &Path,
    title: &str,
    parent: Option<u32>,
    dependencies: &[String],
    priority: &str,
    feature: Option<&str>,
    commit_type: Option<&str>,
) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let draft = TaskDraft {
        title: title.to_string(),
        id: None,
        parent,
        priority: priority.parse()?,
        feature: feature.unwrap_or_default().to_string(),
        commit_type: commit_type.unwrap_or_default().to_string(),
        dependencies: parse_ids(dependencies)?,
        body: String::new(),
    };

    let task = engine.create_task(draft).await?;
    println!(
        "{} task {} '{}'",
        style("Created").green().bold(),
        style(task.id).cyan(),
        task.title
    );
    Ok(())
}

pub async fn cmd_start(project_dir: &Path, id: &str, agent: Option<&str>) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let task = engine.start(parse_id(id)?, agent).await?;
    println!(
        "{} task {} '{}'{}",
        style("Started").green().bold(),
        style(task.id).cyan(),
        task.title,
        task.assigned_agent
            .as_deref()
            .map(|a| format!(" (agent: {a})"))
            .unwrap_or_default()
    );
    Ok(())
}

pub async fn cmd_complete(project_dir: &Path, id: &str) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let task = engine.complete(parse_id(id)?).await?;
    println!(
        "{} task {} '{}'",
        style("Completed").green().bold(),
        style(task.id).cyan(),
        task.title
    );
    Ok(())
}

pub async fn cmd_fail(project_dir: &Path, id: &str, reason: &str) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let task = engine.fail(parse_id(id)?, reason).await?;
    println!(
        "{} task {} '{}': {}",
        style("Failed").red().bold(),
        style(task.id).cyan(),
        task.title,
        reason
    );
    Ok(())
}

pub async fn cmd_rework(project_dir: &Path, id: &str) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let task = engine.rework(parse_id(id)?).await?;
    println!(
        "{} task {} '{}' back to pending",
        style("Reopened").yellow().bold(),
        style(task.id).cyan(),
        task.title
    );
    Ok(())
}

pub async fn cmd_archive(project_dir: &Path, id: &str) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let record = engine.archive(parse_id(id)?).await?;
    println!(
        "{} task {} (final status: {})",
        style("Archived").green().bold(),
        style(record.task_id).cyan(),
        record.final_status
    );
    Ok(())
}

pub fn cmd_list(
    project_dir: &Path,
    status: Option<&str>,
    feature: Option<&str>,
    archived: bool,
) -> Result<()> {
    let engine = open_engine(project_dir)?;

    if archived {
        let records = archive::read_log(engine.store().archive_log_path())?;
        if records.is_empty() {
            println!("No archived tasks.");
            return Ok(());
        }
        println!("{:<8} {:<10} {:<26} Title", "Id", "Status", "Archived at");
        for record in records {
            println!(
                "{:<8} {:<10} {:<26} {}",
                record.task_id.to_string(),
                record.final_status.to_string(),
                record.archived_at.to_rfc3339(),
                record.title
            );
        }
        return Ok(());
    }

    let status_filter: Option<TaskStatus> = status.map(str::parse).transpose()?;
    let tasks = engine.store().list(|t| {
        status_filter.is_none_or(|s| t.status == s)
            && feature.is_none_or(|f| t.feature == f)
    });
    if tasks.is_empty() {
        println!("No matching tasks.");
        return Ok(());
    }

    println!(
        "{:<8} {:<12} {:<10} {:<12} Title",
        "Id", "Status", "Priority", "Deps"
    );
    for task in tasks {
        let deps: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
        println!(
            "{:<8} {:<12} {:<10} {:<12} {}",
            task.id.to_string(),
            task.status.to_string(),
            task.priority.to_string(),
            deps.join(","),
            task.title
        );
    }
    Ok(())
}

fn print_task(task: &Task) {
    println!("{} {}", style("id:").dim(), task.id);
    println!("{} {}", style("title:").dim(), task.title);
    println!("{} {}", style("status:").dim(), task.status);
    println!("{} {}", style("priority:").dim(), task.priority);
    if !task.feature.is_empty() {
        println!("{} {}", style("feature:").dim(), task.feature);
    }
    if !task.commit_type.is_empty() {
        println!("{} {}", style("commit_type:").dim(), task.commit_type);
    }
    if !task.dependencies.is_empty() {
        let deps: Vec<String> = task.dependencies.iter().map(|d| d.to_string()).collect();
        println!("{} {}", style("dependencies:").dim(), deps.join(", "));
    }
    if let Some(ref agent) = task.assigned_agent {
        println!("{} {}", style("assigned_agent:").dim(), agent);
    }
    println!("{} {}", style("created_at:").dim(), task.created_at.to_rfc3339());
    if let Some(started) = task.started_at {
        println!("{} {}", style("started_at:").dim(), started.to_rfc3339());
    }
    if let Some(completed) = task.completed_at {
        println!("{} {}", style("completed_at:").dim(), completed.to_rfc3339());
    }
    if let Some(ref err) = task.error_log {
        println!("{} {}", style("error_log:").dim(), err);
    }
    if !task.body.is_empty() {
        println!();
        println!("{}", task.body);
    }
}

pub fn cmd_show(project_dir: &Path, id: &str) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let id = parse_id(id)?;
    match engine.store().get(id) {
        Ok(task) => print_task(&task),
        Err(_) => {
            let (task, final_status) = engine
                .store()
                .get_archived(id)
                .with_context(|| format!("task {id} not found"))?;
            print_task(&task);
            println!("{} {}", style("final_status:").dim(), final_status);
        }
    }
    Ok(())
}

pub fn cmd_hooks_list(project_dir: &Path) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let discovery = engine.hooks().inspect();

    if discovery.hooks.is_empty() && discovery.errors.is_empty() {
        println!("No hook definitions found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<20} {:<12} {:<10} {:<8} Enabled",
        "Name", "Type", "Trigger", "Priority", "Tier"
    );
    for hook in &discovery.hooks {
        println!(
            "{:<20} {:<20} {:<12} {:<10} {:<8} {}",
            hook.source_name,
            hook.kind.to_string(),
            hook.trigger,
            hook.priority,
            hook.tier.to_string(),
            if hook.enabled {
                style("yes").green()
            } else {
                style("no").dim()
            }
        );
    }
    for err in &discovery.errors {
        println!("{} {}", style("malformed:").red(), err);
    }
    Ok(())
}

pub fn cmd_hooks_check(project_dir: &Path) -> Result<()> {
    let engine = open_engine(project_dir)?;
    let discovery = engine.hooks().inspect();

    println!(
        "{} definitions loaded, {} malformed",
        discovery.hooks.len(),
        discovery.errors.len()
    );
    for err in &discovery.errors {
        println!("{} {}", style("malformed:").red(), err);
    }
    if !discovery.errors.is_empty() {
        bail!("{} malformed hook definition(s)", discovery.errors.len());
    }
    Ok(())
}

pub async fn cmd_guard(
    project_dir: &Path,
    message: Option<&str>,
    command: &[String],
) -> Result<()> {
    let engine = open_engine(project_dir)?;

    let mut fields = BTreeMap::new();
    fields.insert("command".to_string(), command.join(" "));
    if let Some(message) = message {
        fields.insert("message".to_string(), message.to_string());
    }

    let program = command[0].clone();
    let args: Vec<String> = command[1..].to_vec();
    let workdir = project_dir.to_path_buf();

    let status = engine
        .guarded_operation(fields, move || {
            let status = std::process::Command::new(&program)
                .args(&args)
                .current_dir(&workdir)
                .status()
                .with_context(|| format!("failed to run '{program}'"))?;
            if !status.success() {
                bail!("'{}' exited with {}", program, status);
            }
            Ok(status)
        })
        .await;

    match status {
        Ok(_) => {
            println!("{} guarded command succeeded", style("Done").green().bold());
            Ok(())
        }
        Err(err) => {
            println!("{} {}", style("Aborted:").red().bold(), err);
            Err(err.into())
        }
    }
}
