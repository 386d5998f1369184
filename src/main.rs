use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "taskweave")]
#[command(version, about = "Task lifecycle tracker with event-driven hook automation")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a .taskweave store in the project directory
    Init,
    /// Create a new task
    Create {
        title: String,
        /// Create as a sub-task of this top-level id
        #[arg(long)]
        parent: Option<u32>,
        /// Dependency task id (repeatable)
        #[arg(long = "dep")]
        dependencies: Vec<String>,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        feature: Option<String>,
        #[arg(long = "commit-type")]
        commit_type: Option<String>,
    },
    /// Start a pending task (requires its dependencies completed)
    Start {
        id: String,
        /// Identity to record as the assigned agent
        #[arg(long)]
        agent: Option<String>,
    },
    /// Mark an in-progress task completed
    Complete { id: String },
    /// Mark an in-progress task failed
    Fail {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Reopen a failed task for rework
    Rework { id: String },
    /// Archive a completed or failed task
    Archive { id: String },
    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        feature: Option<String>,
        /// List archived tasks instead of active ones
        #[arg(long)]
        archived: bool,
    },
    /// Show one task record
    Show { id: String },
    /// Inspect hook definitions
    Hooks {
        #[command(subcommand)]
        command: HooksCommands,
    },
    /// Run a command guarded by before/after hooks; a failing before hook
    /// aborts and the command never runs
    Guard {
        /// Message exposed to hooks as {{git.message}}
        #[arg(long)]
        message: Option<String>,
        /// The guarded command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum HooksCommands {
    /// List every discovered hook definition
    List,
    /// Validate definitions and report malformed ones
    Check,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "taskweave=debug"
    } else {
        "taskweave=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Create {
            title,
            parent,
            dependencies,
            priority,
            feature,
            commit_type,
        } => {
            cmd::cmd_create(
                &project_dir,
                title,
                *parent,
                dependencies,
                priority,
                feature.as_deref(),
                commit_type.as_deref(),
            )
            .await?;
        }
        Commands::Start { id, agent } => {
            cmd::cmd_start(&project_dir, id, agent.as_deref()).await?;
        }
        Commands::Complete { id } => cmd::cmd_complete(&project_dir, id).await?,
        Commands::Fail { id, reason } => cmd::cmd_fail(&project_dir, id, reason).await?,
        Commands::Rework { id } => cmd::cmd_rework(&project_dir, id).await?,
        Commands::Archive { id } => cmd::cmd_archive(&project_dir, id).await?,
        Commands::List {
            status,
            feature,
            archived,
        } => {
            cmd::cmd_list(&project_dir, status.as_deref(), feature.as_deref(), *archived)?;
        }
        Commands::Show { id } => cmd::cmd_show(&project_dir, id)?,
        Commands::Hooks { command } => match command {
            HooksCommands::List => cmd::cmd_hooks_list(&project_dir)?,
            HooksCommands::Check => cmd::cmd_hooks_check(&project_dir)?,
        },
        Commands::Guard { message, command } => {
            cmd::cmd_guard(&project_dir, message.as_deref(), command).await?;
        }
    }

    Ok(())
}
