use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use foreman::config::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(version, about = "Coordination core for autonomous coding tasks")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the .foreman state directory
    Init,
    /// Combined pool, workflow, and budget overview
    Status,
    /// Manage the worktree slot pool
    Pool {
        #[command(subcommand)]
        command: PoolCommands,
    },
    /// Inspect and drive the workflow state machine
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Write and read checkpoint artifacts
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Track the session token budget
    Budget {
        #[command(subcommand)]
        command: BudgetCommands,
    },
}

#[derive(Subcommand)]
pub enum PoolCommands {
    /// Create a fresh pool of N idle slots
    Init { size: u32 },
    /// Allocate the lowest-id idle slot to a task
    Acquire {
        task_id: String,
        /// Ref the slot's branch starts from
        #[arg(long, default_value = "HEAD")]
        base_ref: String,
    },
    /// Destroy a slot's workspace and branch, returning it to idle
    Release { slot_id: u32 },
    /// Show the pool snapshot
    Status,
    /// Detect drift between pool state and the filesystem
    Health,
    /// Merge every busy slot's branch into a target ref
    Merge {
        #[arg(long)]
        target_ref: Option<String>,
    },
    /// Tear down all slots and the pool record
    Cleanup,
    /// Tear down and re-initialize
    Reset {
        #[arg(long, default_value = "3")]
        size: u32,
    },
}

#[derive(Subcommand)]
pub enum StateCommands {
    /// Start a fresh workflow session
    Init {
        #[arg(long, default_value = "idle")]
        phase: String,
    },
    /// Show the current workflow record
    Show,
    /// Set the work classification and recompute mandatory skills
    WorkType {
        work_type: String,
        #[arg(long, value_delimiter = ',')]
        focus: Vec<String>,
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Move to a new phase, recording the departed one
    Transition {
        phase: String,
        /// Record the departed phase as abandoned instead of completed
        #[arg(long)]
        abandoned: bool,
    },
    /// Register a checkpoint file on the workflow record
    Checkpoint {
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// Record estimated token usage against the current phase
    Tokens { amount: u64 },
    /// Print the resume bundle for a new session
    Resume,
    /// Resolve mandatory skills for a phase and work type
    Skills {
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        work_type: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Write an immutable phase checkpoint
    Write { phase: String, summary: String },
    /// Write a checkpoint at a phase-group boundary
    Group {
        group: u32,
        /// pre, post, or failed
        stage: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Write a per-task learning artifact
    Task {
        task_id: String,
        learning: String,
        #[arg(long, default_value = "0")]
        tests_run: u32,
        #[arg(long, default_value = "0")]
        iterations: u32,
    },
    /// List the most recent checkpoints
    Read {
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Regenerate the mutable context summary
    Context,
    /// Prepare a handoff for a successor session
    Handoff {
        #[arg(long)]
        reason: Option<String>,
    },
    /// Rotate all mutable memory into a timestamped archive
    Archive,
    /// Remove all memory artifacts without archiving
    Cleanup,
}

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Reset the session budget
    Init {
        #[arg(long, default_value = "200000")]
        total: u64,
        #[arg(long, default_value = "0.8")]
        warning: f64,
        #[arg(long, default_value = "0.95")]
        checkpoint: f64,
    },
    /// Record estimated usage and print the resulting band
    Add {
        tokens: u64,
        #[arg(long)]
        phase: Option<String>,
    },
    /// Look up the approximate cost of an operation
    Estimate {
        op: String,
        #[arg(long, default_value = "medium")]
        size: String,
    },
    /// Show usage, remaining budget, and the per-phase breakdown
    Status,
    /// Compare one phase's usage against its allotment
    CheckPhase { phase: String },
    /// One-line band and remaining-budget summary
    Summarize,
    /// Persist context and handoff documents for a successor session
    Handoff,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "foreman=debug" } else { "foreman=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = Config::new(project_dir, cli.verbose)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Status => cmd::cmd_status(&config)?,
        Commands::Pool { command } => cmd::cmd_pool(&config, command)?,
        Commands::State { command } => cmd::cmd_state(&config, command)?,
        Commands::Checkpoint { command } => cmd::cmd_checkpoint(&config, command)?,
        Commands::Budget { command } => cmd::cmd_budget(&config, command)?,
    }

    Ok(())
}
