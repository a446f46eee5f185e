use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Name of the state directory inside the project.
pub const FOREMAN_DIR: &str = ".foreman";

/// Runtime configuration for foreman.
///
/// Resolves every path the coordination core touches from a single project
/// directory. All state lives under `.foreman/` so a full teardown is one
/// directory removal.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub foreman_dir: PathBuf,
    pub pool_file: PathBuf,
    pub workflow_file: PathBuf,
    pub memory_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub learnings_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    pub verbose: bool,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        let foreman_dir = project_dir.join(FOREMAN_DIR);
        let memory_dir = foreman_dir.join("memory");

        Ok(Self {
            pool_file: foreman_dir.join("pool.json"),
            workflow_file: foreman_dir.join("workflow.json"),
            checkpoints_dir: memory_dir.join("checkpoints"),
            learnings_dir: memory_dir.join("learnings"),
            archive_dir: foreman_dir.join("archive"),
            locks_dir: foreman_dir.join("locks"),
            worktrees_dir: foreman_dir.join("worktrees"),
            memory_dir,
            foreman_dir,
            project_dir,
            verbose,
        })
    }

    /// Create the state directory tree. Idempotent.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.foreman_dir).context("Failed to create .foreman directory")?;
        std::fs::create_dir_all(&self.checkpoints_dir)
            .context("Failed to create checkpoints directory")?;
        std::fs::create_dir_all(&self.learnings_dir)
            .context("Failed to create learnings directory")?;
        std::fs::create_dir_all(&self.archive_dir).context("Failed to create archive directory")?;
        std::fs::create_dir_all(&self.locks_dir).context("Failed to create locks directory")?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.foreman_dir.exists()
    }
}

/// Get the foreman state directory for a project.
pub fn get_foreman_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(FOREMAN_DIR)
}
