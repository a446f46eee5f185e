//! Shell git primitives for worktree and branch management.
//!
//! The pool treats git as an opaque service: isolated checkouts come from
//! `git worktree add -b`, which creates the workspace and branch as one
//! operation, so a mid-failure never leaves an orphaned branch without a
//! workspace or vice versa. Merges use `git merge --no-ff` with
//! `git merge --abort` recovery so one conflicting branch never wedges the
//! main working tree.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Outcome of a non-fast-forward merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflicted,
}

/// Check if a directory is inside a git repository.
pub fn is_git_repo(path: &Path) -> bool {
    Command::new("git")
        .current_dir(path)
        .args(["rev-parse", "--git-dir"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Handle to a git repository rooted at its top-level working directory.
pub struct Git {
    root: PathBuf,
}

impl Git {
    /// Open the repository containing `dir`. Fails when git is unavailable
    /// or `dir` is not inside a working tree.
    pub fn open(dir: &Path) -> Result<Self> {
        let output = Command::new("git")
            .current_dir(dir)
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .context("Failed to run git (is it installed?)")?;

        if !output.status.success() {
            bail!("Not a git repository: {}", dir.display());
        }

        let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run git {}", args.join(" ")))
    }

    fn run_ok(&self, args: &[&str]) -> Result<()> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(())
    }

    /// Current branch name, or an error on detached HEAD.
    pub fn current_branch(&self) -> Result<String> {
        let output = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if !output.status.success() {
            bail!("Failed to determine current branch");
        }
        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if branch == "HEAD" {
            bail!("Repository is in detached HEAD state");
        }
        Ok(branch)
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.run(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{name}"),
        ])
        .map(|o| o.status.success())
        .unwrap_or(false)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.run_ok(&["branch", "-D", name])
    }

    /// Create a worktree and its branch in one atomic operation.
    pub fn add_worktree(&self, path: &Path, branch: &str, base_ref: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create worktrees directory")?;
        }
        let path_str = path.to_str().context("Worktree path contains invalid UTF-8")?;
        self.run_ok(&["worktree", "add", "-b", branch, path_str, base_ref])
    }

    pub fn remove_worktree(&self, path: &Path) -> Result<()> {
        let path_str = path.to_str().context("Worktree path contains invalid UTF-8")?;
        self.run_ok(&["worktree", "remove", "--force", path_str])
    }

    /// Drop stale worktree registrations whose directories are gone.
    pub fn prune_worktrees(&self) -> Result<()> {
        self.run_ok(&["worktree", "prune"])
    }

    pub fn checkout(&self, target: &str) -> Result<()> {
        self.run_ok(&["checkout", target])
    }

    /// Merge `branch` into the current HEAD with `--no-ff`.
    ///
    /// On a failed merge the in-progress merge is aborted so the working
    /// tree is left clean, and `Conflicted` is returned instead of an error.
    pub fn merge_no_ff(&self, branch: &str) -> Result<MergeOutcome> {
        let message = format!("Merge {branch}");
        let output = self.run(&["merge", "--no-ff", "-m", &message, branch])?;

        if output.status.success() {
            return Ok(MergeOutcome::Merged);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(branch, stderr = %stderr.trim(), "merge failed, aborting");
        // Leave the tree clean for the next branch. Abort can itself fail
        // when the merge never started (e.g. unknown ref); that is fatal.
        let abort = self.run(&["merge", "--abort"])?;
        if !abort.status.success() && self.merge_in_progress() {
            bail!(
                "merge of {} failed and could not be aborted: {}",
                branch,
                stderr.trim()
            );
        }
        Ok(MergeOutcome::Conflicted)
    }

    fn merge_in_progress(&self) -> bool {
        self.run(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Resolve a ref to a commit id.
    pub fn rev_parse(&self, reference: &str) -> Result<String> {
        let output = self.run(&["rev-parse", reference])?;
        if !output.status.success() {
            bail!("Unknown ref: {reference}");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
