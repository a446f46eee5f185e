//! Checkpoint and memory writer.
//!
//! Two kinds of artifact: immutable timestamped snapshots (phase
//! checkpoints and per-task learnings, never rewritten once created) and
//! one mutable `context.md` regenerated on demand — the document a resumed
//! session reads first. `archive` rotates everything mutable into a
//! timestamped folder so stale context never bleeds into an unrelated
//! future task.

use anyhow::{Context, Result};
use chrono::Utc;
use git2::{Delta, DiffOptions, Repository};
use std::fs;
use std::path::{Path, PathBuf};

use crate::budget::UsageBand;
use crate::config::Config;
use crate::workflow::{StateMachine, WorkflowPhase, WorkflowState};

/// Best-effort summary of uncommitted changes in the project tree.
#[derive(Debug, Default, Clone)]
pub struct ChangeSummary {
    pub files_added: Vec<PathBuf>,
    pub files_modified: Vec<PathBuf>,
    pub files_deleted: Vec<PathBuf>,
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.files_added.is_empty()
            && self.files_modified.is_empty()
            && self.files_deleted.is_empty()
    }

    pub fn changed_files(&self) -> Vec<&PathBuf> {
        self.files_added
            .iter()
            .chain(self.files_modified.iter())
            .chain(self.files_deleted.iter())
            .collect()
    }

    fn render(&self) -> String {
        let mut out = format!(
            "{} added, {} modified, {} deleted (+{}/-{} lines)\n",
            self.files_added.len(),
            self.files_modified.len(),
            self.files_deleted.len(),
            self.lines_added,
            self.lines_removed,
        );
        for path in &self.files_added {
            out.push_str(&format!("- added: {}\n", path.display()));
        }
        for path in &self.files_modified {
            out.push_str(&format!("- modified: {}\n", path.display()));
        }
        for path in &self.files_deleted {
            out.push_str(&format!("- deleted: {}\n", path.display()));
        }
        out
    }
}

/// Compute a diff of HEAD's tree against the working directory. Returns
/// `None` whenever the repository or its history is unavailable — the
/// checkpoint is still written, just without a change section.
fn recent_changes(project_dir: &Path) -> Option<ChangeSummary> {
    let repo = Repository::open(project_dir).ok()?;
    let head_tree = repo.head().ok()?.peel_to_tree().ok()?;

    let mut opts = DiffOptions::new();
    opts.include_untracked(true);

    let diff = repo
        .diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut opts))
        .ok()?;

    let mut summary = ChangeSummary::default();
    diff.foreach(
        &mut |delta, _progress| {
            if let Some(path) = delta.new_file().path() {
                let path = path.to_path_buf();
                match delta.status() {
                    Delta::Added | Delta::Untracked => summary.files_added.push(path),
                    Delta::Modified => summary.files_modified.push(path),
                    Delta::Deleted => summary.files_deleted.push(path),
                    _ => {}
                }
            }
            true
        },
        None,
        None,
        Some(&mut |_delta, _hunk, line| {
            match line.origin() {
                '+' => summary.lines_added += 1,
                '-' => summary.lines_removed += 1,
                _ => {}
            }
            true
        }),
    )
    .ok()?;

    Some(summary)
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d-%H%M%S%6f").to_string()
}

fn artifact_name(s: &str) -> String {
    let name: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .take(40)
        .collect();
    if name.trim_matches('-').is_empty() {
        "artifact".to_string()
    } else {
        name
    }
}

/// Stage of a phase group a checkpoint captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStage {
    Pre,
    Post,
    Failed,
}

impl std::fmt::Display for GroupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupStage::Pre => write!(f, "pre"),
            GroupStage::Post => write!(f, "post"),
            GroupStage::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for GroupStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pre" => Ok(GroupStage::Pre),
            "post" => Ok(GroupStage::Post),
            "failed" => Ok(GroupStage::Failed),
            other => anyhow::bail!("Unknown group stage '{other}'. Valid stages: pre, post, failed"),
        }
    }
}

pub struct MemoryWriter {
    config: Config,
    machine: StateMachine,
}

impl MemoryWriter {
    pub fn new(config: &Config) -> Self {
        Self {
            machine: StateMachine::new(config),
            config: config.clone(),
        }
    }

    fn context_path(&self) -> PathBuf {
        self.config.memory_dir.join("context.md")
    }

    fn handoff_path(&self) -> PathBuf {
        self.config.memory_dir.join("handoff.md")
    }

    /// Write an immutable phase checkpoint and register it on the workflow
    /// record (when one exists).
    pub fn write_phase_checkpoint(
        &self,
        phase: WorkflowPhase,
        summary: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.checkpoints_dir)
            .context("Failed to create checkpoints directory")?;
        let path = self
            .config
            .checkpoints_dir
            .join(format!("{}-{}.md", timestamp(), phase));

        let mut content = format!(
            "# Phase checkpoint: {phase}\n\n- Created: {}\n- Phase: {phase}\n",
            Utc::now().to_rfc3339(),
        );
        if let Ok(state) = self.machine.current() {
            content.push_str(&format!("- Session: {}\n", state.session_id));
        }
        content.push_str(&format!("\n## Summary\n\n{}\n", summary.trim()));

        if let Some(changes) = recent_changes(&self.config.project_dir)
            && !changes.is_empty()
        {
            content.push_str(&format!("\n## Recent changes\n\n{}", changes.render()));
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write checkpoint: {}", path.display()))?;

        self.machine.register_checkpoint(path.clone())?;
        tracing::info!(path = %path.display(), phase = %phase, "phase checkpoint written");
        Ok(path)
    }

    /// Write an immutable checkpoint at a phase-group boundary.
    pub fn write_group_checkpoint(
        &self,
        group: u32,
        stage: GroupStage,
        summary: Option<&str>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.checkpoints_dir)
            .context("Failed to create checkpoints directory")?;
        let path = self
            .config
            .checkpoints_dir
            .join(format!("{}-group-{group}-{stage}.md", timestamp()));

        let mut content = format!(
            "# Group {group} checkpoint ({stage})\n\n- Created: {}\n",
            Utc::now().to_rfc3339(),
        );
        if let Ok(state) = self.machine.current() {
            content.push_str(&format!(
                "- Session: {}\n- Phase: {}\n",
                state.session_id, state.current_phase
            ));
        }
        if let Some(summary) = summary {
            content.push_str(&format!("\n## Summary\n\n{}\n", summary.trim()));
        }
        if stage != GroupStage::Pre
            && let Some(changes) = recent_changes(&self.config.project_dir)
            && !changes.is_empty()
        {
            content.push_str(&format!("\n## Recent changes\n\n{}", changes.render()));
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write group checkpoint: {}", path.display()))?;

        self.machine.register_checkpoint(path.clone())?;
        tracing::info!(path = %path.display(), group, stage = %stage, "group checkpoint written");
        Ok(path)
    }

    /// Write an immutable per-task learning artifact with its recorded
    /// test and iteration counters.
    pub fn write_task_learning(
        &self,
        task_id: &str,
        learning: &str,
        tests_run: u32,
        iterations: u32,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.learnings_dir)
            .context("Failed to create learnings directory")?;
        let path = self
            .config
            .learnings_dir
            .join(format!("{}-{}.md", artifact_name(task_id), timestamp()));

        let content = format!(
            "# Task learning: {task_id}\n\n- Created: {}\n- Tests run: {tests_run}\n- Iterations: {iterations}\n\n## Learning\n\n{}\n",
            Utc::now().to_rfc3339(),
            learning.trim(),
        );
        fs::write(&path, content)
            .with_context(|| format!("Failed to write learning: {}", path.display()))?;

        tracing::info!(path = %path.display(), task = task_id, "task learning written");
        Ok(path)
    }

    fn render_context(&self, state: Option<&WorkflowState>) -> String {
        let mut out = format!(
            "# Context summary\n\nRegenerated: {}\n\n",
            Utc::now().to_rfc3339()
        );

        match state {
            None => {
                out.push_str("No active workflow session.\n");
            }
            Some(state) => {
                out.push_str(&format!(
                    "## Workflow\n\n- Session: {}\n- Current phase: {}\n- Previous phase: {}\n- Work type: {}\n",
                    state.session_id,
                    state.current_phase,
                    state
                        .previous_phase
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    state.work_type,
                ));
                if !state.focus.is_empty() {
                    out.push_str(&format!("- Focus: {}\n", state.focus.join(", ")));
                }

                out.push_str("\n## Completed phases\n\n");
                if state.completed_phases.is_empty() {
                    out.push_str("None yet.\n");
                }
                for phase in &state.completed_phases {
                    out.push_str(&format!("- {phase}\n"));
                }
                if !state.abandoned_phases.is_empty() {
                    out.push_str("\n## Abandoned phases\n\n");
                    for phase in &state.abandoned_phases {
                        out.push_str(&format!("- {phase}\n"));
                    }
                }

                if !state.mandatory_skills.is_empty() {
                    out.push_str("\n## Mandatory skills\n\n");
                    for skill in &state.mandatory_skills {
                        out.push_str(&format!("- {skill}\n"));
                    }
                }

                let budget = &state.token_usage;
                out.push_str(&format!(
                    "\n## Token usage\n\n{} of {} estimated tokens used ({:.0}%), band {}\n",
                    budget.estimated_used,
                    budget.budget_total,
                    budget.usage_fraction() * 100.0,
                    budget.band(),
                ));

                if !state.checkpoint_files.is_empty() {
                    out.push_str("\n## Checkpoints\n\n");
                    for path in &state.checkpoint_files {
                        out.push_str(&format!("- {}\n", path.display()));
                    }
                }
            }
        }

        if let Some(changes) = recent_changes(&self.config.project_dir)
            && !changes.is_empty()
        {
            out.push_str(&format!("\n## Recent progress\n\n{}", changes.render()));
        }
        out
    }

    /// Regenerate the mutable "state of the world" document, overwriting
    /// any previous version.
    pub fn write_context_summary(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.memory_dir)
            .context("Failed to create memory directory")?;

        let state = self.machine.current().ok();
        let path = self.context_path();
        fs::write(&path, self.render_context(state.as_ref()))
            .with_context(|| format!("Failed to write context summary: {}", path.display()))?;

        tracing::info!(path = %path.display(), "context summary regenerated");
        Ok(path)
    }

    /// Regenerate the context summary, then write the handoff document a
    /// successor session should act on.
    pub fn prepare_handoff(&self, reason: Option<&str>) -> Result<PathBuf> {
        self.write_context_summary()?;

        let state = self.machine.current().ok();
        let mut content = format!(
            "# Handoff\n\nPrepared: {}\n",
            Utc::now().to_rfc3339()
        );
        if let Some(reason) = reason {
            content.push_str(&format!("Reason: {}\n", reason.trim()));
        }

        match &state {
            None => content.push_str("\nNo active workflow session. Start fresh.\n"),
            Some(state) => {
                content.push_str(&format!(
                    "\n## Resume here\n\n- Phase: {}\n- Work type: {}\n- Session: {}\n",
                    state.current_phase, state.work_type, state.session_id,
                ));
                if state.token_usage.band() != UsageBand::Normal {
                    content.push_str(&format!(
                        "- Budget band at handoff: {}\n",
                        state.token_usage.band()
                    ));
                }

                content.push_str("\n## Do not redo\n\n");
                if state.completed_phases.is_empty() {
                    content.push_str("Nothing completed yet.\n");
                }
                for phase in &state.completed_phases {
                    content.push_str(&format!("- Phase {phase} is done\n"));
                }
                if !state.checkpoint_files.is_empty() {
                    content.push_str("\n## Read these checkpoints first\n\n");
                    for path in &state.checkpoint_files {
                        content.push_str(&format!("- {}\n", path.display()));
                    }
                }
            }
        }
        content.push_str("\nRead context.md for the full state of the world.\n");

        let path = self.handoff_path();
        fs::write(&path, content)
            .with_context(|| format!("Failed to write handoff: {}", path.display()))?;

        tracing::info!(path = %path.display(), "handoff prepared");
        Ok(path)
    }

    /// List the most recent checkpoint artifacts, newest first. Ordering is
    /// an explicit sort on the timestamped file name, not directory order.
    pub fn read_latest(&self, limit: usize) -> Result<Vec<PathBuf>> {
        if !self.config.checkpoints_dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.config.checkpoints_dir)
            .context("Failed to read checkpoints directory")?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "md"))
            .collect();
        paths.sort();
        paths.reverse();
        paths.truncate(limit);
        Ok(paths)
    }

    /// Rotate all mutable memory artifacts and the workflow record into a
    /// timestamped immutable folder, leaving a fresh memory directory.
    pub fn archive(&self) -> Result<PathBuf> {
        let dest = self.config.archive_dir.join(timestamp());
        fs::create_dir_all(&dest).context("Failed to create archive directory")?;

        if self.config.memory_dir.exists() {
            fs::rename(&self.config.memory_dir, dest.join("memory"))
                .context("Failed to archive memory directory")?;
        }
        if self.config.workflow_file.exists() {
            fs::rename(&self.config.workflow_file, dest.join("workflow.json"))
                .context("Failed to archive workflow record")?;
        }

        fs::create_dir_all(&self.config.checkpoints_dir)
            .context("Failed to recreate checkpoints directory")?;
        fs::create_dir_all(&self.config.learnings_dir)
            .context("Failed to recreate learnings directory")?;

        tracing::info!(dest = %dest.display(), "memory archived");
        Ok(dest)
    }

    /// Remove all memory artifacts without archiving them.
    pub fn cleanup(&self) -> Result<()> {
        if self.config.memory_dir.exists() {
            fs::remove_dir_all(&self.config.memory_dir)
                .context("Failed to remove memory directory")?;
        }
        fs::create_dir_all(&self.config.checkpoints_dir)
            .context("Failed to recreate checkpoints directory")?;
        fs::create_dir_all(&self.config.learnings_dir)
            .context("Failed to recreate learnings directory")?;
        Ok(())
    }
}
