//! Worktree pool manager.
//!
//! A fixed set of slots, each backed by one isolated git worktree and one
//! branch, cycling idle → busy → idle until an explicit reset. Allocation
//! is deterministic: the lowest-id idle slot wins, by explicit sort rather
//! than directory order. An exhausted pool is a synchronous hard error —
//! there is no queueing.
//!
//! All mutations run inside the pool document's locked read-modify-write
//! cycle, including the git operations, so concurrent acquire/release
//! invocations serialize instead of corrupting state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;
use crate::errors::PoolError;
use crate::store::{Document, Persisted};
use crate::vcs::{Git, MergeOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Idle,
    Busy,
    Error,
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotStatus::Idle => write!(f, "idle"),
            SlotStatus::Busy => write!(f, "busy"),
            SlotStatus::Error => write!(f, "error"),
        }
    }
}

/// One reusable allocation unit. `branch_name` is set iff the slot is busy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSlot {
    pub id: u32,
    pub status: SlotStatus,
    pub task_id: Option<String>,
    pub workspace_path: PathBuf,
    pub branch_name: Option<String>,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl PoolSlot {
    fn fresh(id: u32, workspace_path: PathBuf) -> Self {
        Self {
            id,
            status: SlotStatus::Idle,
            task_id: None,
            workspace_path,
            branch_name: None,
            acquired_at: None,
        }
    }

    fn reset(&mut self) {
        self.status = SlotStatus::Idle;
        self.task_id = None;
        self.branch_name = None;
        self.acquired_at = None;
    }
}

/// The persisted pool document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolFile {
    pub version: u32,
    pub pool_size: u32,
    pub created_at: DateTime<Utc>,
    pub slots: Vec<PoolSlot>,
}

impl Persisted for PoolFile {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl PoolFile {
    pub fn idle_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Idle)
            .count()
    }

    pub fn busy_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Busy)
            .count()
    }
}

/// What `acquire` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Acquisition {
    pub slot_id: u32,
    pub workspace_path: PathBuf,
    pub branch_name: String,
}

/// Result of releasing a slot. `degraded` means the structured destroy
/// failed and the fallback recursive delete ran instead.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseOutcome {
    pub slot_id: u32,
    pub already_idle: bool,
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    /// Slot says busy but its workspace directory is gone.
    MissingWorkspace,
    /// Slot says idle but a workspace directory exists.
    OrphanWorkspace,
}

/// A detected divergence between pool state and the filesystem. Reported,
/// never auto-repaired: reclaiming a busy slot is an operator decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub slot_id: u32,
    pub task_id: Option<String>,
    pub workspace_path: PathBuf,
    pub kind: DriftKind,
}

/// Per-branch partition of a merge sweep. Partial success is a supported
/// outcome, not a fatal error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub merged: Vec<String>,
    pub failed: Vec<String>,
}

/// Turn a task id into a branch-safe slug.
fn slugify(s: &str, max_len: usize) -> String {
    let slug: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .take(max_len)
        .collect();
    if slug.trim_matches('-').is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

fn branch_for(slot_id: u32, task_id: &str) -> String {
    format!("foreman/slot-{}/{}", slot_id, slugify(task_id, 40))
}

pub struct PoolManager {
    config: Config,
    doc: Document<PoolFile>,
}

impl PoolManager {
    pub fn new(config: &Config) -> Self {
        Self {
            doc: Document::new(config.pool_file.clone(), &config.locks_dir),
            config: config.clone(),
        }
    }

    fn open_git(&self) -> Result<Git, PoolError> {
        Git::open(&self.config.project_dir)
            .map_err(|e| PoolError::InitFailed(e.to_string()))
    }

    /// Destroy one slot's workspace and branch. Structured removal first;
    /// on failure, downgrade to an unconditional recursive delete and
    /// report it via the returned flag.
    fn destroy_slot(&self, git: &Git, slot: &PoolSlot) -> bool {
        let mut degraded = false;

        if slot.workspace_path.exists() {
            if let Err(e) = git.remove_worktree(&slot.workspace_path) {
                tracing::warn!(
                    slot = slot.id,
                    path = %slot.workspace_path.display(),
                    error = %e,
                    "structured worktree removal failed, falling back to forced delete"
                );
                let _ = std::fs::remove_dir_all(&slot.workspace_path);
                let _ = git.prune_worktrees();
                degraded = true;
            }
        } else {
            // Registration may outlive a manually deleted directory.
            let _ = git.prune_worktrees();
        }

        if let Some(branch) = &slot.branch_name
            && git.branch_exists(branch)
            && let Err(e) = git.delete_branch(branch)
        {
            tracing::warn!(slot = slot.id, branch = %branch, error = %e, "failed to delete branch");
            degraded = true;
        }

        degraded
    }

    /// Destroy any existing slots and create `size` idle ones.
    pub fn init(&self, size: u32) -> Result<PoolFile, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize(size));
        }
        let git = self.open_git()?;

        self.doc.update(|current| {
            if let Some(existing) = &current {
                for slot in &existing.slots {
                    self.destroy_slot(&git, slot);
                }
            }

            let slots = (1..=size)
                .map(|id| {
                    PoolSlot::fresh(
                        id,
                        self.config.worktrees_dir.join(format!("slot-{id}")),
                    )
                })
                .collect();
            let pool = PoolFile {
                version: PoolFile::VERSION,
                pool_size: size,
                created_at: Utc::now(),
                slots,
            };
            tracing::info!(size, "pool initialized");
            Ok((Some(pool.clone()), pool))
        })
    }

    /// Allocate the lowest-id idle slot to `task_id`, creating its
    /// workspace and branch from `base_ref`.
    pub fn acquire(&self, task_id: &str, base_ref: &str) -> Result<Acquisition, PoolError> {
        let git = self.open_git()?;

        self.doc.update(|current| {
            let mut pool = current.ok_or(PoolError::NotInitialized)?;

            let slot_idx = pool
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.status == SlotStatus::Idle)
                .min_by_key(|(_, s)| s.id)
                .map(|(i, _)| i)
                .ok_or(PoolError::Exhausted {
                    busy: pool.busy_count(),
                    size: pool.pool_size as usize,
                })?;

            let slot = &pool.slots[slot_idx];
            let branch = branch_for(slot.id, task_id);

            // Idempotent cleanup: a crashed prior session may have left a
            // workspace or branch with this identity behind.
            if slot.workspace_path.exists() {
                if git.remove_worktree(&slot.workspace_path).is_err() {
                    let _ = std::fs::remove_dir_all(&slot.workspace_path);
                }
                let _ = git.prune_worktrees();
            }
            if git.branch_exists(&branch)
                && let Err(e) = git.delete_branch(&branch)
            {
                tracing::warn!(branch = %branch, error = %e, "stale branch cleanup failed");
            }

            // Workspace and branch are created by one git command; a
            // failure here leaves neither behind and the pool unchanged.
            git.add_worktree(&slot.workspace_path, &branch, base_ref)?;

            let slot = &mut pool.slots[slot_idx];
            slot.status = SlotStatus::Busy;
            slot.task_id = Some(task_id.to_string());
            slot.branch_name = Some(branch.clone());
            slot.acquired_at = Some(Utc::now());

            let acquisition = Acquisition {
                slot_id: slot.id,
                workspace_path: slot.workspace_path.clone(),
                branch_name: branch,
            };
            tracing::info!(
                slot = acquisition.slot_id,
                task = task_id,
                branch = %acquisition.branch_name,
                "slot acquired"
            );
            Ok((Some(pool), acquisition))
        })
    }

    /// Destroy a slot's workspace and branch and return it to idle.
    /// Idempotent on an already-idle slot.
    pub fn release(&self, slot_id: u32) -> Result<ReleaseOutcome, PoolError> {
        let git = self.open_git()?;

        self.doc.update(|current| {
            let mut pool = current.ok_or(PoolError::NotInitialized)?;
            let slot = pool
                .slots
                .iter_mut()
                .find(|s| s.id == slot_id)
                .ok_or(PoolError::UnknownSlot(slot_id))?;

            if slot.status == SlotStatus::Idle {
                return Ok((
                    None,
                    ReleaseOutcome {
                        slot_id,
                        already_idle: true,
                        degraded: false,
                    },
                ));
            }

            let degraded = self.destroy_slot(&git, slot);
            slot.reset();
            tracing::info!(slot = slot_id, degraded, "slot released");
            Ok((
                Some(pool),
                ReleaseOutcome {
                    slot_id,
                    already_idle: false,
                    degraded,
                },
            ))
        })
    }

    /// Read-only snapshot of the pool.
    pub fn status(&self) -> Result<PoolFile, PoolError> {
        self.doc.load()?.ok_or(PoolError::NotInitialized)
    }

    /// Find the slot currently assigned to `task_id`, if any.
    pub fn find_slot_by_task(&self, task_id: &str) -> Result<Option<PoolSlot>, PoolError> {
        let pool = self.status()?;
        Ok(pool
            .slots
            .into_iter()
            .find(|s| s.task_id.as_deref() == Some(task_id)))
    }

    /// Detect divergence between recorded slot state and the filesystem.
    /// Never repairs anything; a forced `release` is the operator's call.
    pub fn health_check(&self) -> Result<Vec<DriftReport>, PoolError> {
        let pool = self.status()?;
        let mut reports = Vec::new();

        for slot in &pool.slots {
            let exists = slot.workspace_path.exists();
            let kind = match (slot.status, exists) {
                (SlotStatus::Busy, false) => Some(DriftKind::MissingWorkspace),
                (SlotStatus::Idle, true) => Some(DriftKind::OrphanWorkspace),
                _ => None,
            };
            if let Some(kind) = kind {
                reports.push(DriftReport {
                    slot_id: slot.id,
                    task_id: slot.task_id.clone(),
                    workspace_path: slot.workspace_path.clone(),
                    kind,
                });
            }
        }
        Ok(reports)
    }

    /// Merge every busy slot's branch into `target_ref` (default: the
    /// current branch), in ascending slot-id order. A conflicting branch is
    /// aborted and recorded as failed; the sweep continues. Later merges
    /// see the tree state left by earlier ones, so order matters.
    pub fn merge_all(&self, target_ref: Option<&str>) -> Result<MergeReport, PoolError> {
        let git = self.open_git()?;

        // Taken under the pool lock so a concurrent release cannot delete a
        // branch mid-sweep. The pool document itself is not modified.
        self.doc.update(|current| {
            let pool = current.ok_or(PoolError::NotInitialized)?;

            let mut busy: Vec<&PoolSlot> = pool
                .slots
                .iter()
                .filter(|s| s.status == SlotStatus::Busy)
                .collect();
            busy.sort_by_key(|s| s.id);

            let original = git.current_branch().map_err(PoolError::Other)?;
            let target = target_ref.unwrap_or(&original);
            if target != original {
                git.checkout(target).map_err(PoolError::Other)?;
            }

            let mut report = MergeReport::default();
            for slot in busy {
                let Some(branch) = &slot.branch_name else {
                    continue;
                };
                match git.merge_no_ff(branch) {
                    Ok(MergeOutcome::Merged) => {
                        tracing::info!(slot = slot.id, branch = %branch, "merged");
                        report.merged.push(branch.clone());
                    }
                    Ok(MergeOutcome::Conflicted) => {
                        tracing::warn!(slot = slot.id, branch = %branch, "merge conflict, skipped");
                        report.failed.push(branch.clone());
                    }
                    Err(e) => {
                        // Restore the original branch before surfacing the
                        // infrastructure failure.
                        if target != original {
                            let _ = git.checkout(&original);
                        }
                        return Err(PoolError::Other(e));
                    }
                }
            }

            if target != original {
                git.checkout(&original).map_err(PoolError::Other)?;
            }
            Ok((None, report))
        })
    }

    /// Unconditional full teardown of all slots and the pool document.
    /// Idempotent when no pool exists.
    pub fn cleanup(&self) -> Result<(), PoolError> {
        let git = Git::open(&self.config.project_dir).ok();

        self.doc.update(|current| {
            if let Some(pool) = current {
                for slot in &pool.slots {
                    match &git {
                        Some(git) => {
                            self.destroy_slot(git, slot);
                        }
                        None => {
                            let _ = std::fs::remove_dir_all(&slot.workspace_path);
                        }
                    }
                }
            }
            let _ = std::fs::remove_dir_all(&self.config.worktrees_dir);
            tracing::info!("pool cleaned up");
            Ok::<_, PoolError>((None, ()))
        })?;

        self.doc.remove()?;
        Ok(())
    }

    /// Teardown followed by re-initialization.
    pub fn reset(&self, size: u32) -> Result<PoolFile, PoolError> {
        self.cleanup()?;
        self.init(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::process::Command;
    use tempfile::tempdir;

    fn git_in(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .current_dir(dir)
            .args(["-c", "user.name=test", "-c", "user.email=test@test.com"])
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn setup_manager() -> (PoolManager, Config, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        git_in(dir.path(), &["init"]);
        fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        git_in(dir.path(), &["add", "-A"]);
        git_in(dir.path(), &["commit", "-m", "init"]);

        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        fs::write(config.foreman_dir.join(".gitignore"), "*\n").unwrap();
        (PoolManager::new(&config), config, dir)
    }

    fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) {
        fs::write(dir.join(name), content).unwrap();
        git_in(dir, &["add", "-A"]);
        git_in(dir, &["commit", "-m", msg]);
    }

    // =========================================
    // Init and status
    // =========================================

    #[test]
    fn test_init_creates_idle_slots() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(3).unwrap();

        let pool = manager.status().unwrap();
        assert_eq!(pool.pool_size, 3);
        assert_eq!(pool.idle_count(), 3);
        assert_eq!(pool.busy_count(), 0);
        assert_eq!(
            pool.slots.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_init_zero_size_rejected() {
        let (manager, _config, _dir) = setup_manager();
        assert!(matches!(manager.init(0), Err(PoolError::InvalidSize(0))));
    }

    #[test]
    fn test_init_outside_repo_fails() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        let manager = PoolManager::new(&config);
        assert!(matches!(manager.init(2), Err(PoolError::InitFailed(_))));
    }

    #[test]
    fn test_status_before_init_errors() {
        let (manager, _config, _dir) = setup_manager();
        assert!(matches!(manager.status(), Err(PoolError::NotInitialized)));
    }

    // =========================================
    // Acquire and release
    // =========================================

    #[test]
    fn test_acquire_release_roundtrip() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();
        let fresh = manager.status().unwrap();

        let acquisition = manager.acquire("task-a", "HEAD").unwrap();
        assert_eq!(acquisition.slot_id, 1);
        assert_eq!(acquisition.branch_name, "foreman/slot-1/task-a");
        assert!(acquisition.workspace_path.join("README.md").exists());

        let pool = manager.status().unwrap();
        let slot = &pool.slots[0];
        assert_eq!(slot.status, SlotStatus::Busy);
        assert_eq!(slot.task_id.as_deref(), Some("task-a"));
        assert!(slot.branch_name.is_some());
        assert!(slot.acquired_at.is_some());

        let outcome = manager.release(1).unwrap();
        assert!(!outcome.already_idle);
        assert!(!outcome.degraded);

        // Indistinguishable from freshly initialized.
        let pool = manager.status().unwrap();
        assert_eq!(pool.slots, fresh.slots);
        assert!(!acquisition.workspace_path.exists());
    }

    #[test]
    fn test_acquire_ascending_slot_ids() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(3).unwrap();

        let ids: Vec<u32> = ["a", "b", "c"]
            .iter()
            .map(|t| manager.acquire(t, "HEAD").unwrap().slot_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_exhausted_pool_fails_without_side_effects() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(1).unwrap();
        manager.acquire("task-a", "HEAD").unwrap();

        let before = manager.status().unwrap();
        let err = manager.acquire("task-b", "HEAD").unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { busy: 1, size: 1 }));

        let after = manager.status().unwrap();
        assert_eq!(before.slots, after.slots);
    }

    #[test]
    fn test_release_reuses_lowest_slot() {
        // Pool of 3: fill with a/b/c, d fails, release slot 2, d lands on 2.
        let (manager, _config, _dir) = setup_manager();
        manager.init(3).unwrap();

        for task in ["task-a", "task-b", "task-c"] {
            manager.acquire(task, "HEAD").unwrap();
        }
        assert!(matches!(
            manager.acquire("task-d", "HEAD"),
            Err(PoolError::Exhausted { .. })
        ));

        manager.release(2).unwrap();
        let acquisition = manager.acquire("task-d", "HEAD").unwrap();
        assert_eq!(acquisition.slot_id, 2);
        assert_eq!(acquisition.branch_name, "foreman/slot-2/task-d");
    }

    #[test]
    fn test_release_idempotent_on_idle_slot() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(1).unwrap();

        let outcome = manager.release(1).unwrap();
        assert!(outcome.already_idle);
        assert_eq!(manager.status().unwrap().idle_count(), 1);
    }

    #[test]
    fn test_release_unknown_slot_errors() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(1).unwrap();
        assert!(matches!(
            manager.release(9),
            Err(PoolError::UnknownSlot(9))
        ));
    }

    #[test]
    fn test_acquire_cleans_stale_branch() {
        let (manager, _config, dir) = setup_manager();
        manager.init(1).unwrap();

        // Leftover branch with the same identity from a crashed session.
        git_in(dir.path(), &["branch", "foreman/slot-1/task-a"]);

        let acquisition = manager.acquire("task-a", "HEAD").unwrap();
        assert_eq!(acquisition.branch_name, "foreman/slot-1/task-a");
        assert!(acquisition.workspace_path.exists());
    }

    #[test]
    fn test_task_id_slugified_in_branch() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(1).unwrap();

        let acquisition = manager.acquire("fix bug #42!", "HEAD").unwrap();
        assert_eq!(acquisition.branch_name, "foreman/slot-1/fix-bug--42-");
    }

    #[test]
    fn test_find_slot_by_task() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();
        manager.acquire("task-a", "HEAD").unwrap();

        let slot = manager.find_slot_by_task("task-a").unwrap().unwrap();
        assert_eq!(slot.id, 1);
        assert!(manager.find_slot_by_task("task-z").unwrap().is_none());
    }

    // =========================================
    // Health check
    // =========================================

    #[test]
    fn test_health_check_clean_pool() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();
        manager.acquire("task-a", "HEAD").unwrap();

        assert!(manager.health_check().unwrap().is_empty());
    }

    #[test]
    fn test_health_check_detects_missing_workspace() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();
        let acquisition = manager.acquire("task-a", "HEAD").unwrap();

        fs::remove_dir_all(&acquisition.workspace_path).unwrap();

        let reports = manager.health_check().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].slot_id, 1);
        assert_eq!(reports[0].kind, DriftKind::MissingWorkspace);
        assert_eq!(reports[0].task_id.as_deref(), Some("task-a"));

        // Detection does not repair: the slot stays busy.
        assert_eq!(manager.status().unwrap().busy_count(), 1);
    }

    #[test]
    fn test_health_check_detects_orphan_workspace() {
        let (manager, config, _dir) = setup_manager();
        manager.init(1).unwrap();

        fs::create_dir_all(config.worktrees_dir.join("slot-1")).unwrap();

        let reports = manager.health_check().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, DriftKind::OrphanWorkspace);
    }

    // =========================================
    // Merge sweep
    // =========================================

    #[test]
    fn test_merge_all_partial_success() {
        let (manager, _config, dir) = setup_manager();
        manager.init(2).unwrap();

        let a = manager.acquire("task-a", "HEAD").unwrap();
        let b = manager.acquire("task-b", "HEAD").unwrap();

        // A adds a fresh file; B edits README which also changes on main.
        commit_file(&a.workspace_path, "feature-a.txt", "a\n", "task a work");
        commit_file(&b.workspace_path, "README.md", "b version\n", "task b work");
        commit_file(dir.path(), "README.md", "main version\n", "main edit");

        let report = manager.merge_all(None).unwrap();
        assert_eq!(report.merged, vec![a.branch_name.clone()]);
        assert_eq!(report.failed, vec![b.branch_name.clone()]);

        // The target reflects only A's work.
        assert!(dir.path().join("feature-a.txt").exists());
        let readme = fs::read_to_string(dir.path().join("README.md")).unwrap();
        assert_eq!(readme, "main version\n");

        // Slots stay busy; merging does not release.
        assert_eq!(manager.status().unwrap().busy_count(), 2);
    }

    #[test]
    fn test_merge_all_no_busy_slots() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();

        let report = manager.merge_all(None).unwrap();
        assert!(report.merged.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_merge_all_explicit_target_restores_branch() {
        let (manager, _config, dir) = setup_manager();
        manager.init(1).unwrap();
        let git = Git::open(dir.path()).unwrap();
        let original = git.current_branch().unwrap();

        git_in(dir.path(), &["branch", "integration"]);
        let a = manager.acquire("task-a", "HEAD").unwrap();
        commit_file(&a.workspace_path, "feature.txt", "x\n", "work");

        let report = manager.merge_all(Some("integration")).unwrap();
        assert_eq!(report.merged.len(), 1);

        // Back on the original branch, which does not have the merge.
        assert_eq!(git.current_branch().unwrap(), original);
        assert!(!dir.path().join("feature.txt").exists());
    }

    // =========================================
    // Cleanup and reset
    // =========================================

    #[test]
    fn test_cleanup_removes_everything() {
        let (manager, config, _dir) = setup_manager();
        manager.init(2).unwrap();
        manager.acquire("task-a", "HEAD").unwrap();

        manager.cleanup().unwrap();

        assert!(matches!(manager.status(), Err(PoolError::NotInitialized)));
        assert!(!config.worktrees_dir.exists());
    }

    #[test]
    fn test_cleanup_idempotent_without_pool() {
        let (manager, _config, _dir) = setup_manager();
        manager.cleanup().unwrap();
    }

    #[test]
    fn test_reset_reinitializes() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();
        manager.acquire("task-a", "HEAD").unwrap();

        let pool = manager.reset(4).unwrap();
        assert_eq!(pool.pool_size, 4);
        assert_eq!(pool.idle_count(), 4);
    }

    #[test]
    fn test_init_destroys_previous_slots() {
        let (manager, _config, _dir) = setup_manager();
        manager.init(2).unwrap();
        let acquisition = manager.acquire("task-a", "HEAD").unwrap();
        assert!(acquisition.workspace_path.exists());

        manager.init(3).unwrap();
        assert!(!acquisition.workspace_path.exists());
        assert_eq!(manager.status().unwrap().idle_count(), 3);
    }

    // =========================================
    // Slug helper
    // =========================================

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("task-a", 40), "task-a");
        assert_eq!(slugify("fix/issue 7", 40), "fix-issue-7");
        assert_eq!(slugify("!!!", 40), "task");
        assert_eq!(slugify("abcdef", 3), "abc");
    }
}
