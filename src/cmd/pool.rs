//! Worktree pool commands.

use anyhow::Result;
use console::style;

use super::super::PoolCommands;
use foreman::config::Config;
use foreman::pool::{DriftKind, PoolManager};

pub fn cmd_pool(config: &Config, command: &PoolCommands) -> Result<()> {
    let manager = PoolManager::new(config);

    match command {
        PoolCommands::Init { size } => {
            let pool = manager.init(*size)?;
            println!("Initialized pool with {} slots", pool.pool_size);
        }
        PoolCommands::Acquire { task_id, base_ref } => {
            let acquisition = manager.acquire(task_id, base_ref)?;
            println!("Acquired slot {} for '{}'", acquisition.slot_id, task_id);
            println!("  workspace: {}", acquisition.workspace_path.display());
            println!("  branch:    {}", acquisition.branch_name);
        }
        PoolCommands::Release { slot_id } => {
            let outcome = manager.release(*slot_id)?;
            if outcome.already_idle {
                println!("Slot {} was already idle", outcome.slot_id);
            } else if outcome.degraded {
                println!(
                    "Released slot {} {}",
                    outcome.slot_id,
                    style("(structured destroy failed, forced delete ran)").yellow()
                );
            } else {
                println!("Released slot {}", outcome.slot_id);
            }
        }
        PoolCommands::Status => {
            let pool = manager.status()?;
            println!();
            println!(
                "Pool: {} slots ({} idle, {} busy), created {}",
                pool.pool_size,
                pool.idle_count(),
                pool.busy_count(),
                pool.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
            println!();
            println!("{:<6} {:<8} {:<20} Branch", "Slot", "Status", "Task");
            for slot in &pool.slots {
                println!(
                    "{:<6} {:<8} {:<20} {}",
                    slot.id,
                    slot.status.to_string(),
                    slot.task_id.as_deref().unwrap_or("-"),
                    slot.branch_name.as_deref().unwrap_or("-"),
                );
            }
            println!();
        }
        PoolCommands::Health => {
            let reports = manager.health_check()?;
            if reports.is_empty() {
                println!("Pool is healthy");
            } else {
                for report in &reports {
                    let what = match report.kind {
                        DriftKind::MissingWorkspace => "busy but workspace missing",
                        DriftKind::OrphanWorkspace => "idle but workspace exists",
                    };
                    println!(
                        "{} slot {}: {} ({})",
                        style("DRIFT").red(),
                        report.slot_id,
                        what,
                        report.workspace_path.display(),
                    );
                }
                println!();
                println!(
                    "Drift is never repaired automatically. Run 'foreman pool release <slot>' to reclaim."
                );
            }
        }
        PoolCommands::Merge { target_ref } => {
            let report = manager.merge_all(target_ref.as_deref())?;
            for branch in &report.merged {
                println!("{} {}", style("merged").green(), branch);
            }
            for branch in &report.failed {
                println!("{} {}", style("conflict").red(), branch);
            }
            println!(
                "{} merged, {} failed",
                report.merged.len(),
                report.failed.len()
            );
        }
        PoolCommands::Cleanup => {
            manager.cleanup()?;
            println!("Pool removed");
        }
        PoolCommands::Reset { size } => {
            let pool = manager.reset(*size)?;
            println!("Pool reset with {} slots", pool.pool_size);
        }
    }
    Ok(())
}
