//! Project initialization and combined status commands.

use anyhow::{Context, Result};
use console::style;

use foreman::budget::BudgetController;
use foreman::config::Config;
use foreman::pool::PoolManager;
use foreman::workflow::StateMachine;

pub fn cmd_init(config: &Config) -> Result<()> {
    config.ensure_directories()?;

    // Keep the state directory out of the project's own history.
    let gitignore = config.foreman_dir.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, "*\n").context("Failed to write .foreman/.gitignore")?;
    }

    println!("Initialized foreman project at {}", config.foreman_dir.display());
    println!();
    println!("Next steps:");
    println!("  foreman pool init <size>   create the worktree pool");
    println!("  foreman state init         start a workflow session");
    println!("  foreman budget init        set the session token budget");
    Ok(())
}

pub fn cmd_status(config: &Config) -> Result<()> {
    println!();
    println!("Foreman Status");
    println!("==============");
    println!();

    if !config.is_initialized() {
        println!("Project: Not initialized (run 'foreman init')");
        println!();
        return Ok(());
    }

    match PoolManager::new(config).status() {
        Ok(pool) => println!(
            "Pool:     {} slots ({} idle, {} busy)",
            pool.pool_size,
            pool.idle_count(),
            pool.busy_count(),
        ),
        Err(_) => println!("Pool:     not initialized"),
    }

    match StateMachine::new(config).current() {
        Ok(state) => println!(
            "Workflow: phase {} (work type {}), {} completed",
            state.current_phase,
            state.work_type,
            state.completed_phases.len(),
        ),
        Err(_) => println!("Workflow: no active session"),
    }

    match BudgetController::new(config).snapshot() {
        Ok(budget) => println!(
            "Budget:   {} of {} tokens ({:.0}%), band {}",
            budget.estimated_used,
            budget.budget_total,
            budget.usage_fraction() * 100.0,
            style(budget.band()).bold(),
        ),
        Err(_) => println!("Budget:   no active session"),
    }

    println!();
    Ok(())
}
