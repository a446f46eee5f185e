//! Token budget commands.

use anyhow::Result;
use console::style;

use super::super::BudgetCommands;
use foreman::budget::{self, BudgetController, OperationKind, SizeClass, UsageBand};
use foreman::config::Config;
use foreman::workflow::WorkflowPhase;

fn styled_band(band: UsageBand) -> String {
    match band {
        UsageBand::Normal => style(band).green().to_string(),
        UsageBand::Warning => style(band).yellow().to_string(),
        UsageBand::Checkpoint => style(band).red().to_string(),
    }
}

pub fn cmd_budget(config: &Config, command: &BudgetCommands) -> Result<()> {
    let controller = BudgetController::new(config);

    match command {
        BudgetCommands::Init {
            total,
            warning,
            checkpoint,
        } => {
            let budget = controller.init(*total, *warning, *checkpoint)?;
            println!(
                "Budget initialized: {} tokens (warning at {:.0}%, checkpoint at {:.0}%)",
                budget.budget_total,
                budget.warning_threshold * 100.0,
                budget.checkpoint_threshold * 100.0,
            );
        }
        BudgetCommands::Add { tokens, phase } => {
            let phase: Option<WorkflowPhase> =
                phase.as_deref().map(str::parse).transpose()?;
            let (band, budget) = controller.add(*tokens, phase)?;
            println!(
                "{} of {} tokens used ({:.0}%), band {}",
                budget.estimated_used,
                budget.budget_total,
                budget.usage_fraction() * 100.0,
                styled_band(band),
            );
        }
        BudgetCommands::Estimate { op, size } => {
            let kind: OperationKind = op.parse()?;
            let size: SizeClass = size.parse()?;
            println!("{}", budget::estimate(kind, size));
        }
        BudgetCommands::Status => {
            let budget = controller.snapshot()?;
            println!();
            println!(
                "Budget: {} of {} tokens used ({:.0}%), {} remaining, band {}",
                budget.estimated_used,
                budget.budget_total,
                budget.usage_fraction() * 100.0,
                budget.remaining(),
                styled_band(budget.band()),
            );
            if !budget.phase_usage.is_empty() {
                println!();
                println!("{:<12} Tokens", "Phase");
                for (phase, used) in &budget.phase_usage {
                    println!("{:<12} {}", phase.to_string(), used);
                }
            }
            println!();
        }
        BudgetCommands::CheckPhase { phase } => {
            let phase: WorkflowPhase = phase.parse()?;
            let report = controller.check_phase(phase)?;
            let verdict = if report.over_budget {
                style("OVER").red().to_string()
            } else {
                style("within").green().to_string()
            };
            println!(
                "Phase {}: {} of {} allotted tokens ({})",
                report.phase, report.used, report.allotment, verdict
            );
        }
        BudgetCommands::Summarize => {
            let budget = controller.snapshot()?;
            println!(
                "{} | {} tokens remaining",
                styled_band(budget.band()),
                budget.remaining()
            );
        }
        BudgetCommands::Handoff => {
            let budget = controller.snapshot()?;
            let writer = foreman::memory::MemoryWriter::new(config);
            let path = writer.prepare_handoff(Some(&format!(
                "token budget at {:.0}% ({})",
                budget.usage_fraction() * 100.0,
                budget.band()
            )))?;
            println!("Handoff prepared: {}", path.display());
        }
    }
    Ok(())
}
