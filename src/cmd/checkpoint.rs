//! Checkpoint and memory commands.

use anyhow::Result;

use super::super::CheckpointCommands;
use foreman::config::Config;
use foreman::memory::{GroupStage, MemoryWriter};
use foreman::workflow::WorkflowPhase;

pub fn cmd_checkpoint(config: &Config, command: &CheckpointCommands) -> Result<()> {
    let writer = MemoryWriter::new(config);

    match command {
        CheckpointCommands::Write { phase, summary } => {
            let phase: WorkflowPhase = phase.parse()?;
            let path = writer.write_phase_checkpoint(phase, summary)?;
            println!("Checkpoint written: {}", path.display());
        }
        CheckpointCommands::Group {
            group,
            stage,
            summary,
        } => {
            let stage: GroupStage = stage.parse()?;
            let path = writer.write_group_checkpoint(*group, stage, summary.as_deref())?;
            println!("Group checkpoint written: {}", path.display());
        }
        CheckpointCommands::Task {
            task_id,
            learning,
            tests_run,
            iterations,
        } => {
            let path = writer.write_task_learning(task_id, learning, *tests_run, *iterations)?;
            println!("Learning written: {}", path.display());
        }
        CheckpointCommands::Read { limit } => {
            let paths = writer.read_latest(*limit)?;
            if paths.is_empty() {
                println!("No checkpoints");
            } else {
                for path in paths {
                    println!("{}", path.display());
                }
            }
        }
        CheckpointCommands::Context => {
            let path = writer.write_context_summary()?;
            println!("Context summary regenerated: {}", path.display());
        }
        CheckpointCommands::Handoff { reason } => {
            let path = writer.prepare_handoff(reason.as_deref())?;
            println!("Handoff prepared: {}", path.display());
        }
        CheckpointCommands::Archive => {
            let dest = writer.archive()?;
            println!("Memory archived to {}", dest.display());
        }
        CheckpointCommands::Cleanup => {
            writer.cleanup()?;
            println!("Memory cleared");
        }
    }
    Ok(())
}
