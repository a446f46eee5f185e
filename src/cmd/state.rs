//! Workflow state machine commands.

use anyhow::Result;

use super::super::StateCommands;
use foreman::budget::BudgetController;
use foreman::config::Config;
use foreman::workflow::{
    PhaseOutcome, StateMachine, WorkType, WorkflowPhase, WorkflowState, resolve_skills,
};

fn print_state(state: &WorkflowState) {
    println!("Session:    {}", state.session_id);
    println!("Phase:      {}", state.current_phase);
    println!(
        "Previous:   {}",
        state
            .previous_phase
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Work type:  {}", state.work_type);
    if !state.focus.is_empty() {
        println!("Focus:      {}", state.focus.join(", "));
    }
    println!(
        "Completed:  {}",
        if state.completed_phases.is_empty() {
            "-".to_string()
        } else {
            state
                .completed_phases
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        }
    );
    if !state.mandatory_skills.is_empty() {
        println!("Skills:     {}", state.mandatory_skills.join(", "));
    }
}

pub fn cmd_state(config: &Config, command: &StateCommands) -> Result<()> {
    let machine = StateMachine::new(config);

    match command {
        StateCommands::Init { phase } => {
            let phase: WorkflowPhase = phase.parse()?;
            let state = machine.init(phase)?;
            println!("Started session {} in phase {}", state.session_id, phase);
        }
        StateCommands::Show => {
            let state = machine.current()?;
            print_state(&state);
        }
        StateCommands::WorkType {
            work_type,
            focus,
            confidence,
        } => {
            let work_type: WorkType = work_type.parse()?;
            let state = machine.set_work_type(work_type, focus.clone(), *confidence)?;
            println!("Work type set to {}", work_type);
            if !state.mandatory_skills.is_empty() {
                println!(
                    "Mandatory skills for {}: {}",
                    state.current_phase,
                    state.mandatory_skills.join(", ")
                );
            }
        }
        StateCommands::Transition { phase, abandoned } => {
            let phase: WorkflowPhase = phase.parse()?;
            let outcome = if *abandoned {
                PhaseOutcome::Abandoned
            } else {
                PhaseOutcome::Completed
            };
            let state = machine.transition(phase, outcome)?;
            match state.previous_phase {
                Some(previous) => println!("Transitioned {} -> {}", previous, phase),
                None => println!("Started in phase {}", phase),
            }
            if !state.mandatory_skills.is_empty() {
                println!("Mandatory skills: {}", state.mandatory_skills.join(", "));
            }
        }
        StateCommands::Checkpoint { file, description } => {
            let registered = machine.register_checkpoint(file.clone())?;
            if registered {
                match description {
                    Some(desc) => println!("Registered {} ({desc})", file.display()),
                    None => println!("Registered {}", file.display()),
                }
            } else {
                println!("No workflow record; checkpoint not registered");
            }
        }
        StateCommands::Tokens { amount } => {
            let controller = BudgetController::new(config);
            let (band, budget) = controller.add(*amount, None)?;
            println!(
                "Recorded {} tokens ({} of {} used), band {}",
                amount, budget.estimated_used, budget.budget_total, band
            );
        }
        StateCommands::Resume => {
            let info = machine.resume_info()?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        StateCommands::Skills { phase, work_type } => {
            let (phase, work_type) = match (phase, work_type) {
                (Some(p), Some(w)) => (p.parse()?, w.parse()?),
                _ => {
                    let state = machine.current()?;
                    (
                        phase
                            .as_deref()
                            .map(str::parse)
                            .transpose()?
                            .unwrap_or(state.current_phase),
                        work_type
                            .as_deref()
                            .map(str::parse)
                            .transpose()?
                            .unwrap_or(state.work_type),
                    )
                }
            };
            let skills = resolve_skills(phase, work_type);
            if skills.is_empty() {
                println!("No mandatory skills for {} / {}", phase, work_type);
            } else {
                println!("Mandatory skills for {} / {}:", phase, work_type);
                for skill in skills {
                    println!("  {skill}");
                }
            }
        }
    }
    Ok(())
}
