//! Phase state machine for the coordination workflow.
//!
//! One persisted record tracks the current and previous phase, the work
//! type, the mandatory skills for the current (phase, work type)
//! combination, and the full transition history. The record is created at
//! session start and mutated by every transition until it is archived.
//!
//! Transitions append the departed phase to `completed_phases` the moment
//! it is left. When the caller knows the phase's work did not succeed, it
//! passes `PhaseOutcome::Abandoned` and the phase is recorded in
//! `abandoned_phases` instead, keeping "completed" meaningful.

pub mod skills;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::budget::TokenBudget;
use crate::config::Config;
use crate::errors::WorkflowError;
use crate::store::{Document, Persisted};

pub use skills::resolve_skills;

/// The fixed workflow phase enumeration.
///
/// `Complete` is terminal for a task, but re-entry into `Detect` for a new
/// task is deliberately not blocked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowPhase {
    Idle,
    Detect,
    Classify,
    Plan,
    Execute,
    Integrate,
    Review,
    Complete,
    Research,
}

impl WorkflowPhase {
    pub const ALL: [WorkflowPhase; 9] = [
        WorkflowPhase::Idle,
        WorkflowPhase::Detect,
        WorkflowPhase::Classify,
        WorkflowPhase::Plan,
        WorkflowPhase::Execute,
        WorkflowPhase::Integrate,
        WorkflowPhase::Review,
        WorkflowPhase::Complete,
        WorkflowPhase::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowPhase::Idle => "idle",
            WorkflowPhase::Detect => "detect",
            WorkflowPhase::Classify => "classify",
            WorkflowPhase::Plan => "plan",
            WorkflowPhase::Execute => "execute",
            WorkflowPhase::Integrate => "integrate",
            WorkflowPhase::Review => "review",
            WorkflowPhase::Complete => "complete",
            WorkflowPhase::Research => "research",
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowPhase {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(WorkflowPhase::Idle),
            "detect" => Ok(WorkflowPhase::Detect),
            "classify" => Ok(WorkflowPhase::Classify),
            "plan" => Ok(WorkflowPhase::Plan),
            "execute" => Ok(WorkflowPhase::Execute),
            "integrate" => Ok(WorkflowPhase::Integrate),
            "review" => Ok(WorkflowPhase::Review),
            "complete" => Ok(WorkflowPhase::Complete),
            "research" => Ok(WorkflowPhase::Research),
            other => Err(WorkflowError::InvalidPhase(other.to_string())),
        }
    }
}

/// Classification of the work being coordinated. Drives the skill table's
/// Plan/Execute/Review variants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    Frontend,
    Backend,
    Fullstack,
    Research,
    #[default]
    General,
}

impl WorkType {
    pub const ALL: [WorkType; 5] = [
        WorkType::Frontend,
        WorkType::Backend,
        WorkType::Fullstack,
        WorkType::Research,
        WorkType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Frontend => "frontend",
            WorkType::Backend => "backend",
            WorkType::Fullstack => "fullstack",
            WorkType::Research => "research",
            WorkType::General => "general",
        }
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "frontend" => Ok(WorkType::Frontend),
            "backend" => Ok(WorkType::Backend),
            "fullstack" => Ok(WorkType::Fullstack),
            "research" => Ok(WorkType::Research),
            "general" => Ok(WorkType::General),
            other => Err(WorkflowError::InvalidWorkType(other.to_string())),
        }
    }
}

/// How the departed phase's work ended when transitioning away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Completed,
    Abandoned,
}

/// The persisted workflow record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub version: u32,
    pub current_phase: WorkflowPhase,
    pub previous_phase: Option<WorkflowPhase>,
    pub work_type: WorkType,
    #[serde(default)]
    pub focus: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub mandatory_skills: Vec<String>,
    pub completed_phases: Vec<WorkflowPhase>,
    #[serde(default)]
    pub abandoned_phases: Vec<WorkflowPhase>,
    #[serde(default)]
    pub checkpoint_files: Vec<PathBuf>,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub token_usage: TokenBudget,
}

impl Persisted for WorkflowState {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

impl WorkflowState {
    /// A fresh record for a new session starting in `initial`.
    pub fn fresh(initial: WorkflowPhase) -> Self {
        let work_type = WorkType::default();
        Self {
            version: Self::VERSION,
            current_phase: initial,
            previous_phase: None,
            work_type,
            focus: Vec::new(),
            confidence: None,
            mandatory_skills: resolve_skills(initial, work_type),
            completed_phases: Vec::new(),
            abandoned_phases: Vec::new(),
            checkpoint_files: Vec::new(),
            session_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            token_usage: TokenBudget::default(),
        }
    }
}

/// The minimal bundle a new session needs to continue where the previous
/// one stopped.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeInfo {
    pub session_id: String,
    pub current_phase: WorkflowPhase,
    pub work_type: WorkType,
    pub completed_phases: Vec<WorkflowPhase>,
    pub checkpoint_files: Vec<PathBuf>,
}

/// Operations over the persisted workflow record.
pub struct StateMachine {
    doc: Document<WorkflowState>,
}

impl StateMachine {
    pub fn new(config: &Config) -> Self {
        Self {
            doc: Document::new(config.workflow_file.clone(), &config.locks_dir),
        }
    }

    /// Start a fresh session, replacing any existing record.
    pub fn init(&self, initial: WorkflowPhase) -> Result<WorkflowState, WorkflowError> {
        let state = WorkflowState::fresh(initial);
        self.doc.store(&state)?;
        tracing::info!(session = %state.session_id, phase = %initial, "workflow initialized");
        Ok(state)
    }

    /// The current record, or `NotInitialized`.
    pub fn current(&self) -> Result<WorkflowState, WorkflowError> {
        self.doc.load()?.ok_or(WorkflowError::NotInitialized)
    }

    /// Move to `new_phase`, recording the departed phase under `outcome`.
    ///
    /// A missing record is initialized at `new_phase` instead of erroring:
    /// resumability is worth more than strictness here.
    pub fn transition(
        &self,
        new_phase: WorkflowPhase,
        outcome: PhaseOutcome,
    ) -> Result<WorkflowState, WorkflowError> {
        self.doc.update(|current| {
            let state = match current {
                None => WorkflowState::fresh(new_phase),
                Some(mut state) => {
                    let departed = state.current_phase;
                    state.previous_phase = Some(departed);
                    match outcome {
                        PhaseOutcome::Completed => state.completed_phases.push(departed),
                        PhaseOutcome::Abandoned => state.abandoned_phases.push(departed),
                    }
                    state.current_phase = new_phase;
                    state.mandatory_skills = resolve_skills(new_phase, state.work_type);
                    state
                }
            };
            tracing::info!(
                phase = %new_phase,
                previous = ?state.previous_phase,
                "phase transition"
            );
            Ok((Some(state.clone()), state))
        })
    }

    /// Update the work classification and immediately recompute the
    /// mandatory skills for the *current* phase.
    pub fn set_work_type(
        &self,
        work_type: WorkType,
        focus: Vec<String>,
        confidence: Option<f64>,
    ) -> Result<WorkflowState, WorkflowError> {
        self.doc.update(|current| {
            let mut state = current.ok_or(WorkflowError::NotInitialized)?;
            state.work_type = work_type;
            state.focus = focus;
            state.confidence = confidence;
            state.mandatory_skills = resolve_skills(state.current_phase, work_type);
            Ok((Some(state.clone()), state))
        })
    }

    /// Record a checkpoint artifact path on the workflow record. A missing
    /// record is not an error; the registration is simply skipped.
    pub fn register_checkpoint(&self, path: PathBuf) -> Result<bool, WorkflowError> {
        self.doc.update(|current| match current {
            None => Ok((None, false)),
            Some(mut state) => {
                if !state.checkpoint_files.contains(&path) {
                    state.checkpoint_files.push(path);
                }
                Ok((Some(state), true))
            }
        })
    }

    pub fn resume_info(&self) -> Result<ResumeInfo, WorkflowError> {
        let state = self.current()?;
        Ok(ResumeInfo {
            session_id: state.session_id,
            current_phase: state.current_phase,
            work_type: state.work_type,
            completed_phases: state.completed_phases,
            checkpoint_files: state.checkpoint_files,
        })
    }

    /// Remove the persisted record (used by archive).
    pub fn clear(&self) -> Result<(), WorkflowError> {
        self.doc.remove()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_machine() -> (StateMachine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        (StateMachine::new(&config), dir)
    }

    #[test]
    fn test_init_creates_fresh_record() {
        let (machine, _dir) = make_machine();
        let state = machine.init(WorkflowPhase::Idle).unwrap();

        assert_eq!(state.current_phase, WorkflowPhase::Idle);
        assert!(state.previous_phase.is_none());
        assert!(state.completed_phases.is_empty());
        assert_eq!(state.work_type, WorkType::General);
        assert!(!state.session_id.is_empty());
    }

    #[test]
    fn test_transition_records_departed_phase() {
        let (machine, _dir) = make_machine();
        machine.init(WorkflowPhase::Idle).unwrap();

        let state = machine
            .transition(WorkflowPhase::Detect, PhaseOutcome::Completed)
            .unwrap();

        assert_eq!(state.current_phase, WorkflowPhase::Detect);
        assert_eq!(state.previous_phase, Some(WorkflowPhase::Idle));
        assert_eq!(state.completed_phases, vec![WorkflowPhase::Idle]);
    }

    #[test]
    fn test_transition_sequence_preserves_departure_order() {
        let (machine, _dir) = make_machine();
        machine.init(WorkflowPhase::Idle).unwrap();

        let sequence = [
            WorkflowPhase::Detect,
            WorkflowPhase::Classify,
            WorkflowPhase::Plan,
            WorkflowPhase::Execute,
        ];
        for phase in sequence {
            machine.transition(phase, PhaseOutcome::Completed).unwrap();
        }

        let state = machine.current().unwrap();
        assert_eq!(
            state.completed_phases,
            vec![
                WorkflowPhase::Idle,
                WorkflowPhase::Detect,
                WorkflowPhase::Classify,
                WorkflowPhase::Plan,
            ]
        );
        assert_eq!(state.completed_phases.len(), sequence.len());
    }

    #[test]
    fn test_transition_abandoned_goes_to_separate_list() {
        let (machine, _dir) = make_machine();
        machine.init(WorkflowPhase::Plan).unwrap();

        let state = machine
            .transition(WorkflowPhase::Plan, PhaseOutcome::Abandoned)
            .unwrap();

        assert!(state.completed_phases.is_empty());
        assert_eq!(state.abandoned_phases, vec![WorkflowPhase::Plan]);
    }

    #[test]
    fn test_transition_without_record_initializes() {
        let (machine, _dir) = make_machine();

        let state = machine
            .transition(WorkflowPhase::Detect, PhaseOutcome::Completed)
            .unwrap();

        // Tolerant recovery: behaves like init(Detect), nothing completed.
        assert_eq!(state.current_phase, WorkflowPhase::Detect);
        assert!(state.previous_phase.is_none());
        assert!(state.completed_phases.is_empty());
    }

    #[test]
    fn test_transition_recomputes_skills() {
        let (machine, _dir) = make_machine();
        machine.init(WorkflowPhase::Idle).unwrap();
        machine
            .set_work_type(WorkType::Frontend, vec![], None)
            .unwrap();

        let state = machine
            .transition(WorkflowPhase::Plan, PhaseOutcome::Completed)
            .unwrap();
        assert_eq!(
            state.mandatory_skills,
            resolve_skills(WorkflowPhase::Plan, WorkType::Frontend)
        );
    }

    #[test]
    fn test_set_work_type_retroactively_changes_current_phase_skills() {
        let (machine, _dir) = make_machine();
        machine.init(WorkflowPhase::Idle).unwrap();
        machine
            .transition(WorkflowPhase::Plan, PhaseOutcome::Completed)
            .unwrap();

        let general = machine.current().unwrap().mandatory_skills.clone();
        let state = machine
            .set_work_type(
                WorkType::Backend,
                vec!["api".to_string()],
                Some(0.9),
            )
            .unwrap();

        assert_ne!(state.mandatory_skills, general);
        assert_eq!(
            state.mandatory_skills,
            resolve_skills(WorkflowPhase::Plan, WorkType::Backend)
        );
        assert_eq!(state.focus, vec!["api"]);
        assert_eq!(state.confidence, Some(0.9));
    }

    #[test]
    fn test_frontend_planning_scenario() {
        let (machine, _dir) = make_machine();
        machine.init(WorkflowPhase::Idle).unwrap();
        machine
            .transition(WorkflowPhase::Detect, PhaseOutcome::Completed)
            .unwrap();
        machine
            .set_work_type(WorkType::Frontend, vec!["dashboard".to_string()], Some(0.8))
            .unwrap();
        let state = machine
            .transition(WorkflowPhase::Plan, PhaseOutcome::Completed)
            .unwrap();

        assert_eq!(
            state.completed_phases,
            vec![WorkflowPhase::Idle, WorkflowPhase::Detect]
        );
        assert_eq!(
            state.mandatory_skills,
            vec!["component-planning", "state-design", "accessibility-review"]
        );
    }

    #[test]
    fn test_set_work_type_requires_record() {
        let (machine, _dir) = make_machine();
        assert!(matches!(
            machine.set_work_type(WorkType::Backend, vec![], None),
            Err(WorkflowError::NotInitialized)
        ));
    }

    #[test]
    fn test_register_checkpoint_dedups_and_skips_missing_record() {
        let (machine, _dir) = make_machine();

        // No record: registration is skipped, not an error.
        assert!(!machine
            .register_checkpoint(PathBuf::from("a.md"))
            .unwrap());

        machine.init(WorkflowPhase::Idle).unwrap();
        assert!(machine.register_checkpoint(PathBuf::from("a.md")).unwrap());
        assert!(machine.register_checkpoint(PathBuf::from("a.md")).unwrap());

        let state = machine.current().unwrap();
        assert_eq!(state.checkpoint_files, vec![PathBuf::from("a.md")]);
    }

    #[test]
    fn test_resume_info_bundle() {
        let (machine, _dir) = make_machine();
        let created = machine.init(WorkflowPhase::Idle).unwrap();
        machine
            .transition(WorkflowPhase::Detect, PhaseOutcome::Completed)
            .unwrap();
        machine
            .register_checkpoint(PathBuf::from("cp.md"))
            .unwrap();

        let info = machine.resume_info().unwrap();
        assert_eq!(info.session_id, created.session_id);
        assert_eq!(info.current_phase, WorkflowPhase::Detect);
        assert_eq!(info.completed_phases, vec![WorkflowPhase::Idle]);
        assert_eq!(info.checkpoint_files, vec![PathBuf::from("cp.md")]);
    }

    #[test]
    fn test_phase_parsing_rejects_unknown() {
        assert_eq!(
            "EXECUTE".parse::<WorkflowPhase>().unwrap(),
            WorkflowPhase::Execute
        );
        assert!(matches!(
            "deploy".parse::<WorkflowPhase>(),
            Err(WorkflowError::InvalidPhase(_))
        ));
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();

        let session_id = {
            let machine = StateMachine::new(&config);
            let state = machine.init(WorkflowPhase::Idle).unwrap();
            machine
                .transition(WorkflowPhase::Detect, PhaseOutcome::Completed)
                .unwrap();
            state.session_id
        };

        let machine = StateMachine::new(&config);
        let state = machine.current().unwrap();
        assert_eq!(state.session_id, session_id);
        assert_eq!(state.current_phase, WorkflowPhase::Detect);
    }
}
