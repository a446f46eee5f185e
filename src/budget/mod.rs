//! Token budget tracking and usage-band classification.
//!
//! The controller accumulates estimated token costs against a per-session
//! budget and classifies usage into bands. It never forces a checkpoint or
//! handoff itself: callers consult the band after every `add` and decide
//! what to do (soft backpressure).
//!
//! Estimates are deliberately coarse. The point is to degrade gracefully
//! before a session's context is exhausted, not to meter exact usage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::Config;
use crate::errors::WorkflowError;
use crate::store::Document;
use crate::workflow::{WorkflowPhase, WorkflowState};

/// Default session budget in estimated tokens.
pub const DEFAULT_TOTAL_BUDGET: u64 = 200_000;
/// Fraction of the budget at which usage is classified as Warning.
pub const DEFAULT_WARNING_FRACTION: f64 = 0.80;
/// Fraction of the budget at which usage is classified as Checkpoint.
pub const DEFAULT_CHECKPOINT_FRACTION: f64 = 0.95;

/// Classification of current usage against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageBand {
    Normal,
    Warning,
    Checkpoint,
}

impl std::fmt::Display for UsageBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageBand::Normal => write!(f, "NORMAL"),
            UsageBand::Warning => write!(f, "WARNING"),
            UsageBand::Checkpoint => write!(f, "CHECKPOINT"),
        }
    }
}

/// Per-session token accounting embedded in the workflow record.
///
/// `estimated_used` only ever increases within a session; a new session
/// starts from a fresh record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBudget {
    pub estimated_used: u64,
    pub budget_total: u64,
    pub warning_threshold: f64,
    pub checkpoint_threshold: f64,
    #[serde(default)]
    pub phase_usage: BTreeMap<WorkflowPhase, u64>,
}

impl TokenBudget {
    pub fn new(total: u64, warning: f64, checkpoint: f64) -> Result<Self, WorkflowError> {
        if warning >= checkpoint || warning <= 0.0 || checkpoint > 1.0 {
            return Err(WorkflowError::InvalidThresholds {
                warning,
                checkpoint,
            });
        }
        Ok(Self {
            estimated_used: 0,
            budget_total: total,
            warning_threshold: warning,
            checkpoint_threshold: checkpoint,
            phase_usage: BTreeMap::new(),
        })
    }

    /// Record `tokens` against `phase` and classify the new total.
    pub fn add(&mut self, tokens: u64, phase: WorkflowPhase) -> UsageBand {
        self.estimated_used += tokens;
        *self.phase_usage.entry(phase).or_insert(0) += tokens;
        self.band()
    }

    pub fn usage_fraction(&self) -> f64 {
        if self.budget_total == 0 {
            return 1.0;
        }
        self.estimated_used as f64 / self.budget_total as f64
    }

    pub fn band(&self) -> UsageBand {
        let fraction = self.usage_fraction();
        if fraction >= self.checkpoint_threshold {
            UsageBand::Checkpoint
        } else if fraction >= self.warning_threshold {
            UsageBand::Warning
        } else {
            UsageBand::Normal
        }
    }

    pub fn remaining(&self) -> u64 {
        self.budget_total.saturating_sub(self.estimated_used)
    }

    pub fn phase_used(&self, phase: WorkflowPhase) -> u64 {
        self.phase_usage.get(&phase).copied().unwrap_or(0)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            estimated_used: 0,
            budget_total: DEFAULT_TOTAL_BUDGET,
            warning_threshold: DEFAULT_WARNING_FRACTION,
            checkpoint_threshold: DEFAULT_CHECKPOINT_FRACTION,
            phase_usage: BTreeMap::new(),
        }
    }
}

/// Coarse operation categories with known approximate costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
    Edit,
    Shell,
    Task,
}

impl FromStr for OperationKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(OperationKind::Read),
            "write" => Ok(OperationKind::Write),
            "edit" => Ok(OperationKind::Edit),
            "shell" => Ok(OperationKind::Shell),
            "task" | "skill" => Ok(OperationKind::Task),
            other => Err(WorkflowError::UnknownOperation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeClass {
    Small,
    #[default]
    Medium,
    Large,
}

impl FromStr for SizeClass {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" | "s" => Ok(SizeClass::Small),
            "medium" | "m" => Ok(SizeClass::Medium),
            "large" | "l" => Ok(SizeClass::Large),
            other => Err(WorkflowError::UnknownSizeClass(other.to_string())),
        }
    }
}

/// Approximate token cost of an operation, consulted before running it and
/// recorded via `add` after.
pub fn estimate(kind: OperationKind, size: SizeClass) -> u64 {
    use OperationKind::*;
    use SizeClass::*;
    match (kind, size) {
        (Read, Small) => 500,
        (Read, Medium) => 2_000,
        (Read, Large) => 5_000,
        (Write, Small) => 300,
        (Write, Medium) => 1_200,
        (Write, Large) => 3_000,
        (Edit, Small) => 200,
        (Edit, Medium) => 700,
        (Edit, Large) => 1_500,
        (Shell, Small) => 200,
        (Shell, Medium) => 800,
        (Shell, Large) => 2_000,
        (Task, Small) => 3_000,
        (Task, Medium) => 4_000,
        (Task, Large) => 5_000,
    }
}

/// Fraction of the total budget allotted to each phase. Independent of the
/// global bands: a phase can be locally over budget while the session is
/// globally fine.
pub fn phase_allotment_fraction(phase: WorkflowPhase) -> f64 {
    match phase {
        WorkflowPhase::Idle => 0.05,
        WorkflowPhase::Detect => 0.05,
        WorkflowPhase::Classify => 0.05,
        WorkflowPhase::Plan => 0.15,
        WorkflowPhase::Execute => 0.40,
        WorkflowPhase::Integrate => 0.10,
        WorkflowPhase::Review => 0.15,
        WorkflowPhase::Complete => 0.05,
        WorkflowPhase::Research => 0.20,
    }
}

/// Result of checking one phase's usage against its allotment.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseBudgetReport {
    pub phase: WorkflowPhase,
    pub used: u64,
    pub allotment: u64,
    pub over_budget: bool,
}

pub fn check_phase(budget: &TokenBudget, phase: WorkflowPhase) -> PhaseBudgetReport {
    let allotment = (budget.budget_total as f64 * phase_allotment_fraction(phase)) as u64;
    let used = budget.phase_used(phase);
    PhaseBudgetReport {
        phase,
        used,
        allotment,
        over_budget: used > allotment,
    }
}

/// Budget operations over the persisted workflow record.
///
/// The budget lives inside the workflow document, so every mutation goes
/// through the same locked read-modify-write cycle as phase transitions.
pub struct BudgetController {
    doc: Document<WorkflowState>,
}

impl BudgetController {
    pub fn new(config: &Config) -> Self {
        Self {
            doc: Document::new(config.workflow_file.clone(), &config.locks_dir),
        }
    }

    /// Reset the session budget. Missing workflow state is initialized
    /// rather than treated as an error (tolerant recovery).
    pub fn init(
        &self,
        total: u64,
        warning: f64,
        checkpoint: f64,
    ) -> Result<TokenBudget, WorkflowError> {
        let budget = TokenBudget::new(total, warning, checkpoint)?;
        self.doc.update(|current| {
            let mut state =
                current.unwrap_or_else(|| WorkflowState::fresh(WorkflowPhase::Idle));
            state.token_usage = budget;
            let snapshot = state.token_usage.clone();
            tracing::info!(total, "budget initialized");
            Ok((Some(state), snapshot))
        })
    }

    /// Record estimated usage and return the resulting band. `phase`
    /// defaults to the workflow's current phase.
    pub fn add(
        &self,
        tokens: u64,
        phase: Option<WorkflowPhase>,
    ) -> Result<(UsageBand, TokenBudget), WorkflowError> {
        self.doc.update(|current| {
            let mut state =
                current.unwrap_or_else(|| WorkflowState::fresh(WorkflowPhase::Idle));
            let phase = phase.unwrap_or(state.current_phase);
            let band = state.token_usage.add(tokens, phase);
            let snapshot = state.token_usage.clone();
            tracing::debug!(tokens, phase = %phase, band = %band, "recorded usage");
            Ok((Some(state), (band, snapshot)))
        })
    }

    pub fn snapshot(&self) -> Result<TokenBudget, WorkflowError> {
        self.doc
            .load()?
            .map(|state| state.token_usage)
            .ok_or(WorkflowError::NotInitialized)
    }

    pub fn check_phase(&self, phase: WorkflowPhase) -> Result<PhaseBudgetReport, WorkflowError> {
        Ok(check_phase(&self.snapshot()?, phase))
    }
}
