//! Typed error hierarchy for the foreman coordination core.
//!
//! Three top-level enums cover the three stateful subsystems:
//! - `StoreError` — persisted-state load/save failures
//! - `PoolError` — worktree pool allocation failures
//! - `WorkflowError` — phase state machine and budget failures
//!
//! A corrupt state file (`StoreError::Corrupt`) is the one cross-cutting
//! fatal condition; everything else stays local to the slot, phase, or
//! checkpoint it happened on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the locked document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors from the worktree pool subsystem.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool size must be at least 1 (got {0})")]
    InvalidSize(u32),

    #[error("Pool is not initialized. Run 'foreman pool init <size>' first")]
    NotInitialized,

    #[error("No idle slot available ({busy} of {size} busy)")]
    Exhausted { busy: usize, size: usize },

    #[error("Slot {0} does not exist")]
    UnknownSlot(u32),

    #[error("Failed to initialize pool: {0}")]
    InitFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the phase state machine and token budget.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(
        "Invalid phase '{0}'. Valid phases: idle, detect, classify, plan, execute, integrate, review, complete, research"
    )]
    InvalidPhase(String),

    #[error("Invalid work type '{0}'. Valid types: frontend, backend, fullstack, research, general")]
    InvalidWorkType(String),

    #[error("No workflow state found. Run 'foreman state init' first")]
    NotInitialized,

    #[error("Warning threshold {warning} must be below checkpoint threshold {checkpoint}")]
    InvalidThresholds { warning: f64, checkpoint: f64 },

    #[error("Unknown operation kind '{0}'. Valid kinds: read, write, edit, shell, task")]
    UnknownOperation(String),

    #[error("Unknown size class '{0}'. Valid classes: small, medium, large")]
    UnknownSizeClass(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
