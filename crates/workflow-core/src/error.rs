//! Error types for the approval workflow

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use workflow_types::{DefinitionError, StepId, WorkItemId, WorkOrderStatus};

/// Main error type for all workflow operations
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Actor {actor} may not act on step {step}")]
    UnauthorizedActor { actor: String, step: StepId },

    #[error("Step {requested} is no longer current for item {item} (current: {})", display_step(.current))]
    StaleStep {
        item: WorkItemId,
        requested: StepId,
        current: Option<StepId>,
    },

    #[error("Item {item} is already {status}")]
    TerminalState {
        item: WorkItemId,
        status: WorkOrderStatus,
    },

    #[error("Step {step} requires a reason")]
    MissingReason { step: StepId },

    #[error("Item {item} already has active step {step}")]
    AlreadyStarted { item: WorkItemId, step: StepId },

    #[error("Item {0} was modified concurrently")]
    ConcurrentModification(WorkItemId),

    /// Conditional write lost against another writer. Retried by the orchestrator.
    #[error("Version conflict on item {item}: expected {expected}, found {actual}")]
    Conflict {
        item: WorkItemId,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_step(step: &Option<StepId>) -> String {
    step.as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl From<DefinitionError> for WorkflowError {
    fn from(e: DefinitionError) -> Self {
        Self::InvalidDefinition(e.to_string())
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UnauthorizedActor { .. } => ErrorKind::UnauthorizedActor,
            Self::StaleStep { .. } => ErrorKind::StaleStep,
            Self::TerminalState { .. } => ErrorKind::TerminalState,
            Self::MissingReason { .. } => ErrorKind::MissingReason,
            Self::AlreadyStarted { .. } => ErrorKind::AlreadyStarted,
            Self::ConcurrentModification(_) | Self::Conflict { .. } => {
                ErrorKind::ConcurrentModification
            }
            Self::InvalidDefinition(_) => ErrorKind::InvalidDefinition,
            Self::Config(_) | Self::Storage(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Discriminant reported to callers of the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnauthorizedActor,
    StaleStep,
    TerminalState,
    MissingReason,
    AlreadyStarted,
    ConcurrentModification,
    InvalidDefinition,
    Internal,
}

impl ErrorKind {
    /// Actionable message shown to the person who triggered the call
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "The requested item or workflow does not exist.",
            Self::UnauthorizedActor => "You are not an approver for the current step of this item.",
            Self::StaleStep => "This item was already actioned by someone else. Refresh and try again.",
            Self::TerminalState => "This item is closed and can no longer be approved or rejected.",
            Self::MissingReason => "Please provide a reason for this decision.",
            Self::AlreadyStarted => "An approval workflow is already running for this item.",
            Self::ConcurrentModification => "This item is being updated by someone else. Please try again shortly.",
            Self::InvalidDefinition => "The workflow definition is invalid. Contact an administrator.",
            Self::Internal => "The workflow service failed to complete the request. Please try again later.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::UnauthorizedActor => "unauthorized_actor",
            Self::StaleStep => "stale_step",
            Self::TerminalState => "terminal_state",
            Self::MissingReason => "missing_reason",
            Self::AlreadyStarted => "already_started",
            Self::ConcurrentModification => "concurrent_modification",
            Self::InvalidDefinition => "invalid_definition",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;
