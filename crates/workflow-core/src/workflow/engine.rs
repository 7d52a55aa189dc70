//! Approval engine - pure state transitions over definitions and work items
//!
//! The engine never performs I/O and never logs. Every call takes the
//! current item by reference and hands back a new value, so callers can
//! diff old and new state before persisting.

use crate::error::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use workflow_types::{
    ActorId, ApprovalAction, ApprovalRecord, ApprovalStepDef, Role, StepId, WorkItem,
    WorkOrderStatus, WorkflowDefinition,
};

/// A single approve/reject decision on a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub step_id: StepId,
    pub actor_id: ActorId,
    pub actor_roles: BTreeSet<Role>,
    pub action: ApprovalAction,
    pub reason: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        step_id: StepId,
        actor_id: ActorId,
        actor_roles: BTreeSet<Role>,
        action: ApprovalAction,
        reason: Option<String>,
    ) -> Self {
        Self {
            step_id,
            actor_id,
            actor_roles,
            action,
            reason,
        }
    }

    /// Reason with surrounding whitespace removed, `None` if blank
    fn normalized_reason(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string)
    }
}

/// Stateless transition function for approval workflows
#[derive(Debug, Default, Clone, Copy)]
pub struct ApprovalEngine;

impl ApprovalEngine {
    pub fn new() -> Self {
        Self
    }

    /// Attach `item` to `definition` at its initial step.
    ///
    /// Existing approval history is kept, so an item that left a workflow
    /// through a non-terminal edge can be started again.
    pub fn start(
        &self,
        definition: &WorkflowDefinition,
        item: &WorkItem,
        now: DateTime<Utc>,
    ) -> Result<WorkItem> {
        if item.is_terminal() {
            return Err(WorkflowError::TerminalState {
                item: item.id.clone(),
                status: item.status,
            });
        }

        if let Some(step) = &item.current_step_id {
            return Err(WorkflowError::AlreadyStarted {
                item: item.id.clone(),
                step: step.clone(),
            });
        }

        let initial = definition.initial_step().ok_or_else(|| {
            WorkflowError::InvalidDefinition(format!(
                "definition {} has no step {}",
                definition.id, definition.initial_step_id
            ))
        })?;

        let mut started = item.clone();
        started.definition_id = Some(definition.id.clone());
        started.status = WorkOrderStatus::PendingApproval;
        started.current_step_id = Some(initial.id.clone());
        started.required_approvals = initial.required_sign_offs.clone();
        started.step_log_offset = started.approvals.len();
        started.updated_at = now;

        Ok(started)
    }

    /// Validate and apply one approval or rejection
    pub fn process_approval(
        &self,
        definition: &WorkflowDefinition,
        item: &WorkItem,
        request: &ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<WorkItem> {
        if item.is_terminal() {
            return Err(WorkflowError::TerminalState {
                item: item.id.clone(),
                status: item.status,
            });
        }

        if item.current_step_id.as_ref() != Some(&request.step_id) {
            return Err(WorkflowError::StaleStep {
                item: item.id.clone(),
                requested: request.step_id.clone(),
                current: item.current_step_id.clone(),
            });
        }

        let step = definition.step(&request.step_id).ok_or_else(|| {
            WorkflowError::NotFound(format!(
                "step {} in definition {}",
                request.step_id, definition.id
            ))
        })?;

        let acting_roles = step.matching_roles(&request.actor_roles);
        if acting_roles.is_empty() {
            return Err(WorkflowError::UnauthorizedActor {
                actor: request.actor_id.to_string(),
                step: step.id.clone(),
            });
        }

        let reason = request.normalized_reason();
        if reason.is_none() && step.requires_reason(request.action) {
            return Err(WorkflowError::MissingReason {
                step: step.id.clone(),
            });
        }

        let mut next = item.clone();
        next.approvals.push(ApprovalRecord {
            step_id: step.id.clone(),
            approver_id: request.actor_id.clone(),
            approved: request.action.is_approve(),
            reason: reason.clone(),
            acting_roles,
            timestamp: now,
        });
        next.updated_at = now;

        match request.action {
            ApprovalAction::Reject => {
                if let Some(reason) = &reason {
                    next.rejection_reason = Some(reason.clone());
                }
                self.follow_edge(definition, step, ApprovalAction::Reject, &mut next, reason)?;
            }
            ApprovalAction::Approve => {
                // Multi sign-off steps stay put until every required role has approved
                if next.outstanding_sign_offs().is_empty() {
                    self.follow_edge(definition, step, ApprovalAction::Approve, &mut next, reason)?;
                }
            }
        }

        Ok(next)
    }

    fn follow_edge(
        &self,
        definition: &WorkflowDefinition,
        step: &ApprovalStepDef,
        action: ApprovalAction,
        item: &mut WorkItem,
        reason: Option<String>,
    ) -> Result<()> {
        item.step_log_offset = item.approvals.len();

        match step.next_step(action) {
            Some(next_id) => {
                let next_step = definition.step(next_id).ok_or_else(|| {
                    WorkflowError::InvalidDefinition(format!(
                        "step {} of definition {} points to unknown step {}",
                        step.id, definition.id, next_id
                    ))
                })?;

                item.current_step_id = Some(next_step.id.clone());
                item.required_approvals = next_step.required_sign_offs.clone();
                item.status = if next_step.non_blocking {
                    WorkOrderStatus::InProgress
                } else {
                    WorkOrderStatus::PendingApproval
                };
            }
            None => {
                item.current_step_id = None;
                item.required_approvals.clear();
                item.status = step.terminal_status(action);

                if action.is_approve() {
                    if let Some(notes) = reason {
                        item.completion_notes = Some(notes);
                    }
                }
            }
        }

        Ok(())
    }
}
