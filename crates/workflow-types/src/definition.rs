//! Workflow definitions - immutable templates of role-gated approval steps

use crate::ids::{DefinitionId, StepId};
use crate::status::{ApprovalAction, Role, WorkOrderStatus, WorkflowType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Structural problems found by [`WorkflowDefinition::validate`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("definition {0} has no steps")]
    EmptySteps(DefinitionId),

    #[error("definition {definition} declares step {step} more than once")]
    DuplicateStep {
        definition: DefinitionId,
        step: StepId,
    },

    #[error("definition {definition} starts at unknown step {step}")]
    UnknownInitialStep {
        definition: DefinitionId,
        step: StepId,
    },

    #[error("step {step} of definition {definition} points to unknown step {target}")]
    DanglingEdge {
        definition: DefinitionId,
        step: StepId,
        target: StepId,
    },

    #[error("step {step} of definition {definition} has no approver roles")]
    NoApproverRoles {
        definition: DefinitionId,
        step: StepId,
    },

    #[error("step {step} of definition {definition} requires sign-off from {role}, which cannot approve it")]
    SignOffOutsideApprovers {
        definition: DefinitionId,
        step: StepId,
        role: Role,
    },

    #[error("step {step} of definition {definition} ends in status {status}, which cannot be an edge outcome")]
    InvalidEdgeStatus {
        definition: DefinitionId,
        step: StepId,
        status: WorkOrderStatus,
    },
}

/// One approval gate within a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStepDef {
    pub id: StepId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub approver_roles: BTreeSet<Role>,
    #[serde(default)]
    pub next_step_on_approve: Option<StepId>,
    #[serde(default)]
    pub next_step_on_reject: Option<StepId>,
    #[serde(default)]
    pub status_on_approve: Option<WorkOrderStatus>,
    #[serde(default)]
    pub status_on_reject: Option<WorkOrderStatus>,
    /// A rejection needs a reason
    #[serde(default)]
    pub require_reason: bool,
    /// An approval needs a reason as well
    #[serde(default)]
    pub require_reason_on_approve: bool,
    /// Entering this step puts the item `in_progress` instead of `pending_approval`
    #[serde(default)]
    pub non_blocking: bool,
    /// Roles that must each approve before the step advances
    #[serde(default)]
    pub required_sign_offs: BTreeSet<Role>,
}

impl ApprovalStepDef {
    /// Single-approval step with terminal edges on both sides
    pub fn new<I>(id: impl Into<StepId>, name: impl Into<String>, approver_roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            approver_roles: approver_roles.into_iter().collect(),
            next_step_on_approve: None,
            next_step_on_reject: None,
            status_on_approve: None,
            status_on_reject: None,
            require_reason: false,
            require_reason_on_approve: false,
            non_blocking: false,
            required_sign_offs: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn approve_to(mut self, next: impl Into<StepId>) -> Self {
        self.next_step_on_approve = Some(next.into());
        self
    }

    pub fn reject_to(mut self, next: impl Into<StepId>) -> Self {
        self.next_step_on_reject = Some(next.into());
        self
    }

    pub fn approve_status(mut self, status: WorkOrderStatus) -> Self {
        self.status_on_approve = Some(status);
        self
    }

    pub fn reject_status(mut self, status: WorkOrderStatus) -> Self {
        self.status_on_reject = Some(status);
        self
    }

    pub fn reason_required(mut self) -> Self {
        self.require_reason = true;
        self
    }

    pub fn reason_required_on_approve(mut self) -> Self {
        self.require_reason_on_approve = true;
        self
    }

    pub fn non_blocking(mut self) -> Self {
        self.non_blocking = true;
        self
    }

    pub fn sign_offs<I>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        self.required_sign_offs = roles.into_iter().collect();
        self
    }

    /// Next step for the action, `None` when the edge is terminal
    pub fn next_step(&self, action: ApprovalAction) -> Option<&StepId> {
        match action {
            ApprovalAction::Approve => self.next_step_on_approve.as_ref(),
            ApprovalAction::Reject => self.next_step_on_reject.as_ref(),
        }
    }

    /// Status assigned when the action's edge has no next step
    pub fn terminal_status(&self, action: ApprovalAction) -> WorkOrderStatus {
        match action {
            ApprovalAction::Approve => self.status_on_approve.unwrap_or(WorkOrderStatus::Approved),
            ApprovalAction::Reject => self.status_on_reject.unwrap_or(WorkOrderStatus::Rejected),
        }
    }

    pub fn requires_reason(&self, action: ApprovalAction) -> bool {
        match action {
            ApprovalAction::Approve => self.require_reason_on_approve,
            ApprovalAction::Reject => self.require_reason,
        }
    }

    /// Actor roles allowed to act on this step
    pub fn matching_roles(&self, actor_roles: &BTreeSet<Role>) -> BTreeSet<Role> {
        self.approver_roles
            .intersection(actor_roles)
            .copied()
            .collect()
    }

    pub fn accepts_any(&self, actor_roles: &BTreeSet<Role>) -> bool {
        !self.approver_roles.is_disjoint(actor_roles)
    }
}

/// Immutable template describing the steps of one workflow version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: DefinitionId,
    #[serde(rename = "type")]
    pub workflow_type: WorkflowType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub initial_step_id: StepId,
    pub steps: Vec<ApprovalStepDef>,
}

fn default_active() -> bool {
    true
}

impl WorkflowDefinition {
    pub fn step(&self, id: &StepId) -> Option<&ApprovalStepDef> {
        self.steps.iter().find(|step| &step.id == id)
    }

    pub fn initial_step(&self) -> Option<&ApprovalStepDef> {
        self.step(&self.initial_step_id)
    }

    /// Check the structural invariants of the definition
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::EmptySteps(self.id.clone()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(&step.id) {
                return Err(DefinitionError::DuplicateStep {
                    definition: self.id.clone(),
                    step: step.id.clone(),
                });
            }
        }

        if !seen.contains(&self.initial_step_id) {
            return Err(DefinitionError::UnknownInitialStep {
                definition: self.id.clone(),
                step: self.initial_step_id.clone(),
            });
        }

        for step in &self.steps {
            if step.approver_roles.is_empty() {
                return Err(DefinitionError::NoApproverRoles {
                    definition: self.id.clone(),
                    step: step.id.clone(),
                });
            }

            if let Some(role) = step
                .required_sign_offs
                .iter()
                .find(|role| !step.approver_roles.contains(*role))
            {
                return Err(DefinitionError::SignOffOutsideApprovers {
                    definition: self.id.clone(),
                    step: step.id.clone(),
                    role: *role,
                });
            }

            for action in [ApprovalAction::Approve, ApprovalAction::Reject] {
                match step.next_step(action) {
                    Some(target) if !seen.contains(target) => {
                        return Err(DefinitionError::DanglingEdge {
                            definition: self.id.clone(),
                            step: step.id.clone(),
                            target: target.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        let status = step.terminal_status(action);
                        if matches!(
                            status,
                            WorkOrderStatus::Draft | WorkOrderStatus::PendingApproval
                        ) {
                            return Err(DefinitionError::InvalidEdgeStatus {
                                definition: self.id.clone(),
                                step: step.id.clone(),
                                status,
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
