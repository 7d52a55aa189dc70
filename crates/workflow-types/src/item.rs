//! Work items - the mutable instances routed through a definition

use crate::ids::{ActorId, DefinitionId, StepId, WorkItemId};
use crate::status::{Role, WorkOrderStatus, WorkflowType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One entry of the append-only approval log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub step_id: StepId,
    pub approver_id: ActorId,
    pub approved: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Roles of the approver that matched the step's approver roles
    #[serde(default)]
    pub acting_roles: BTreeSet<Role>,
    pub timestamp: DateTime<Utc>,
}

/// A single process instance (e.g. a work order) and its approval history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub workflow_type: WorkflowType,
    /// Definition the item was started under
    #[serde(default)]
    pub definition_id: Option<DefinitionId>,
    pub status: WorkOrderStatus,
    #[serde(default)]
    pub current_step_id: Option<StepId>,
    /// Sign-off roles the current step still needs, see [`WorkItem::outstanding_sign_offs`]
    #[serde(default)]
    pub required_approvals: BTreeSet<Role>,
    /// Index into `approvals` where the visit of the current step began
    #[serde(default)]
    pub step_log_offset: usize,
    #[serde(default)]
    pub approvals: Vec<ApprovalRecord>,
    pub created_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_to: Option<ActorId>,
    #[serde(default)]
    pub completion_notes: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Optimistic concurrency version, bumped by the repository on every save
    #[serde(default)]
    pub version: u64,
}

impl WorkItem {
    /// Create a new item in `draft`, not yet attached to any workflow
    pub fn new_draft(
        id: WorkItemId,
        title: impl Into<String>,
        workflow_type: WorkflowType,
        created_by: ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            workflow_type,
            definition_id: None,
            status: WorkOrderStatus::Draft,
            current_step_id: None,
            required_approvals: BTreeSet::new(),
            step_log_offset: 0,
            approvals: Vec::new(),
            created_by,
            created_at: now,
            updated_at: now,
            assigned_to: None,
            completion_notes: None,
            rejection_reason: None,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Approval records made since the current step was entered
    pub fn current_visit(&self) -> &[ApprovalRecord] {
        let offset = self.step_log_offset.min(self.approvals.len());
        &self.approvals[offset..]
    }

    /// Roles that have approved the current step during this visit
    pub fn signed_off_roles(&self) -> BTreeSet<Role> {
        self.current_visit()
            .iter()
            .filter(|record| record.approved)
            .flat_map(|record| record.acting_roles.iter().copied())
            .collect()
    }

    /// Required sign-offs that have not approved the current step yet
    pub fn outstanding_sign_offs(&self) -> BTreeSet<Role> {
        let signed = self.signed_off_roles();
        self.required_approvals
            .difference(&signed)
            .copied()
            .collect()
    }
}
