//! Workflow definition registry and the predefined approval flows

use super::traits::{DefinitionRef, DefinitionStore};
use crate::error::{Result, WorkflowError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use workflow_types::{
    ApprovalStepDef, DefinitionId, Role, WorkOrderStatus, WorkflowDefinition, WorkflowType,
};

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("valid id pattern"));

/// Work orders: completion sign-off, with a second look at the reason on rejection
pub fn work_order_approval() -> WorkflowDefinition {
    WorkflowDefinition {
        id: DefinitionId::from("work-order-approval"),
        workflow_type: WorkflowType::WorkOrder,
        name: "Work Order Approval Flow".to_string(),
        description: "Approval process for work orders completion".to_string(),
        is_active: true,
        initial_step_id: "completion-approval".into(),
        steps: vec![
            ApprovalStepDef::new(
                "completion-approval",
                "Work Order Completion Approval",
                [Role::Tp, Role::Staff],
            )
            .with_description("TP/Staff approves the completion of the work order")
            .reject_to("rejection-reason-approval")
            .approve_status(WorkOrderStatus::Complete)
            .reject_status(WorkOrderStatus::Incomplete)
            .reason_required(),
            ApprovalStepDef::new(
                "rejection-reason-approval",
                "Work Order Rejection Reason Approval",
                [Role::Tp, Role::Staff],
            )
            .with_description("TP/Staff approves the reason for work order incompletion")
            .approve_status(WorkOrderStatus::InProgress)
            .reject_status(WorkOrderStatus::Cancelled)
            .reason_required(),
        ],
    }
}

/// Staff training reports, approved by the technology partner
pub fn training_report_approval() -> WorkflowDefinition {
    WorkflowDefinition {
        id: DefinitionId::from("training-report-approval"),
        workflow_type: WorkflowType::TrainingReport,
        name: "Staff Training Report Approval".to_string(),
        description: "Approval process for staff training reports".to_string(),
        is_active: true,
        initial_step_id: "tp-approval".into(),
        steps: vec![ApprovalStepDef::new("tp-approval", "Technology Partner Approval", [Role::Tp])
            .with_description("Technology Partner approves the staff training report")
            .approve_status(WorkOrderStatus::Complete)
            .reject_status(WorkOrderStatus::Rejected)
            .reason_required()],
    }
}

/// Center relocation or temporary closure requests
pub fn center_management_approval() -> WorkflowDefinition {
    WorkflowDefinition {
        id: DefinitionId::from("center-management-approval"),
        workflow_type: WorkflowType::CenterManagement,
        name: "Center Management Approval".to_string(),
        description: "Approval process for center relocation or temporary closure".to_string(),
        is_active: true,
        initial_step_id: "admin-review".into(),
        steps: vec![ApprovalStepDef::new(
            "admin-review",
            "Administrative Review",
            [Role::Admin, Role::Manager],
        )
        .with_description("Review of the center management request by administrators")
        .approve_status(WorkOrderStatus::Approved)
        .reject_status(WorkOrderStatus::Rejected)
        .reason_required()],
    }
}

pub fn builtin_definitions() -> Vec<WorkflowDefinition> {
    vec![
        work_order_approval(),
        training_report_approval(),
        center_management_approval(),
    ]
}

/// In-memory, append-only registry of definitions.
///
/// Definitions are versioned by id: publishing never replaces an existing
/// id, and the most recently published active definition of a type is the
/// one resolved for that type.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    by_id: BTreeMap<DefinitionId, Arc<WorkflowDefinition>>,
    active_by_type: BTreeMap<WorkflowType, DefinitionId>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the predefined flows
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        for definition in builtin_definitions() {
            registry.publish(definition)?;
        }
        Ok(registry)
    }

    /// Validate and add a definition
    pub fn publish(&mut self, definition: WorkflowDefinition) -> Result<()> {
        check_id("definition", definition.id.as_str())?;
        for step in &definition.steps {
            check_id("step", step.id.as_str())?;
        }
        definition.validate()?;

        if self.by_id.contains_key(&definition.id) {
            return Err(WorkflowError::InvalidDefinition(format!(
                "definition {} is already published; publish changes under a new id",
                definition.id
            )));
        }

        if definition.is_active {
            if let Some(previous) = self
                .active_by_type
                .insert(definition.workflow_type, definition.id.clone())
            {
                log::info!(
                    "Definition {} supersedes {} for {}",
                    definition.id,
                    previous,
                    definition.workflow_type
                );
            }
        }

        log::debug!("Published definition {}", definition.id);
        self.by_id.insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    /// Publish every definition from a JSON file holding an array of definitions
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let definitions: Vec<WorkflowDefinition> = serde_json::from_str(&content)?;

        let count = definitions.len();
        for definition in definitions {
            self.publish(definition)?;
        }

        log::info!("Loaded {} workflow definitions from {}", count, path.display());
        Ok(count)
    }
}

fn check_id(what: &str, id: &str) -> Result<()> {
    if ID_PATTERN.is_match(id) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidDefinition(format!(
            "{} id '{}' must be lowercase letters, digits, '-' or '_'",
            what, id
        )))
    }
}

impl DefinitionStore for DefinitionRegistry {
    fn get_definition(&self, reference: &DefinitionRef) -> Result<Arc<WorkflowDefinition>> {
        let id = match reference {
            DefinitionRef::Id(id) => id,
            DefinitionRef::Type(kind) => self
                .active_by_type
                .get(kind)
                .ok_or_else(|| WorkflowError::NotFound(reference.to_string()))?,
        };

        self.by_id
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(reference.to_string()))
    }

    fn definitions(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.by_id.values().cloned().collect()
    }
}
