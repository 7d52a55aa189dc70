//! Caller-facing API
//! Wraps the orchestrator and turns every result into an [`ApiResponse`]

use crate::error::{ErrorKind, Result, WorkflowError};
use crate::storage::StatusCounts;
use crate::workflow::orchestrator::{NewWorkItem, WorkflowOrchestrator};
use serde::{Deserialize, Serialize};
use workflow_types::{ActorId, ApprovalAction, StepId, WorkItem, WorkItemId, WorkflowDefinition};

/// Error payload shown to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Serialized as `{"ok": ...}` or `{"error": {"kind": ..., "message": ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiResponse<T> {
    Ok(T),
    Error(ApiError),
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok(_) => None,
            Self::Error(e) => Some(e.kind),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, ApiError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Error(e) => Err(e),
        }
    }
}

impl<T> From<Result<T>> for ApiResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => {
                let kind = e.kind();
                // Internal details stay in the log, callers only see the kind's message
                match kind {
                    ErrorKind::Internal => log::error!("Request failed: {}", e),
                    _ => log::info!("Request refused: {}", e),
                }
                Self::Error(e.into())
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let kind = e.kind();
        Self {
            kind,
            message: kind.user_message().to_string(),
        }
    }
}

pub struct WorkflowApi {
    orchestrator: WorkflowOrchestrator,
}

impl WorkflowApi {
    pub fn new(orchestrator: WorkflowOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &WorkflowOrchestrator {
        &self.orchestrator
    }

    pub async fn create_item(&self, new_item: NewWorkItem) -> ApiResponse<WorkItem> {
        self.orchestrator.create_work_item(new_item).await.into()
    }

    pub async fn start_workflow(
        &self,
        actor_id: &ActorId,
        item_id: &WorkItemId,
    ) -> ApiResponse<WorkItem> {
        self.orchestrator
            .start_work_order_workflow(item_id, actor_id)
            .await
            .into()
    }

    pub async fn submit_approval(
        &self,
        actor_id: &ActorId,
        item_id: &WorkItemId,
        step_id: &StepId,
        action: ApprovalAction,
        reason: Option<String>,
    ) -> ApiResponse<WorkItem> {
        self.orchestrator
            .process_approval(item_id, step_id, actor_id, action, reason)
            .await
            .into()
    }

    pub async fn list_pending_approvals(&self, actor_id: &ActorId) -> ApiResponse<Vec<WorkItem>> {
        self.orchestrator
            .pending_approvals_for(actor_id)
            .await
            .map(|active| active.to_vec())
            .into()
    }

    pub async fn get_item(&self, item_id: &WorkItemId) -> ApiResponse<WorkItem> {
        self.orchestrator.get_work_item(item_id).await.into()
    }

    pub fn list_definitions(&self) -> ApiResponse<Vec<WorkflowDefinition>> {
        ApiResponse::Ok(
            self.orchestrator
                .definitions()
                .iter()
                .map(|d| d.as_ref().clone())
                .collect(),
        )
    }

    pub async fn stats(&self) -> ApiResponse<StatusCounts> {
        self.orchestrator.status_counts().await.into()
    }
}
