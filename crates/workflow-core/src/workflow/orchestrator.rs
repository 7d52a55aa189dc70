//! Workflow orchestrator - the only component that calls the engine and persists its results

use super::engine::{ApprovalEngine, ApprovalRequest};
use super::traits::{DefinitionRef, DefinitionStore, IdentityProvider, WorkItemRepository};
use crate::error::{Result, WorkflowError};
use crate::storage::StatusCounts;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use workflow_types::{
    ActorId, ApprovalAction, Role, StepId, WorkItem, WorkItemId, WorkflowDefinition, WorkflowType,
};

/// Conditional writes that lose a race are retried this many times
const MAX_CONFLICT_RETRIES: u32 = 1;

/// Input for registering a new work item
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub id: Option<WorkItemId>,
    pub title: String,
    pub description: String,
    pub workflow_type: WorkflowType,
    pub created_by: ActorId,
    pub assigned_to: Option<ActorId>,
}

impl NewWorkItem {
    pub fn new(title: impl Into<String>, workflow_type: WorkflowType, created_by: ActorId) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            workflow_type,
            created_by,
            assigned_to: None,
        }
    }

    pub fn with_id(mut self, id: WorkItemId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Snapshot of open items an actor may act on.
///
/// Filtering happens lazily on every [`ActiveWorkflows::iter`] call, and each
/// call starts from the beginning of the snapshot.
pub struct ActiveWorkflows {
    items: Vec<WorkItem>,
    definitions: Arc<dyn DefinitionStore>,
    roles: BTreeSet<Role>,
}

impl ActiveWorkflows {
    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> + '_ {
        self.items.iter().filter(move |item| self.is_actionable(item))
    }

    pub fn to_vec(&self) -> Vec<WorkItem> {
        self.iter().cloned().collect()
    }

    fn is_actionable(&self, item: &WorkItem) -> bool {
        let (Some(step_id), Some(definition_id)) = (&item.current_step_id, &item.definition_id) else {
            return false;
        };

        match self
            .definitions
            .get_definition(&DefinitionRef::Id(definition_id.clone()))
        {
            Ok(definition) => definition
                .step(step_id)
                .map(|step| step.accepts_any(&self.roles))
                .unwrap_or(false),
            Err(e) => {
                log::warn!("Skipping item {}: {}", item.id, e);
                false
            }
        }
    }
}

/// Coordinates definitions, the engine, persistence and identity
pub struct WorkflowOrchestrator {
    definitions: Arc<dyn DefinitionStore>,
    repository: Arc<dyn WorkItemRepository>,
    identity: Arc<dyn IdentityProvider>,
    engine: ApprovalEngine,
}

impl WorkflowOrchestrator {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        repository: Arc<dyn WorkItemRepository>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            definitions,
            repository,
            identity,
            engine: ApprovalEngine::new(),
        }
    }

    /// Register a new item in `draft`
    pub async fn create_work_item(&self, new_item: NewWorkItem) -> Result<WorkItem> {
        let mut item = WorkItem::new_draft(
            new_item.id.unwrap_or_default(),
            new_item.title,
            new_item.workflow_type,
            new_item.created_by,
            Utc::now(),
        );
        item.description = new_item.description;
        item.assigned_to = new_item.assigned_to;

        let stored = self.repository.insert_work_item(&item).await?;
        log::info!(
            "Registered {} item {} ({})",
            stored.workflow_type,
            stored.id,
            stored.title
        );
        Ok(stored)
    }

    /// Start the approval workflow for an item using the active definition of its type
    pub async fn start_work_order_workflow(
        &self,
        item_id: &WorkItemId,
        actor_id: &ActorId,
    ) -> Result<WorkItem> {
        log::info!("Actor {} starting workflow for item {}", actor_id, item_id);

        let started = self
            .update_with_retry(item_id, |item| {
                let definition = self
                    .definitions
                    .get_definition(&DefinitionRef::Type(item.workflow_type))?;
                self.engine.start(&definition, item, Utc::now())
            })
            .await?;

        log::info!(
            "Item {} started under {} at step {}",
            started.id,
            started.definition_id.as_ref().map(|d| d.as_str()).unwrap_or("-"),
            started.current_step_id.as_ref().map(|s| s.as_str()).unwrap_or("-"),
        );
        Ok(started)
    }

    /// Apply one approval or rejection on behalf of `actor_id`
    pub async fn process_approval(
        &self,
        item_id: &WorkItemId,
        step_id: &StepId,
        actor_id: &ActorId,
        action: ApprovalAction,
        reason: Option<String>,
    ) -> Result<WorkItem> {
        let actor_roles = self.identity.resolve_actor_roles(actor_id).await?;
        log::debug!("Actor {} resolved to roles {:?}", actor_id, actor_roles);

        let request = ApprovalRequest::new(
            step_id.clone(),
            actor_id.clone(),
            actor_roles,
            action,
            reason,
        );

        let updated = self
            .update_with_retry(item_id, |item| {
                let definition = self.definition_for(item)?;
                self.engine
                    .process_approval(&definition, item, &request, Utc::now())
            })
            .await?;

        log::info!(
            "Actor {} sent {} on step {} of item {}: now {} at {}",
            actor_id,
            action,
            step_id,
            item_id,
            updated.status,
            updated.current_step_id.as_ref().map(|s| s.as_str()).unwrap_or("-"),
        );
        Ok(updated)
    }

    /// Open items whose current step accepts any of `actor_roles`
    pub async fn get_active_workflows_for_user(
        &self,
        actor_id: &ActorId,
        actor_roles: &BTreeSet<Role>,
    ) -> Result<ActiveWorkflows> {
        let items = self.repository.list_open_work_items().await?;
        log::debug!(
            "Checking {} open items for actor {} with roles {:?}",
            items.len(),
            actor_id,
            actor_roles
        );

        Ok(ActiveWorkflows {
            items,
            definitions: self.definitions.clone(),
            roles: actor_roles.clone(),
        })
    }

    /// Same as [`Self::get_active_workflows_for_user`] with roles from the identity provider
    pub async fn pending_approvals_for(&self, actor_id: &ActorId) -> Result<ActiveWorkflows> {
        let roles = self.identity.resolve_actor_roles(actor_id).await?;
        self.get_active_workflows_for_user(actor_id, &roles).await
    }

    pub async fn get_work_item(&self, item_id: &WorkItemId) -> Result<WorkItem> {
        self.repository.load_work_item(item_id).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let items = self.repository.list_work_items().await?;
        Ok(StatusCounts::from_items(&items))
    }

    pub fn definitions(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.definitions.definitions()
    }

    /// Definition an item runs under, or the active one for its type if never started
    fn definition_for(&self, item: &WorkItem) -> Result<Arc<WorkflowDefinition>> {
        let reference = match &item.definition_id {
            Some(id) => DefinitionRef::Id(id.clone()),
            None => DefinitionRef::Type(item.workflow_type),
        };
        self.definitions.get_definition(&reference)
    }

    /// Load, transform and conditionally save an item.
    ///
    /// A version conflict reloads the item and runs `transition` again, so a
    /// step that moved in the meantime surfaces as the engine's `StaleStep`.
    async fn update_with_retry<F>(&self, item_id: &WorkItemId, mut transition: F) -> Result<WorkItem>
    where
        F: FnMut(&WorkItem) -> Result<WorkItem> + Send,
    {
        let mut attempt = 0;
        loop {
            let item = self.repository.load_work_item(item_id).await?;
            let next = transition(&item)?;

            match self.repository.save_work_item(&next, item.version).await {
                Ok(saved) => return Ok(saved),
                Err(WorkflowError::Conflict { expected, actual, .. })
                    if attempt < MAX_CONFLICT_RETRIES =>
                {
                    attempt += 1;
                    log::warn!(
                        "Version conflict on item {} (expected {}, found {}), retrying",
                        item_id,
                        expected,
                        actual
                    );
                }
                Err(WorkflowError::Conflict { .. }) => {
                    log::warn!("Giving up on item {} after repeated conflicts", item_id);
                    return Err(WorkflowError::ConcurrentModification(item_id.clone()));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identity::StaticIdentityProvider;
    use crate::storage::InMemoryRepository;
    use crate::workflow::definitions::DefinitionRegistry;
    use workflow_types::WorkOrderStatus;

    fn orchestrator() -> WorkflowOrchestrator {
        let identity = StaticIdentityProvider::new()
            .with_actor("tp-1", [Role::Tp])
            .with_actor("staff-1", [Role::Staff])
            .with_actor("admin-1", [Role::Admin]);

        WorkflowOrchestrator::new(
            Arc::new(DefinitionRegistry::with_builtin().unwrap()),
            Arc::new(InMemoryRepository::new()),
            Arc::new(identity),
        )
    }

    async fn started_work_order(orchestrator: &WorkflowOrchestrator, id: &str) -> WorkItem {
        let item = orchestrator
            .create_work_item(
                NewWorkItem::new("Fix aircon", WorkflowType::WorkOrder, ActorId::from("creator"))
                    .with_id(WorkItemId::from(id)),
            )
            .await
            .unwrap();
        orchestrator
            .start_work_order_workflow(&item.id, &ActorId::from("creator"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_persists_pending_item() {
        let orchestrator = orchestrator();
        let started = started_work_order(&orchestrator, "wo-1").await;

        assert_eq!(started.status, WorkOrderStatus::PendingApproval);
        assert_eq!(started.current_step_id, Some(StepId::from("completion-approval")));
        assert_eq!(started.version, 1);

        let stored = orchestrator.get_work_item(&started.id).await.unwrap();
        assert_eq!(stored, started);
    }

    #[tokio::test]
    async fn test_start_twice_is_already_started() {
        let orchestrator = orchestrator();
        let started = started_work_order(&orchestrator, "wo-1").await;

        let err = orchestrator
            .start_work_order_workflow(&started.id, &ActorId::from("creator"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyStarted { .. }));
    }

    #[tokio::test]
    async fn test_unknown_item_is_not_found() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .start_work_order_workflow(&WorkItemId::from("missing"), &ActorId::from("creator"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_roles_come_from_identity_provider() {
        let orchestrator = orchestrator();
        let started = started_work_order(&orchestrator, "wo-1").await;

        let err = orchestrator
            .process_approval(
                &started.id,
                &StepId::from("completion-approval"),
                &ActorId::from("admin-1"),
                ApprovalAction::Approve,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnauthorizedActor { .. }));

        let done = orchestrator
            .process_approval(
                &started.id,
                &StepId::from("completion-approval"),
                &ActorId::from("tp-1"),
                ApprovalAction::Approve,
                None,
            )
            .await
            .unwrap();
        assert_eq!(done.status, WorkOrderStatus::Complete);
        assert_eq!(done.version, 2);
    }

    #[tokio::test]
    async fn test_active_workflows_follow_roles() {
        let orchestrator = orchestrator();
        let first = started_work_order(&orchestrator, "wo-1").await;
        started_work_order(&orchestrator, "wo-2").await;
        orchestrator
            .create_work_item(NewWorkItem::new(
                "Not started",
                WorkflowType::WorkOrder,
                ActorId::from("creator"),
            ))
            .await
            .unwrap();

        let tp_roles: BTreeSet<Role> = [Role::Tp].into_iter().collect();
        let active = orchestrator
            .get_active_workflows_for_user(&ActorId::from("tp-1"), &tp_roles)
            .await
            .unwrap();
        assert_eq!(active.iter().count(), 2);
        // Restartable: a second pass sees the same items
        assert_eq!(active.iter().count(), 2);

        let admin = orchestrator
            .pending_approvals_for(&ActorId::from("admin-1"))
            .await
            .unwrap();
        assert_eq!(admin.iter().count(), 0);

        orchestrator
            .process_approval(
                &first.id,
                &StepId::from("completion-approval"),
                &ActorId::from("staff-1"),
                ApprovalAction::Approve,
                None,
            )
            .await
            .unwrap();

        let remaining = orchestrator
            .pending_approvals_for(&ActorId::from("tp-1"))
            .await
            .unwrap()
            .to_vec();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.as_str(), "wo-2");
    }

    #[tokio::test]
    async fn test_status_counts() {
        let orchestrator = orchestrator();
        started_work_order(&orchestrator, "wo-1").await;
        orchestrator
            .create_work_item(NewWorkItem::new("Draft", WorkflowType::TrainingReport, ActorId::from("creator")))
            .await
            .unwrap();

        let counts = orchestrator.status_counts().await.unwrap();
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.open(), 2);
        assert_eq!(counts.get(WorkOrderStatus::PendingApproval), 1);
        assert_eq!(counts.get(WorkOrderStatus::Draft), 1);
    }
}
