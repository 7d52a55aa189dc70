use std::sync::Arc;
use tempfile::TempDir;
use workflow_core::{
    DefinitionRegistry, ErrorKind, FileRepository, InMemoryRepository, NewWorkItem,
    StaticIdentityProvider, WorkItemRepository, WorkflowApi, WorkflowOrchestrator,
};
use workflow_types::{
    ActorId, ApprovalAction, ApprovalStepDef, DefinitionId, Role, StepId, WorkItem, WorkItemId,
    WorkOrderStatus, WorkflowDefinition, WorkflowType,
};

fn purchase_definition() -> WorkflowDefinition {
    WorkflowDefinition {
        id: DefinitionId::from("purchase-approval"),
        workflow_type: WorkflowType::WorkOrder,
        name: "Purchase approval".to_string(),
        description: String::new(),
        is_active: true,
        initial_step_id: StepId::from("s1"),
        steps: vec![
            ApprovalStepDef::new("s1", "Manager review", [Role::Manager])
                .approve_to("s2")
                .reject_status(WorkOrderStatus::Rejected),
            ApprovalStepDef::new("s2", "Director review", [Role::Director])
                .approve_status(WorkOrderStatus::Approved),
        ],
    }
}

fn identities() -> StaticIdentityProvider {
    StaticIdentityProvider::new()
        .with_actor("mgr", [Role::Manager])
        .with_actor("dir", [Role::Director])
        .with_actor("tp", [Role::Tp])
        .with_actor("staff", [Role::Staff])
}

fn api_with(repository: Arc<dyn WorkItemRepository>, registry: DefinitionRegistry) -> WorkflowApi {
    WorkflowApi::new(WorkflowOrchestrator::new(
        Arc::new(registry),
        repository,
        Arc::new(identities()),
    ))
}

fn purchase_api(repository: Arc<dyn WorkItemRepository>) -> WorkflowApi {
    let mut registry = DefinitionRegistry::new();
    registry.publish(purchase_definition()).unwrap();
    api_with(repository, registry)
}

async fn create(api: &WorkflowApi, id: &str, workflow_type: WorkflowType) -> WorkItem {
    api.create_item(
        NewWorkItem::new("New laptops", workflow_type, ActorId::from("requester"))
            .with_id(WorkItemId::from(id)),
    )
    .await
    .into_result()
    .unwrap()
}

async fn approve(api: &WorkflowApi, actor: &str, item: &str, step: &str) -> WorkItem {
    api.submit_approval(
        &ActorId::from(actor),
        &WorkItemId::from(item),
        &StepId::from(step),
        ApprovalAction::Approve,
        None,
    )
    .await
    .into_result()
    .unwrap()
}

async fn run_two_step_approval(api: &WorkflowApi) {
    let item = create(api, "po-1", WorkflowType::WorkOrder).await;
    assert_eq!(item.status, WorkOrderStatus::Draft);

    let started = api
        .start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();
    assert_eq!(started.current_step_id, Some(StepId::from("s1")));
    assert_eq!(started.status, WorkOrderStatus::PendingApproval);
    assert_eq!(started.definition_id, Some(DefinitionId::from("purchase-approval")));

    let after_manager = approve(api, "mgr", "po-1", "s1").await;
    assert_eq!(after_manager.current_step_id, Some(StepId::from("s2")));
    assert_eq!(after_manager.status, WorkOrderStatus::PendingApproval);

    let done = approve(api, "dir", "po-1", "s2").await;
    assert_eq!(done.current_step_id, None);
    assert_eq!(done.status, WorkOrderStatus::Approved);
    assert_eq!(done.approvals.len(), 2);
    assert_eq!(done.approvals[0].approver_id, ActorId::from("mgr"));
    assert_eq!(done.approvals[0].step_id, StepId::from("s1"));
    assert_eq!(done.approvals[1].approver_id, ActorId::from("dir"));
    assert!(done.approvals.iter().all(|a| a.approved));

    let stored = api.get_item(&WorkItemId::from("po-1")).await.into_result().unwrap();
    assert_eq!(stored, done);
}

#[tokio::test]
async fn test_two_step_approval_in_memory() {
    let api = purchase_api(Arc::new(InMemoryRepository::new()));
    run_two_step_approval(&api).await;
}

#[tokio::test]
async fn test_two_step_approval_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let api = purchase_api(Arc::new(FileRepository::new(temp_dir.path()).unwrap()));
    run_two_step_approval(&api).await;

    assert!(temp_dir
        .path()
        .join("approved")
        .join("item_po-1.json")
        .exists());
}

#[tokio::test]
async fn test_rejection_closes_item_with_reason() {
    let api = purchase_api(Arc::new(InMemoryRepository::new()));
    let item = create(&api, "po-2", WorkflowType::WorkOrder).await;
    api.start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();

    let rejected = api
        .submit_approval(
            &ActorId::from("mgr"),
            &item.id,
            &StepId::from("s1"),
            ApprovalAction::Reject,
            Some("insufficient budget".to_string()),
        )
        .await
        .into_result()
        .unwrap();

    assert_eq!(rejected.status, WorkOrderStatus::Rejected);
    assert_eq!(rejected.current_step_id, None);
    assert_eq!(rejected.approvals.len(), 1);
    assert!(!rejected.approvals[0].approved);
    assert_eq!(rejected.approvals[0].reason.as_deref(), Some("insufficient budget"));
    assert_eq!(rejected.rejection_reason.as_deref(), Some("insufficient budget"));

    // Closed items refuse further decisions
    let response = api
        .submit_approval(
            &ActorId::from("mgr"),
            &item.id,
            &StepId::from("s1"),
            ApprovalAction::Approve,
            None,
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::TerminalState));
}

#[tokio::test]
async fn test_replayed_approval_is_stale() {
    let api = purchase_api(Arc::new(InMemoryRepository::new()));
    let item = create(&api, "po-3", WorkflowType::WorkOrder).await;
    api.start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();

    approve(&api, "mgr", "po-3", "s1").await;
    let replay = api
        .submit_approval(
            &ActorId::from("mgr"),
            &item.id,
            &StepId::from("s1"),
            ApprovalAction::Approve,
            None,
        )
        .await;

    assert_eq!(replay.error_kind(), Some(ErrorKind::StaleStep));
    let stored = api.get_item(&item.id).await.into_result().unwrap();
    assert_eq!(stored.approvals.len(), 1, "Replay must not add a record");
}

#[tokio::test]
async fn test_error_kinds_reach_the_caller() {
    let api = purchase_api(Arc::new(InMemoryRepository::new()));
    let item = create(&api, "po-4", WorkflowType::WorkOrder).await;

    // Not started yet
    let response = api
        .submit_approval(
            &ActorId::from("mgr"),
            &item.id,
            &StepId::from("s1"),
            ApprovalAction::Approve,
            None,
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::StaleStep));

    api.start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();

    let response = api
        .start_workflow(&ActorId::from("requester"), &item.id)
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::AlreadyStarted));

    let response = api
        .submit_approval(
            &ActorId::from("dir"),
            &item.id,
            &StepId::from("s1"),
            ApprovalAction::Approve,
            None,
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::UnauthorizedActor));

    let response = api
        .submit_approval(
            &ActorId::from("nobody"),
            &item.id,
            &StepId::from("s1"),
            ApprovalAction::Approve,
            None,
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::UnauthorizedActor));

    let response = api
        .start_workflow(&ActorId::from("requester"), &WorkItemId::from("missing"))
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["error"]["kind"], "not_found");
    assert_eq!(
        json["error"]["message"],
        ErrorKind::NotFound.user_message()
    );
}

#[tokio::test]
async fn test_missing_definition_for_type() {
    let api = purchase_api(Arc::new(InMemoryRepository::new()));
    let item = create(&api, "tr-1", WorkflowType::TrainingReport).await;

    let response = api.start_workflow(&ActorId::from("requester"), &item.id).await;
    assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_pending_approvals_per_actor() {
    let api = purchase_api(Arc::new(InMemoryRepository::new()));
    for id in ["po-a", "po-b"] {
        let item = create(&api, id, WorkflowType::WorkOrder).await;
        api.start_workflow(&ActorId::from("requester"), &item.id)
            .await
            .into_result()
            .unwrap();
    }
    approve(&api, "mgr", "po-a", "s1").await;

    let manager = api
        .list_pending_approvals(&ActorId::from("mgr"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(manager[0].id.as_str(), "po-b");

    let director = api
        .list_pending_approvals(&ActorId::from("dir"))
        .await
        .into_result()
        .unwrap();
    assert_eq!(director.len(), 1);
    assert_eq!(director[0].id.as_str(), "po-a");

    let stranger = api
        .list_pending_approvals(&ActorId::from("nobody"))
        .await
        .into_result()
        .unwrap();
    assert!(stranger.is_empty());
}

#[tokio::test]
async fn test_builtin_work_order_rejection_path() {
    let api = api_with(
        Arc::new(InMemoryRepository::new()),
        DefinitionRegistry::with_builtin().unwrap(),
    );
    let item = create(&api, "wo-1", WorkflowType::WorkOrder).await;
    api.start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();

    // Rejection needs a reason at the completion step
    let response = api
        .submit_approval(
            &ActorId::from("tp"),
            &item.id,
            &StepId::from("completion-approval"),
            ApprovalAction::Reject,
            Some("   ".to_string()),
        )
        .await;
    assert_eq!(response.error_kind(), Some(ErrorKind::MissingReason));

    let rejected = api
        .submit_approval(
            &ActorId::from("tp"),
            &item.id,
            &StepId::from("completion-approval"),
            ApprovalAction::Reject,
            Some("Parts missing".to_string()),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        rejected.current_step_id,
        Some(StepId::from("rejection-reason-approval"))
    );
    assert_eq!(rejected.status, WorkOrderStatus::PendingApproval);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Parts missing"));

    let cancelled = api
        .submit_approval(
            &ActorId::from("staff"),
            &item.id,
            &StepId::from("rejection-reason-approval"),
            ApprovalAction::Reject,
            Some("Vendor unavailable".to_string()),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(cancelled.status, WorkOrderStatus::Cancelled);
    assert_eq!(cancelled.current_step_id, None);
    assert_eq!(cancelled.approvals.len(), 2);
}

#[tokio::test]
async fn test_accepted_rejection_reason_parks_item_for_restart() {
    let api = api_with(
        Arc::new(InMemoryRepository::new()),
        DefinitionRegistry::with_builtin().unwrap(),
    );
    let item = create(&api, "wo-2", WorkflowType::WorkOrder).await;
    api.start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();

    api.submit_approval(
        &ActorId::from("tp"),
        &item.id,
        &StepId::from("completion-approval"),
        ApprovalAction::Reject,
        Some("Wrong part fitted".to_string()),
    )
    .await
    .into_result()
    .unwrap();

    let parked = api
        .submit_approval(
            &ActorId::from("staff"),
            &item.id,
            &StepId::from("rejection-reason-approval"),
            ApprovalAction::Approve,
            Some("Agreed, redo".to_string()),
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(parked.status, WorkOrderStatus::InProgress);
    assert_eq!(parked.current_step_id, None);

    let restarted = api
        .start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();
    assert_eq!(restarted.status, WorkOrderStatus::PendingApproval);
    assert_eq!(
        restarted.current_step_id,
        Some(StepId::from("completion-approval"))
    );
    assert_eq!(restarted.approvals.len(), 2, "History survives a restart");

    let stats = api.stats().await.into_result().unwrap();
    assert_eq!(stats.get(WorkOrderStatus::PendingApproval), 1);
}

#[tokio::test]
async fn test_items_keep_their_definition_after_new_version() {
    let repository: Arc<dyn WorkItemRepository> = Arc::new(InMemoryRepository::new());
    let old_api = purchase_api(repository.clone());
    let item = create(&old_api, "po-5", WorkflowType::WorkOrder).await;
    old_api
        .start_workflow(&ActorId::from("requester"), &item.id)
        .await
        .into_result()
        .unwrap();

    // Publish a single-step v2 alongside v1
    let mut registry = DefinitionRegistry::new();
    registry.publish(purchase_definition()).unwrap();
    let mut v2 = purchase_definition();
    v2.id = DefinitionId::from("purchase-approval-v2");
    v2.steps = vec![ApprovalStepDef::new("s1", "Manager only", [Role::Manager])
        .approve_status(WorkOrderStatus::Approved)];
    registry.publish(v2).unwrap();
    let api = api_with(repository, registry);

    let moved = approve(&api, "mgr", "po-5", "s1").await;
    assert_eq!(moved.current_step_id, Some(StepId::from("s2")), "Still on v1");

    let fresh = create(&api, "po-6", WorkflowType::WorkOrder).await;
    let started = api
        .start_workflow(&ActorId::from("requester"), &fresh.id)
        .await
        .into_result()
        .unwrap();
    assert_eq!(
        started.definition_id,
        Some(DefinitionId::from("purchase-approval-v2"))
    );
    let done = approve(&api, "mgr", "po-6", "s1").await;
    assert_eq!(done.status, WorkOrderStatus::Approved);
}

#[tokio::test]
async fn test_unknown_ids_are_not_found_on_every_backend() {
    let temp_dir = TempDir::new().unwrap();
    let backends: [Arc<dyn WorkItemRepository>; 2] = [
        Arc::new(InMemoryRepository::new()),
        Arc::new(FileRepository::new(temp_dir.path()).unwrap()),
    ];

    for repository in backends {
        let api = purchase_api(repository);
        for id in ["missing", "WO.42", "wo 1"] {
            let item_id = WorkItemId::from(id);
            assert_eq!(
                api.get_item(&item_id).await.error_kind(),
                Some(ErrorKind::NotFound),
                "show {}",
                id
            );
            assert_eq!(
                api.start_workflow(&ActorId::from("requester"), &item_id)
                    .await
                    .error_kind(),
                Some(ErrorKind::NotFound),
                "start {}",
                id
            );
        }
    }
}
