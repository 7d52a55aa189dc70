//! Collaborator traits the orchestrator is built on
//!
//! Each seam has explicit, typed parameters so tests can swap in
//! in-memory or failure-injecting implementations.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use workflow_types::{ActorId, DefinitionId, Role, WorkItem, WorkItemId, WorkflowDefinition, WorkflowType};

/// How a definition is looked up: by its published id or by the workflow type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionRef {
    Id(DefinitionId),
    Type(WorkflowType),
}

impl std::fmt::Display for DefinitionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "definition {}", id),
            Self::Type(kind) => write!(f, "active definition for {}", kind),
        }
    }
}

/// Read-only source of immutable workflow definitions
pub trait DefinitionStore: Send + Sync {
    /// Resolve a definition, failing with `NotFound` if unknown
    fn get_definition(&self, reference: &DefinitionRef) -> Result<Arc<WorkflowDefinition>>;

    /// All known definitions
    fn definitions(&self) -> Vec<Arc<WorkflowDefinition>>;
}

/// Persistence for work items with optimistic concurrency
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Load an item, failing with `NotFound` if unknown
    async fn load_work_item(&self, id: &WorkItemId) -> Result<WorkItem>;

    /// Store a new item at version 0, failing if the id is taken
    async fn insert_work_item(&self, item: &WorkItem) -> Result<WorkItem>;

    /// Replace an item if the stored version still equals `expected_version`.
    /// Returns the stored item with its bumped version, or `Conflict`.
    async fn save_work_item(&self, item: &WorkItem, expected_version: u64) -> Result<WorkItem>;

    /// Items whose status is not terminal
    async fn list_open_work_items(&self) -> Result<Vec<WorkItem>>;

    /// Every stored item
    async fn list_work_items(&self) -> Result<Vec<WorkItem>>;
}

/// Resolves the roles of an actor at call time
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_actor_roles(&self, actor_id: &ActorId) -> Result<BTreeSet<Role>>;
}
