//! In-memory work item repository

use crate::error::{Result, WorkflowError};
use crate::workflow::traits::WorkItemRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use workflow_types::{WorkItem, WorkItemId};

/// Process-local repository. Version checks happen under the write lock,
/// so concurrent saves of one item are serialized.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    items: RwLock<HashMap<WorkItemId, WorkItem>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkItemRepository for InMemoryRepository {
    async fn load_work_item(&self, id: &WorkItemId) -> Result<WorkItem> {
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(format!("work item {}", id)))
    }

    async fn insert_work_item(&self, item: &WorkItem) -> Result<WorkItem> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(WorkflowError::Storage(format!(
                "work item {} already exists",
                item.id
            )));
        }

        let mut stored = item.clone();
        stored.version = 0;
        items.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn save_work_item(&self, item: &WorkItem, expected_version: u64) -> Result<WorkItem> {
        let mut items = self.items.write().await;
        let current = items
            .get(&item.id)
            .ok_or_else(|| WorkflowError::NotFound(format!("work item {}", item.id)))?;

        if current.version != expected_version {
            return Err(WorkflowError::Conflict {
                item: item.id.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut stored = item.clone();
        stored.version = expected_version + 1;
        items.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn list_open_work_items(&self) -> Result<Vec<WorkItem>> {
        let items = self.items.read().await;
        let mut open: Vec<_> = items
            .values()
            .filter(|item| !item.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }

    async fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        let items = self.items.read().await;
        let mut all: Vec<_> = items.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
