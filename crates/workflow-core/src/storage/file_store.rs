//! File-backed work item repository
//! One JSON file per item, kept in a directory named after its status

use crate::error::{Result, WorkflowError};
use crate::workflow::traits::WorkItemRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use workflow_types::{WorkItem, WorkItemId, WorkOrderStatus};

/// Repository storing items as `<root>/<status>/item_<id>.json`.
///
/// Status changes move the file between directories. Every mutation runs
/// under one lock, which makes the version check and the write atomic for
/// this process.
pub struct FileRepository {
    root_path: PathBuf,
    lock: Mutex<()>,
}

impl FileRepository {
    /// Create repository with specified root path, creating the status directories
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        for status in WorkOrderStatus::ALL {
            fs::create_dir_all(root_path.join(status.as_str()))?;
        }

        Ok(Self {
            root_path,
            lock: Mutex::new(()),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Whether an id can be used as part of a file name
    fn is_storable_id(id: &WorkItemId) -> bool {
        !id.as_str().is_empty()
            && id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Get path for an item in a specific status
    fn item_path(&self, status: WorkOrderStatus, id: &WorkItemId) -> Result<PathBuf> {
        if !Self::is_storable_id(id) {
            return Err(WorkflowError::Storage(format!(
                "work item id '{}' cannot be stored as a file name",
                id
            )));
        }

        Ok(self
            .root_path
            .join(status.as_str())
            .join(format!("item_{}.json", id)))
    }

    /// Every status directory holding a file for this item
    fn item_copies(&self, id: &WorkItemId) -> Result<Vec<PathBuf>> {
        if !Self::is_storable_id(id) {
            return Ok(Vec::new());
        }

        let mut copies = Vec::new();
        for status in WorkOrderStatus::ALL {
            let path = self.item_path(status, id)?;
            if path.exists() {
                copies.push(path);
            }
        }
        Ok(copies)
    }

    /// Find the current copy of an item.
    ///
    /// An interrupted move can leave the item in two status directories;
    /// the copy with the highest version wins.
    fn find_item(&self, id: &WorkItemId) -> Result<Option<(PathBuf, WorkItem)>> {
        let copies = self.item_copies(id)?;
        if copies.len() > 1 {
            log::warn!("Item {} has {} copies, using the newest", id, copies.len());
        }

        let mut newest: Option<(PathBuf, WorkItem)> = None;
        for path in copies {
            let item = self.read_item(&path)?;
            if newest.as_ref().map_or(true, |(_, n)| item.version > n.version) {
                newest = Some((path, item));
            }
        }
        Ok(newest)
    }

    /// Write through a temporary file so readers never see partial JSON
    fn write_item(&self, path: &Path, item: &WorkItem) -> Result<()> {
        let json = serde_json::to_string_pretty(item)
            .map_err(|e| WorkflowError::Storage(format!("Failed to serialize item: {}", e)))?;

        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;

        Ok(())
    }

    fn read_item(&self, path: &Path) -> Result<WorkItem> {
        let json = fs::read_to_string(path)?;

        serde_json::from_str(&json)
            .map_err(|e| WorkflowError::Storage(format!("Failed to deserialize {}: {}", path.display(), e)))
    }

    /// List items in a specific status, skipping unreadable files
    pub fn list_items_by_status(&self, status: WorkOrderStatus) -> Result<Vec<WorkItem>> {
        let status_dir = self.root_path.join(status.as_str());

        if !status_dir.exists() {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        for entry in fs::read_dir(&status_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                match self.read_item(&path) {
                    Ok(item) => items.push(item),
                    Err(e) => log::warn!("Skipping unreadable item file {:?}: {}", path, e),
                }
            }
        }

        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    fn list_matching(&self, include: impl Fn(WorkOrderStatus) -> bool) -> Result<Vec<WorkItem>> {
        let mut newest: HashMap<WorkItemId, WorkItem> = HashMap::new();
        for status in WorkOrderStatus::ALL {
            for item in self.list_items_by_status(status)? {
                match newest.get(&item.id) {
                    Some(seen) if seen.version >= item.version => {}
                    _ => {
                        newest.insert(item.id.clone(), item);
                    }
                }
            }
        }

        let mut items: Vec<_> = newest
            .into_values()
            .filter(|item| include(item.status))
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }
}

#[async_trait]
impl WorkItemRepository for FileRepository {
    async fn load_work_item(&self, id: &WorkItemId) -> Result<WorkItem> {
        let _guard = self.lock.lock().await;

        match self.find_item(id)? {
            Some((_, item)) => Ok(item),
            None => Err(WorkflowError::NotFound(format!("work item {}", id))),
        }
    }

    async fn insert_work_item(&self, item: &WorkItem) -> Result<WorkItem> {
        let _guard = self.lock.lock().await;

        let path = self.item_path(item.status, &item.id)?;
        if !self.item_copies(&item.id)?.is_empty() {
            return Err(WorkflowError::Storage(format!(
                "work item {} already exists",
                item.id
            )));
        }

        let mut stored = item.clone();
        stored.version = 0;
        self.write_item(&path, &stored)?;

        log::info!("Created work item {} in {}", stored.id, stored.status);
        Ok(stored)
    }

    async fn save_work_item(&self, item: &WorkItem, expected_version: u64) -> Result<WorkItem> {
        let _guard = self.lock.lock().await;

        let (current_path, current) = self
            .find_item(&item.id)?
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

        let new_path = self.item_path(stored.status, &stored.id)?;
        self.write_item(&new_path, &stored)?;

        // Drop the previous status file and any copy left by an interrupted move
        for stale in self.item_copies(&stored.id)? {
            if stale != new_path {
                fs::remove_file(&stale)?;
            }
        }

        if new_path != current_path {
            log::info!(
                "Moved work item {} from {} to {}",
                stored.id,
                current.status,
                stored.status
            );
        }

        Ok(stored)
    }

    async fn list_open_work_items(&self) -> Result<Vec<WorkItem>> {
        let _guard = self.lock.lock().await;
        self.list_matching(|status| !status.is_terminal())
    }

    async fn list_work_items(&self) -> Result<Vec<WorkItem>> {
        let _guard = self.lock.lock().await;
        self.list_matching(|_| true)
    }
}
