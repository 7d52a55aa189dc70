//! Work item storage backends

pub mod file_store;
pub mod memory;

pub use file_store::FileRepository;
pub use memory::InMemoryRepository;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use workflow_types::{WorkItem, WorkOrderStatus};

/// Number of stored items per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    counts: BTreeMap<WorkOrderStatus, usize>,
}

impl StatusCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let mut counts = Self::new();
        for item in items {
            counts.increment(item.status);
        }
        counts
    }

    pub fn increment(&mut self, status: WorkOrderStatus) {
        *self.counts.entry(status).or_insert(0) += 1;
    }

    pub fn get(&self, status: WorkOrderStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Items that have not reached a terminal status
    pub fn open(&self) -> usize {
        self.counts
            .iter()
            .filter(|(status, _)| !status.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }
}
