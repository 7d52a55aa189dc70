//! Workflow Core Library
//!
//! Approval workflow engine for work orders and related requests:
//! definition registry, approval engine, orchestration, storage and the
//! caller-facing API.

pub mod config;
pub mod error;
pub mod services;
pub mod storage;
pub mod workflow;

pub use config::{StorageBackend, StorageConfig, WorkflowConfig};
pub use error::{ErrorKind, Result, WorkflowError};

pub use services::{ApiError, ApiResponse, StaticIdentityProvider, WorkflowApi};
pub use storage::{FileRepository, InMemoryRepository, StatusCounts};

pub use workflow::{
    ActiveWorkflows, ApprovalEngine, ApprovalRequest, DefinitionRef, DefinitionRegistry,
    DefinitionStore, IdentityProvider, NewWorkItem, WorkItemRepository, WorkflowOrchestrator,
};
