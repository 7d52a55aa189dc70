//! Workflow management module

pub mod definitions;
pub mod engine;
pub mod orchestrator;
pub mod traits;

pub use definitions::DefinitionRegistry;
pub use engine::{ApprovalEngine, ApprovalRequest};
pub use orchestrator::{ActiveWorkflows, NewWorkItem, WorkflowOrchestrator};
pub use traits::{DefinitionRef, DefinitionStore, IdentityProvider, WorkItemRepository};
