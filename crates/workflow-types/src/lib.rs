//! Shared types for the approval workflow engine
//!
//! Definitions, work items and the closed enumerations they are built from.
//! Everything here is plain data; the transition rules live in `workflow-core`.

pub mod definition;
pub mod ids;
pub mod item;
pub mod status;

pub use definition::{ApprovalStepDef, DefinitionError, WorkflowDefinition};
pub use ids::{ActorId, DefinitionId, StepId, WorkItemId};
pub use item::{ApprovalRecord, WorkItem};
pub use status::{ApprovalAction, ParseEnumError, Role, WorkOrderStatus, WorkflowType};
