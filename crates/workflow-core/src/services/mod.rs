//! Identity resolution and the caller-facing API

pub mod api;
pub mod identity;

pub use api::{ApiError, ApiResponse, WorkflowApi};
pub use identity::StaticIdentityProvider;
