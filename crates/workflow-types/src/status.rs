//! Closed enumerations for statuses, roles and workflow types
//! Unknown strings are rejected at the parsing boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string does not name a known variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Externally visible status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Draft,
    PendingApproval,
    InProgress,
    Incomplete,
    Complete,
    Cancelled,
    Rejected,
    Approved,
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 8] = [
        Self::Draft,
        Self::PendingApproval,
        Self::InProgress,
        Self::Incomplete,
        Self::Complete,
        Self::Cancelled,
        Self::Rejected,
        Self::Approved,
    ];

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Cancelled | Self::Rejected | Self::Approved
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending_approval",
            Self::InProgress => "in_progress",
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Approved => "approved",
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("status", s))
    }
}

/// Role identifiers used for approver matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Manager,
    Director,
    /// Technology partner
    Tp,
    Staff,
    Dusp,
    Mcmc,
    Sso,
    Vendor,
    Member,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Self::SuperAdmin,
        Self::Admin,
        Self::Manager,
        Self::Director,
        Self::Tp,
        Self::Staff,
        Self::Dusp,
        Self::Mcmc,
        Self::Sso,
        Self::Vendor,
        Self::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Director => "director",
            Self::Tp => "tp",
            Self::Staff => "staff",
            Self::Dusp => "dusp",
            Self::Mcmc => "mcmc",
            Self::Sso => "sso",
            Self::Vendor => "vendor",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("role", s))
    }
}

/// Kind of process a definition routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    WorkOrder,
    TrainingReport,
    CenterManagement,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 3] = [
        Self::WorkOrder,
        Self::TrainingReport,
        Self::CenterManagement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkOrder => "work_order",
            Self::TrainingReport => "training_report",
            Self::CenterManagement => "center_management",
        }
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("workflow type", s))
    }
}

/// Decision taken by an approver on a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
