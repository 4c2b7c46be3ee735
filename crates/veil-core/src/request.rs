//! Access requests: a viewer asking an owner for disclosure.
//!
//! Requests are append-only. Once a request leaves `Pending` it is
//! terminal and immutable; retrying means creating a new request.

use serde::{Deserialize, Serialize};

use crate::types::{RequestId, ResourceType, Username};

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting the owner's decision.
    Pending,
    /// Owner approved; one or more grants were created.
    Approved,
    /// Owner declined.
    Rejected,
    /// Requester withdrew before a decision.
    Cancelled,
}

impl RequestStatus {
    /// Stable string form, used for storage columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// A viewer's request for access to one of an owner's resource types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Unique request id.
    pub id: RequestId,
    /// The profile whose data is requested.
    pub owner: Username,
    /// The viewer asking for access.
    pub requester: Username,
    /// Which resource type is requested.
    pub resource_type: ResourceType,
    /// Optional note from the requester to the owner.
    pub message: Option<String>,
    /// Current lifecycle state.
    pub status: RequestStatus,
    /// When the request was created (Unix ms).
    pub created_at: i64,
    /// When the request left `Pending`, if it has (Unix ms).
    pub responded_at: Option<i64>,
}

impl AccessRequest {
    /// Create a new pending request.
    pub fn new(
        owner: Username,
        requester: Username,
        resource_type: ResourceType,
        message: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            owner,
            requester,
            resource_type,
            message,
            status: RequestStatus::Pending,
            created_at: now,
            responded_at: None,
        }
    }

    /// Whether the request is still awaiting a decision.
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}
