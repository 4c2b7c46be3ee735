//! Domain events emitted by the engine.
//!
//! Events describe lifecycle transitions for an external notification
//! dispatcher. Delivery is out of scope; the engine only guarantees that
//! each transition emits its event exactly once.

use serde::{Deserialize, Serialize};

use crate::types::{GrantId, RequestId, ResourceType, Username};

/// A lifecycle transition worth notifying someone about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A viewer created an access request.
    RequestCreated {
        request_id: RequestId,
        owner: Username,
        requester: Username,
        resource_type: ResourceType,
    },
    /// The owner approved a request.
    RequestApproved {
        request_id: RequestId,
        owner: Username,
        requester: Username,
        resource_type: ResourceType,
    },
    /// The owner rejected a request.
    RequestRejected {
        request_id: RequestId,
        owner: Username,
        requester: Username,
        resource_type: ResourceType,
    },
    /// The requester withdrew a request.
    RequestCancelled {
        request_id: RequestId,
        owner: Username,
        requester: Username,
        resource_type: ResourceType,
    },
    /// The owner revoked an active grant.
    GrantRevoked {
        grant_id: GrantId,
        owner: Username,
        grantee: Username,
        resource_type: ResourceType,
    },
    /// A time-bounded grant is inside its warning window.
    GrantExpiringSoon {
        grant_id: GrantId,
        owner: Username,
        grantee: Username,
        resource_type: ResourceType,
        expires_at: i64,
    },
    /// A grant ran out of time or views.
    GrantExpired {
        grant_id: GrantId,
        owner: Username,
        grantee: Username,
        resource_type: ResourceType,
    },
}

impl DomainEvent {
    /// The owner side of the event, for routing.
    pub fn owner(&self) -> &Username {
        match self {
            DomainEvent::RequestCreated { owner, .. }
            | DomainEvent::RequestApproved { owner, .. }
            | DomainEvent::RequestRejected { owner, .. }
            | DomainEvent::RequestCancelled { owner, .. }
            | DomainEvent::GrantRevoked { owner, .. }
            | DomainEvent::GrantExpiringSoon { owner, .. }
            | DomainEvent::GrantExpired { owner, .. } => owner,
        }
    }

    /// The counterparty (requester or grantee), for routing.
    pub fn counterparty(&self) -> &Username {
        match self {
            DomainEvent::RequestCreated { requester, .. }
            | DomainEvent::RequestApproved { requester, .. }
            | DomainEvent::RequestRejected { requester, .. }
            | DomainEvent::RequestCancelled { requester, .. } => requester,
            DomainEvent::GrantRevoked { grantee, .. }
            | DomainEvent::GrantExpiringSoon { grantee, .. }
            | DomainEvent::GrantExpired { grantee, .. } => grantee,
        }
    }
}
