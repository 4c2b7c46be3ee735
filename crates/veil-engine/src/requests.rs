//! Request ledger operations: create, approve, reject, cancel.
//!
//! A request asks for a resource type as a whole; approval decides which
//! concrete resources (if any) the grants cover. The pending-claim on
//! approve/reject/cancel is a guarded update, so two racing responders
//! cannot both resolve the same request.

use veil_core::{
    AccessGrant, AccessRequest, DomainEvent, DurationPolicy, GrantId, RequestId, RequestStatus,
    ResourceRef, ResourceType, Username,
};
use veil_store::{InsertGrantResult, InsertRequestResult, Store};

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::resolver::RelationshipProvider;

/// One grant to create when approving a request.
///
/// An empty `approvals` slice passed to [`Engine::approve`] means "approve
/// the resource type as a whole": one grant with no resource ref, under
/// the owner's policy duration. For individually addressed types the owner
/// instead lists the instances to disclose, optionally overriding the
/// duration per instance.
#[derive(Debug, Clone, Default)]
pub struct ApprovalItem {
    /// The instance to disclose, or `None` for the whole type.
    pub resource_ref: Option<ResourceRef>,
    /// Duration override; the owner's policy duration applies when `None`.
    pub duration: Option<DurationPolicy>,
}

impl<S: Store, R: RelationshipProvider> Engine<S, R> {
    // ─────────────────────────────────────────────────────────────────────────
    // Request Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a pending access request from `requester` to `owner`.
    ///
    /// At most one pending request may exist per (owner, requester,
    /// resource type) triple; a duplicate fails with the existing id so
    /// the caller can surface "already requested".
    pub async fn create_request(
        &self,
        owner: &Username,
        requester: &Username,
        resource_type: ResourceType,
        message: Option<String>,
    ) -> Result<AccessRequest> {
        if owner == requester {
            return Err(EngineError::SelfRequest(owner.clone()));
        }
        let request = AccessRequest::new(
            owner.clone(),
            requester.clone(),
            resource_type,
            message,
            self.now(),
        );
        match self.store.insert_request(&request).await? {
            InsertRequestResult::Inserted => {}
            InsertRequestResult::DuplicatePending { existing } => {
                return Err(EngineError::DuplicatePendingRequest { existing });
            }
        }
        tracing::info!(
            request_id = %request.id,
            owner = %owner,
            requester = %requester,
            resource_type = %resource_type,
            "access request created"
        );
        self.emit(DomainEvent::RequestCreated {
            request_id: request.id,
            owner: owner.clone(),
            requester: requester.clone(),
            resource_type,
        });
        Ok(request)
    }

    /// Approve a pending request, creating the listed grants.
    ///
    /// Only the request's owner may approve. The request is claimed out of
    /// `Pending` first; grants are then created under the one-active-per-
    /// tuple invariant. An approval item that collides with an existing
    /// active grant is skipped with a warning rather than failing the
    /// whole approval — the requester already has that access.
    ///
    /// Returns the ids of the grants actually created.
    pub async fn approve(
        &self,
        request_id: &RequestId,
        responder: &Username,
        approvals: &[ApprovalItem],
    ) -> Result<Vec<GrantId>> {
        let request = self.claim_request(request_id, responder, RequestStatus::Approved).await?;

        let policy = self.get_policy(&request.owner, request.resource_type).await?;
        let now = self.now();

        // Whole-type approval when the owner listed nothing explicitly.
        let implicit = [ApprovalItem::default()];
        let items: &[ApprovalItem] = if approvals.is_empty() && !request.resource_type.is_addressable()
        {
            &implicit
        } else {
            approvals
        };

        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let duration = item
                .duration
                .unwrap_or_else(|| policy.access.derive_duration(now));
            let grant = AccessGrant::new(
                request.owner.clone(),
                request.requester.clone(),
                request.resource_type,
                item.resource_ref.clone(),
                duration,
                now,
            );
            match self.store.insert_grant(&grant).await? {
                InsertGrantResult::Inserted => created.push(grant.id),
                InsertGrantResult::ActiveExists { existing } => {
                    tracing::warn!(
                        request_id = %request_id,
                        existing = %existing,
                        "approval item already covered by an active grant, skipping"
                    );
                }
            }
        }

        tracing::info!(
            request_id = %request_id,
            grants = created.len(),
            "request approved"
        );
        self.emit(DomainEvent::RequestApproved {
            request_id: request.id,
            owner: request.owner,
            requester: request.requester,
            resource_type: request.resource_type,
        });
        Ok(created)
    }

    /// Reject a pending request. Only the request's owner may reject.
    pub async fn reject(&self, request_id: &RequestId, responder: &Username) -> Result<()> {
        let request = self.claim_request(request_id, responder, RequestStatus::Rejected).await?;
        tracing::info!(request_id = %request_id, "request rejected");
        self.emit(DomainEvent::RequestRejected {
            request_id: request.id,
            owner: request.owner,
            requester: request.requester,
            resource_type: request.resource_type,
        });
        Ok(())
    }

    /// Withdraw a pending request. Only its requester may cancel.
    pub async fn cancel(&self, request_id: &RequestId, caller: &Username) -> Result<()> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {request_id}")))?;
        if &request.requester != caller {
            return Err(EngineError::NotOwner {
                caller: caller.clone(),
                what: "request",
            });
        }
        if !self
            .store
            .update_request(request_id, RequestStatus::Cancelled, self.now())
            .await?
        {
            return Err(EngineError::AlreadyResolved(*request_id));
        }
        tracing::info!(request_id = %request_id, "request cancelled");
        self.emit(DomainEvent::RequestCancelled {
            request_id: request.id,
            owner: request.owner,
            requester: request.requester,
            resource_type: request.resource_type,
        });
        Ok(())
    }

    /// Requests addressed to an owner, optionally filtered by status.
    pub async fn requests_for_owner(
        &self,
        owner: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        Ok(self.store.list_requests_by_owner(owner, status).await?)
    }

    /// Requests created by a requester, optionally filtered by status.
    pub async fn requests_by_requester(
        &self,
        requester: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        Ok(self.store.list_requests_by_requester(requester, status).await?)
    }

    /// Load a request, check the responder owns it, and claim it out of
    /// `Pending`. Returns the request as it was before the transition.
    async fn claim_request(
        &self,
        request_id: &RequestId,
        responder: &Username,
        status: RequestStatus,
    ) -> Result<AccessRequest> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {request_id}")))?;
        if &request.owner != responder {
            return Err(EngineError::NotOwner {
                caller: responder.clone(),
                what: "request",
            });
        }
        if !self
            .store
            .update_request(request_id, status, self.now())
            .await?
        {
            return Err(EngineError::AlreadyResolved(*request_id));
        }
        Ok(request)
    }
}
