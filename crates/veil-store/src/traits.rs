//! Store trait: the abstract interface for ledger persistence.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests and embedded use).

use async_trait::async_trait;

use veil_core::{
    AccessGrant, AccessRequest, GrantId, GrantState, RequestId, RequestStatus, ResourceRef,
    ResourceType, Username, VisibilityPolicy,
};

use crate::error::Result;

/// Result of inserting an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertRequestResult {
    /// Request was inserted successfully.
    Inserted,
    /// A pending request already exists for the same
    /// (owner, requester, resource_type) triple.
    DuplicatePending {
        /// The existing pending request.
        existing: RequestId,
    },
}

/// Result of inserting an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertGrantResult {
    /// Grant was inserted successfully.
    Inserted,
    /// An active grant already exists for the same
    /// (owner, grantee, resource_type, resource_ref) tuple.
    ActiveExists {
        /// The existing active grant.
        existing: GrantId,
    },
}

/// Result of a terminal transition attempt.
///
/// Terminal transitions are single-writer-wins: only the first writer
/// observes `Terminated`. Revocation uses [`Store::terminate_grant`];
/// time expiry (lazy and swept) goes through the deadline-guarded
/// [`Store::expire_overdue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateResult {
    /// This call performed the transition.
    Terminated,
    /// The grant was already in a terminal state; nothing changed.
    AlreadyTerminal,
    /// No such grant.
    NotFound,
}

/// Result of the atomic view-consumption step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    /// The read may proceed.
    Granted {
        /// Remaining view budget after this read; `None` when unlimited.
        views_remaining: Option<u32>,
        /// Whether this read consumed the final view and expired the
        /// grant in the same atomic step.
        exhausted: bool,
    },
    /// The view budget was already spent; the grant is now expired.
    Exhausted,
    /// The grant is in a terminal state.
    Terminated {
        /// Which terminal state was observed.
        state: GrantState,
    },
    /// No such grant.
    NotFound,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Atomic uniqueness**: `insert_request` and `insert_grant` perform
///   the invariant check and the insert as one atomic step, so callers
///   never race a check-then-insert.
/// - **Single-writer terminal transitions**: `terminate_grant` succeeds
///   for exactly one caller; late callers see `AlreadyTerminal`.
/// - **Atomic consumption**: `consume_view` is the increment-and-compare
///   for view-limited grants. No interleaving of two calls may push
///   `views_consumed` past the limit.
/// - **Append-only history**: grants and requests are never deleted, only
///   transitioned.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Policy Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the stored policy for an owner and resource type, if any.
    async fn get_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
    ) -> Result<Option<VisibilityPolicy>>;

    /// Replace the policy for an owner and resource type atomically.
    async fn set_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
        policy: &VisibilityPolicy,
        now: i64,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Request Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a pending request, enforcing the one-pending-per-triple
    /// invariant in the same atomic step.
    async fn insert_request(&self, request: &AccessRequest) -> Result<InsertRequestResult>;

    /// Get a request by id.
    async fn get_request(&self, id: &RequestId) -> Result<Option<AccessRequest>>;

    /// Record a request's transition out of `Pending`. Guarded: returns
    /// true only if the request existed and was still pending, so two
    /// racing responders cannot both resolve it.
    async fn update_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        responded_at: i64,
    ) -> Result<bool>;

    /// List requests addressed to an owner, newest first.
    async fn list_requests_by_owner(
        &self,
        owner: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>>;

    /// List requests created by a requester, newest first.
    async fn list_requests_by_requester(
        &self,
        requester: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an active grant, enforcing the one-active-per-tuple
    /// invariant in the same atomic step.
    async fn insert_grant(&self, grant: &AccessGrant) -> Result<InsertGrantResult>;

    /// Get a grant by id.
    async fn get_grant(&self, id: &GrantId) -> Result<Option<AccessGrant>>;

    /// Find the active grant for an exact resource tuple, if any.
    async fn find_active_grant(
        &self,
        owner: &Username,
        grantee: &Username,
        resource_type: ResourceType,
        resource_ref: Option<&ResourceRef>,
    ) -> Result<Option<AccessGrant>>;

    /// List grants issued by an owner, newest first.
    async fn list_grants_by_owner(
        &self,
        owner: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>>;

    /// List grants held by a grantee, newest first.
    async fn list_grants_by_grantee(
        &self,
        grantee: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>>;

    /// Transition a grant to a terminal state. First writer wins.
    async fn terminate_grant(
        &self,
        id: &GrantId,
        state: GrantState,
        reason: &str,
        now: i64,
    ) -> Result<TerminateResult>;

    /// Expire an overdue timed grant. Guarded by the deadline as well as
    /// the active state, so a caller acting on a stale snapshot cannot
    /// expire a grant that a racing renewal just pushed into the future.
    /// Returns true only for the call that performed the transition.
    async fn expire_overdue(&self, id: &GrantId, now: i64) -> Result<bool>;

    /// Atomically consume one view of a grant.
    ///
    /// For grants without a view limit this is a no-op check that the
    /// grant is still active. For view-limited grants, the compare and
    /// increment happen as one step; the read that consumes the final
    /// view also expires the grant in the same step.
    async fn consume_view(&self, id: &GrantId, now: i64) -> Result<ConsumeResult>;

    /// Extend an active timed grant to a new expiry, resetting its view
    /// counter and warning flag. Returns false if the grant is missing or
    /// no longer active.
    async fn renew_grant(&self, id: &GrantId, new_expires_at: i64) -> Result<bool>;

    /// Set the expiring-soon warning flag. Returns true only for the call
    /// that flipped it, so the warning event fires at most once.
    async fn mark_warning_sent(&self, id: &GrantId) -> Result<bool>;

    /// All active grants carrying an `ExpiresAt` bound, for the sweeper.
    async fn list_active_timed(&self) -> Result<Vec<AccessGrant>>;
}
