//! In-memory implementation of the Store trait.
//!
//! Primarily for tests. It has the same semantics as SQLite but keeps
//! everything in memory with no persistence. Thread-safe via RwLock; the
//! atomic primitives (`consume_view`, `terminate_grant`) run entirely
//! under the write lock.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use veil_core::{
    AccessGrant, AccessRequest, GrantId, GrantState, RequestId, RequestStatus, ResourceRef,
    ResourceType, Username, VisibilityPolicy,
};

use crate::error::{Result, StoreError};
use crate::traits::{ConsumeResult, InsertGrantResult, InsertRequestResult, Store, TerminateResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Policies keyed by owner and resource type.
    policies: HashMap<(Username, ResourceType), VisibilityPolicy>,

    /// Requests indexed by id.
    requests: HashMap<RequestId, AccessRequest>,

    /// Grants indexed by id.
    grants: HashMap<GrantId, AccessGrant>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn expire(grant: &mut AccessGrant, reason: &str, now: i64) {
    grant.state = GrantState::Expired;
    grant.terminated_at = Some(now);
    grant.termination_reason = Some(reason.to_string());
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
    ) -> Result<Option<VisibilityPolicy>> {
        let inner = self.read()?;
        Ok(inner.policies.get(&(owner.clone(), resource_type)).cloned())
    }

    async fn set_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
        policy: &VisibilityPolicy,
        _now: i64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .policies
            .insert((owner.clone(), resource_type), policy.clone());
        Ok(())
    }

    async fn insert_request(&self, request: &AccessRequest) -> Result<InsertRequestResult> {
        let mut inner = self.write()?;

        // Uniqueness check and insert under one write lock.
        if let Some(existing) = inner.requests.values().find(|r| {
            r.status == RequestStatus::Pending
                && r.owner == request.owner
                && r.requester == request.requester
                && r.resource_type == request.resource_type
        }) {
            return Ok(InsertRequestResult::DuplicatePending {
                existing: existing.id,
            });
        }

        inner.requests.insert(request.id, request.clone());
        Ok(InsertRequestResult::Inserted)
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<AccessRequest>> {
        let inner = self.read()?;
        Ok(inner.requests.get(id).cloned())
    }

    async fn update_request(
        &self,
        id: &RequestId,
        status: RequestStatus,
        responded_at: i64,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.requests.get_mut(id) {
            Some(req) if req.status == RequestStatus::Pending => {
                req.status = status;
                req.responded_at = Some(responded_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_requests_by_owner(
        &self,
        owner: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        let inner = self.read()?;
        let mut requests: Vec<AccessRequest> = inner
            .requests
            .values()
            .filter(|r| &r.owner == owner && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn list_requests_by_requester(
        &self,
        requester: &Username,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>> {
        let inner = self.read()?;
        let mut requests: Vec<AccessRequest> = inner
            .requests
            .values()
            .filter(|r| &r.requester == requester && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> Result<InsertGrantResult> {
        let mut inner = self.write()?;

        if let Some(existing) = inner.grants.values().find(|g| {
            g.state == GrantState::Active
                && g.owner == grant.owner
                && g.grantee == grant.grantee
                && g.resource_type == grant.resource_type
                && g.resource_ref == grant.resource_ref
        }) {
            return Ok(InsertGrantResult::ActiveExists {
                existing: existing.id,
            });
        }

        inner.grants.insert(grant.id, grant.clone());
        Ok(InsertGrantResult::Inserted)
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<AccessGrant>> {
        let inner = self.read()?;
        Ok(inner.grants.get(id).cloned())
    }

    async fn find_active_grant(
        &self,
        owner: &Username,
        grantee: &Username,
        resource_type: ResourceType,
        resource_ref: Option<&ResourceRef>,
    ) -> Result<Option<AccessGrant>> {
        let inner = self.read()?;
        Ok(inner
            .grants
            .values()
            .find(|g| {
                g.state == GrantState::Active
                    && &g.owner == owner
                    && &g.grantee == grantee
                    && g.resource_type == resource_type
                    && g.resource_ref.as_ref() == resource_ref
            })
            .cloned())
    }

    async fn list_grants_by_owner(
        &self,
        owner: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>> {
        let inner = self.read()?;
        let mut grants: Vec<AccessGrant> = inner
            .grants
            .values()
            .filter(|g| &g.owner == owner && state.map_or(true, |s| g.state == s))
            .cloned()
            .collect();
        grants.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(grants)
    }

    async fn list_grants_by_grantee(
        &self,
        grantee: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>> {
        let inner = self.read()?;
        let mut grants: Vec<AccessGrant> = inner
            .grants
            .values()
            .filter(|g| &g.grantee == grantee && state.map_or(true, |s| g.state == s))
            .cloned()
            .collect();
        grants.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(grants)
    }

    async fn terminate_grant(
        &self,
        id: &GrantId,
        state: GrantState,
        reason: &str,
        now: i64,
    ) -> Result<TerminateResult> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(id) {
            None => Ok(TerminateResult::NotFound),
            Some(grant) if grant.state.is_terminal() => Ok(TerminateResult::AlreadyTerminal),
            Some(grant) => {
                grant.state = state;
                grant.terminated_at = Some(now);
                grant.termination_reason = Some(reason.to_string());
                Ok(TerminateResult::Terminated)
            }
        }
    }

    async fn expire_overdue(&self, id: &GrantId, now: i64) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(id) {
            // The deadline is re-read under the write lock, so a renewal
            // that committed after the caller's snapshot wins.
            Some(grant)
                if grant.state == GrantState::Active
                    && grant.duration.expires_at().is_some_and(|at| at <= now) =>
            {
                expire(grant, "duration elapsed", now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_view(&self, id: &GrantId, now: i64) -> Result<ConsumeResult> {
        let mut inner = self.write()?;

        let grant = match inner.grants.get_mut(id) {
            None => return Ok(ConsumeResult::NotFound),
            Some(g) => g,
        };

        if grant.state != GrantState::Active {
            return Ok(ConsumeResult::Terminated { state: grant.state });
        }

        let limit = match grant.duration.view_limit() {
            None => {
                return Ok(ConsumeResult::Granted {
                    views_remaining: None,
                    exhausted: false,
                })
            }
            Some(limit) => limit,
        };

        if grant.views_consumed >= limit {
            expire(grant, "view limit reached", now);
            return Ok(ConsumeResult::Exhausted);
        }

        grant.views_consumed += 1;
        let remaining = limit - grant.views_consumed;
        let exhausted = remaining == 0;
        if exhausted {
            expire(grant, "view limit reached", now);
        }

        Ok(ConsumeResult::Granted {
            views_remaining: Some(remaining),
            exhausted,
        })
    }

    async fn renew_grant(&self, id: &GrantId, new_expires_at: i64) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(id) {
            Some(grant)
                if grant.state == GrantState::Active && grant.duration.is_renewable() =>
            {
                grant.duration = veil_core::DurationPolicy::ExpiresAt { at: new_expires_at };
                grant.views_consumed = 0;
                grant.warning_sent = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_warning_sent(&self, id: &GrantId) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(id) {
            Some(grant) if grant.state == GrantState::Active && !grant.warning_sent => {
                grant.warning_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active_timed(&self) -> Result<Vec<AccessGrant>> {
        let inner = self.read()?;
        let mut grants: Vec<AccessGrant> = inner
            .grants
            .values()
            .filter(|g| g.state == GrantState::Active && g.duration.expires_at().is_some())
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.granted_at.cmp(&b.granted_at));
        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::DurationPolicy;

    fn make_grant(duration: DurationPolicy) -> AccessGrant {
        AccessGrant::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::Images,
            Some(ResourceRef::from("img-1")),
            duration,
            1_000,
        )
    }

    #[tokio::test]
    async fn test_insert_grant_rejects_duplicate_active() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::Permanent);
        assert_eq!(
            store.insert_grant(&grant).await.unwrap(),
            InsertGrantResult::Inserted
        );

        let dup = make_grant(DurationPolicy::Permanent);
        assert_eq!(
            store.insert_grant(&dup).await.unwrap(),
            InsertGrantResult::ActiveExists { existing: grant.id }
        );
    }

    #[tokio::test]
    async fn test_terminated_tuple_can_be_regranted() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::Permanent);
        store.insert_grant(&grant).await.unwrap();
        store
            .terminate_grant(&grant.id, GrantState::Revoked, "changed my mind", 2_000)
            .await
            .unwrap();

        let again = make_grant(DurationPolicy::Permanent);
        assert_eq!(
            store.insert_grant(&again).await.unwrap(),
            InsertGrantResult::Inserted
        );
    }

    #[tokio::test]
    async fn test_terminate_first_writer_wins() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::Permanent);
        store.insert_grant(&grant).await.unwrap();

        let first = store
            .terminate_grant(&grant.id, GrantState::Expired, "duration elapsed", 2_000)
            .await
            .unwrap();
        let second = store
            .terminate_grant(&grant.id, GrantState::Revoked, "owner action", 2_001)
            .await
            .unwrap();

        assert_eq!(first, TerminateResult::Terminated);
        assert_eq!(second, TerminateResult::AlreadyTerminal);

        // The losing writer did not overwrite the terminal state.
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Expired);
        assert_eq!(stored.terminated_at, Some(2_000));
    }

    #[tokio::test]
    async fn test_consume_one_time_view() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::OneTimeView);
        store.insert_grant(&grant).await.unwrap();

        let first = store.consume_view(&grant.id, 2_000).await.unwrap();
        assert_eq!(
            first,
            ConsumeResult::Granted {
                views_remaining: Some(0),
                exhausted: true,
            }
        );

        // The consuming read expired the grant in the same step.
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Expired);
        assert_eq!(stored.views_consumed, 1);

        let second = store.consume_view(&grant.id, 2_001).await.unwrap();
        assert_eq!(
            second,
            ConsumeResult::Terminated {
                state: GrantState::Expired
            }
        );
    }

    #[tokio::test]
    async fn test_consume_unlimited_never_increments() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::Permanent);
        store.insert_grant(&grant).await.unwrap();

        for _ in 0..10 {
            let result = store.consume_view(&grant.id, 2_000).await.unwrap();
            assert_eq!(
                result,
                ConsumeResult::Granted {
                    views_remaining: None,
                    exhausted: false,
                }
            );
        }
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.views_consumed, 0);
    }

    #[tokio::test]
    async fn test_warning_flag_set_once() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::ExpiresAt { at: 100_000 });
        store.insert_grant(&grant).await.unwrap();

        assert!(store.mark_warning_sent(&grant.id).await.unwrap());
        assert!(!store.mark_warning_sent(&grant.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_renew_resets_counters() {
        let store = MemoryStore::new();
        let mut grant = make_grant(DurationPolicy::ExpiresAt { at: 5_000 });
        grant.warning_sent = true;
        store.insert_grant(&grant).await.unwrap();

        assert!(store.renew_grant(&grant.id, 9_000).await.unwrap());
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.duration.expires_at(), Some(9_000));
        assert!(!stored.warning_sent);

        // View-counted grants never renew.
        let otv = make_grant(DurationPolicy::OneTimeView);
        let otv_id = otv.id;
        // Different ref so the active-tuple invariant allows both.
        let mut otv = otv;
        otv.resource_ref = Some(ResourceRef::from("img-2"));
        store.insert_grant(&otv).await.unwrap();
        assert!(!store.renew_grant(&otv_id, 9_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_overdue_respects_deadline() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::ExpiresAt { at: 5_000 });
        store.insert_grant(&grant).await.unwrap();

        // Not yet due: no-op.
        assert!(!store.expire_overdue(&grant.id, 4_999).await.unwrap());
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Active);

        assert!(store.expire_overdue(&grant.id, 5_000).await.unwrap());
        assert!(!store.expire_overdue(&grant.id, 5_001).await.unwrap());
        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Expired);
        assert_eq!(stored.termination_reason.as_deref(), Some("duration elapsed"));
    }

    #[tokio::test]
    async fn test_renewal_defuses_stale_expiry() {
        let store = MemoryStore::new();
        let grant = make_grant(DurationPolicy::ExpiresAt { at: 5_000 });
        store.insert_grant(&grant).await.unwrap();

        // A reader snapshots the grant past its deadline, but a renewal
        // commits before the reader's expiry lands.
        assert!(store.renew_grant(&grant.id, 9_000).await.unwrap());
        assert!(!store.expire_overdue(&grant.id, 6_000).await.unwrap());

        let stored = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.state, GrantState::Active);
        assert_eq!(stored.duration.expires_at(), Some(9_000));
    }

    #[tokio::test]
    async fn test_duplicate_pending_request_detected() {
        let store = MemoryStore::new();
        let req = AccessRequest::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::Images,
            None,
            1_000,
        );
        assert_eq!(
            store.insert_request(&req).await.unwrap(),
            InsertRequestResult::Inserted
        );

        let dup = AccessRequest::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::Images,
            Some("again".to_string()),
            1_001,
        );
        assert_eq!(
            store.insert_request(&dup).await.unwrap(),
            InsertRequestResult::DuplicatePending { existing: req.id }
        );

        // Once resolved, a new request for the triple is allowed.
        store
            .update_request(&req.id, RequestStatus::Rejected, 1_002)
            .await
            .unwrap();
        assert_eq!(
            store.insert_request(&dup).await.unwrap(),
            InsertRequestResult::Inserted
        );
    }

    #[tokio::test]
    async fn test_update_request_only_from_pending() {
        let store = MemoryStore::new();
        let req = AccessRequest::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::ContactEmail,
            None,
            1_000,
        );
        store.insert_request(&req).await.unwrap();

        assert!(store
            .update_request(&req.id, RequestStatus::Approved, 1_500)
            .await
            .unwrap());
        assert!(!store
            .update_request(&req.id, RequestStatus::Rejected, 1_600)
            .await
            .unwrap());

        let stored = store.get_request(&req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.responded_at, Some(1_500));
    }
}
