//! Grant ledger operations: create, consume, revoke, list.
//!
//! The ledger is append-only: grants transition forward but are never
//! deleted, so terminal grants double as the audit trail. Expiry is lazy —
//! a past-deadline grant sits in the ledger as `Active` until a read or
//! the sweeper observes it, and the first observer performs the
//! transition.

use veil_core::{
    AccessGrant, DomainEvent, DurationPolicy, GrantId, GrantState, ResourceRef, ResourceType,
    Username,
};
use veil_store::{ConsumeResult, InsertGrantResult, Store, TerminateResult};

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::resolver::RelationshipProvider;

impl<S: Store, R: RelationshipProvider> Engine<S, R> {
    // ─────────────────────────────────────────────────────────────────────────
    // Grant Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a grant directly, outside the request flow.
    ///
    /// `duration` of `None` derives the bound from the owner's policy at
    /// this instant; the result is frozen into the grant either way. At
    /// most one active grant may exist per (owner, grantee, resource type,
    /// resource ref) tuple.
    pub async fn create_grant(
        &self,
        owner: &Username,
        grantee: &Username,
        resource_type: ResourceType,
        resource_ref: Option<ResourceRef>,
        duration: Option<DurationPolicy>,
    ) -> Result<AccessGrant> {
        if owner == grantee {
            return Err(EngineError::SelfRequest(owner.clone()));
        }
        let now = self.now();
        let duration = match duration {
            Some(d) => d,
            None => {
                let policy = self.get_policy(owner, resource_type).await?;
                policy.access.derive_duration(now)
            }
        };
        let grant = AccessGrant::new(
            owner.clone(),
            grantee.clone(),
            resource_type,
            resource_ref,
            duration,
            now,
        );
        match self.store.insert_grant(&grant).await? {
            InsertGrantResult::Inserted => {}
            InsertGrantResult::ActiveExists { existing } => {
                return Err(EngineError::AlreadyGranted { existing });
            }
        }
        tracing::info!(
            grant_id = %grant.id,
            owner = %owner,
            grantee = %grantee,
            resource_type = %resource_type,
            "grant created"
        );
        Ok(grant)
    }

    /// Authorize one read under a grant, consuming a view if the grant is
    /// view-counted.
    ///
    /// This is the gate every grant-backed read passes through. Expiry is
    /// enforced here lazily: a past-deadline grant is transitioned to
    /// `Expired` on observation, and a view-limited grant whose final view
    /// this read consumes is expired in the same atomic step — the read
    /// itself still succeeds.
    pub async fn check_and_consume(&self, grant_id: &GrantId, reader: &Username) -> Result<()> {
        let grant = self
            .store
            .get_grant(grant_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("grant {grant_id}")))?;
        if &grant.grantee != reader {
            return Err(EngineError::WrongGrantee { grant_id: *grant_id });
        }
        match grant.state {
            GrantState::Active => {}
            state => return self.terminal_error(state),
        }

        let now = self.now();
        // Lazy time expiry: first observer past the deadline transitions
        // the grant and emits the event. The store re-checks the deadline
        // atomically, so a renewal that committed after our snapshot
        // wins and the read falls through to consumption.
        if let Some(at) = grant.duration.expires_at() {
            if now >= at {
                if self.store.expire_overdue(grant_id, now).await? {
                    self.emit(DomainEvent::GrantExpired {
                        grant_id: *grant_id,
                        owner: grant.owner,
                        grantee: grant.grantee,
                        resource_type: grant.resource_type,
                    });
                    return Err(EngineError::Expired);
                }
                match self.store.get_grant(grant_id).await? {
                    // Renewed out from under us: still live, keep going.
                    Some(fresh) if fresh.is_live(now) => {}
                    Some(fresh) if fresh.state.is_terminal() => {
                        return self.terminal_error(fresh.state)
                    }
                    _ => return Err(EngineError::Expired),
                }
            }
        }

        match self.store.consume_view(grant_id, now).await? {
            ConsumeResult::Granted { exhausted, .. } => {
                if exhausted {
                    self.emit(DomainEvent::GrantExpired {
                        grant_id: *grant_id,
                        owner: grant.owner,
                        grantee: grant.grantee,
                        resource_type: grant.resource_type,
                    });
                }
                Ok(())
            }
            ConsumeResult::Exhausted => {
                // A grant sitting at its limit while still active means an
                // earlier consumption skipped the eager expiry step.
                tracing::warn!(grant_id = %grant_id, "active grant found with spent view budget");
                Err(EngineError::Expired)
            }
            ConsumeResult::Terminated { state } => self.terminal_error(state),
            ConsumeResult::NotFound => {
                Err(EngineError::NotFound(format!("grant {grant_id}")))
            }
        }
    }

    /// Revoke an active grant. Only the grant's owner may revoke.
    ///
    /// Revoking an already-terminal grant is a no-op: the access is gone
    /// either way, and racing a concurrent expiry should not surface as a
    /// failure to the owner.
    pub async fn revoke(
        &self,
        grant_id: &GrantId,
        caller: &Username,
        reason: Option<&str>,
    ) -> Result<()> {
        let grant = self
            .store
            .get_grant(grant_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("grant {grant_id}")))?;
        if &grant.owner != caller {
            return Err(EngineError::NotOwner {
                caller: caller.clone(),
                what: "grant",
            });
        }
        let outcome = self
            .store
            .terminate_grant(
                grant_id,
                GrantState::Revoked,
                reason.unwrap_or("revoked by owner"),
                self.now(),
            )
            .await?;
        if outcome == TerminateResult::Terminated {
            tracing::info!(grant_id = %grant_id, "grant revoked");
            self.emit(DomainEvent::GrantRevoked {
                grant_id: *grant_id,
                owner: grant.owner,
                grantee: grant.grantee,
                resource_type: grant.resource_type,
            });
        }
        Ok(())
    }

    /// Grants issued by an owner, optionally filtered by state.
    pub async fn grants_by_owner(
        &self,
        owner: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>> {
        Ok(self.store.list_grants_by_owner(owner, state).await?)
    }

    /// Grants held by a grantee, optionally filtered by state.
    pub async fn grants_by_grantee(
        &self,
        grantee: &Username,
        state: Option<GrantState>,
    ) -> Result<Vec<AccessGrant>> {
        Ok(self.store.list_grants_by_grantee(grantee, state).await?)
    }

    fn terminal_error(&self, state: GrantState) -> Result<()> {
        match state {
            GrantState::Expired => Err(EngineError::Expired),
            _ => Err(EngineError::GrantTerminated { state }),
        }
    }
}
