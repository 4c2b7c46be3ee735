//! Access grants: explicit, bounded authorizations for one viewer to see
//! one resource.
//!
//! Grants are created active and only ever transition forward: to
//! `Expired` when their time or view budget runs out, or to `Revoked` by
//! owner action. Terminal grants are kept as the audit trail; re-granting
//! means creating a new grant.

use serde::{Deserialize, Serialize};

use crate::types::{GrantId, ResourceRef, ResourceType, Username};

/// How long, or how many reads, a grant is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationPolicy {
    /// Never expires on its own; only revocation ends it.
    Permanent,
    /// Expires once the wall clock reaches the timestamp (Unix ms).
    ExpiresAt { at: i64 },
    /// Consumed by the first successful read.
    OneTimeView,
    /// Consumed after `limit` successful reads.
    ViewLimited { limit: u32 },
}

impl DurationPolicy {
    /// The view budget, if this policy is view-counted.
    pub fn view_limit(&self) -> Option<u32> {
        match self {
            DurationPolicy::OneTimeView => Some(1),
            DurationPolicy::ViewLimited { limit } => Some(*limit),
            _ => None,
        }
    }

    /// The expiry timestamp, if this policy is time-bounded.
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            DurationPolicy::ExpiresAt { at } => Some(*at),
            _ => None,
        }
    }

    /// Whether the sweeper may auto-renew a grant under this policy.
    ///
    /// Only duration-based grants renew; view-counted grants never do.
    pub fn is_renewable(&self) -> bool {
        matches!(self, DurationPolicy::ExpiresAt { .. })
    }
}

/// Lifecycle state of a grant. `Expired` and `Revoked` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    Active,
    Expired,
    Revoked,
}

impl GrantState {
    /// Stable string form, used for storage columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantState::Active => "active",
            GrantState::Expired => "expired",
            GrantState::Revoked => "revoked",
        }
    }

    /// Parse the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GrantState::Active),
            "expired" => Some(GrantState::Expired),
            "revoked" => Some(GrantState::Revoked),
            _ => None,
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GrantState::Active)
    }
}

/// An explicit authorization for one grantee to read one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Unique grant id.
    pub id: GrantId,
    /// The profile whose data is disclosed.
    pub owner: Username,
    /// The viewer holding the grant.
    pub grantee: Username,
    /// Which resource type the grant covers.
    pub resource_type: ResourceType,
    /// Which instance, for individually addressed resources (images).
    /// `None` for scalar PII fields.
    pub resource_ref: Option<ResourceRef>,
    /// The bound fixed at grant time. Later policy edits never change it.
    pub duration: DurationPolicy,
    /// Successful reads so far. Monotonic; never exceeds the view limit.
    pub views_consumed: u32,
    /// Current lifecycle state.
    pub state: GrantState,
    /// When the grant was created (Unix ms).
    pub granted_at: i64,
    /// When the grant reached a terminal state, if it has (Unix ms).
    pub terminated_at: Option<i64>,
    /// Why the grant ended (revocation reason or expiry cause).
    pub termination_reason: Option<String>,
    /// Whether the expiring-soon warning has already fired for this grant.
    pub warning_sent: bool,
    /// The span the grant was originally issued for, when time-bounded.
    /// Auto-renewal extends the expiry by exactly this much.
    pub original_duration_ms: Option<i64>,
}

impl AccessGrant {
    /// Create a new active grant.
    pub fn new(
        owner: Username,
        grantee: Username,
        resource_type: ResourceType,
        resource_ref: Option<ResourceRef>,
        duration: DurationPolicy,
        now: i64,
    ) -> Self {
        let original_duration_ms = duration.expires_at().map(|at| at - now);
        Self {
            id: GrantId::generate(),
            owner,
            grantee,
            resource_type,
            resource_ref,
            duration,
            views_consumed: 0,
            state: GrantState::Active,
            granted_at: now,
            terminated_at: None,
            termination_reason: None,
            warning_sent: false,
            original_duration_ms,
        }
    }

    /// Whether the grant is active and, for time-bounded grants, not yet
    /// past its expiry at `now`. Does not mutate state; lazy expiry is the
    /// ledger's job.
    pub fn is_live(&self, now: i64) -> bool {
        if self.state != GrantState::Active {
            return false;
        }
        match self.duration.expires_at() {
            Some(at) => now < at,
            None => true,
        }
    }

    /// Remaining view budget, if view-counted.
    pub fn views_remaining(&self) -> Option<u32> {
        self.duration
            .view_limit()
            .map(|limit| limit.saturating_sub(self.views_consumed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(duration: DurationPolicy) -> AccessGrant {
        AccessGrant::new(
            Username::from("amara"),
            Username::from("bilal"),
            ResourceType::Images,
            Some(ResourceRef::from("img-2")),
            duration,
            1_000,
        )
    }

    #[test]
    fn test_new_grant_is_active() {
        let g = grant(DurationPolicy::Permanent);
        assert_eq!(g.state, GrantState::Active);
        assert_eq!(g.views_consumed, 0);
        assert!(!g.warning_sent);
    }

    #[test]
    fn test_original_duration_captured() {
        let g = grant(DurationPolicy::ExpiresAt { at: 4_000 });
        assert_eq!(g.original_duration_ms, Some(3_000));

        let g = grant(DurationPolicy::OneTimeView);
        assert_eq!(g.original_duration_ms, None);
    }

    #[test]
    fn test_is_live_respects_expiry() {
        let g = grant(DurationPolicy::ExpiresAt { at: 4_000 });
        assert!(g.is_live(3_999));
        assert!(!g.is_live(4_000));
    }

    #[test]
    fn test_view_limits() {
        assert_eq!(DurationPolicy::OneTimeView.view_limit(), Some(1));
        assert_eq!(
            DurationPolicy::ViewLimited { limit: 5 }.view_limit(),
            Some(5)
        );
        assert_eq!(DurationPolicy::Permanent.view_limit(), None);

        let mut g = grant(DurationPolicy::ViewLimited { limit: 3 });
        g.views_consumed = 2;
        assert_eq!(g.views_remaining(), Some(1));
    }

    #[test]
    fn test_only_timed_grants_renewable() {
        assert!(DurationPolicy::ExpiresAt { at: 1 }.is_renewable());
        assert!(!DurationPolicy::OneTimeView.is_renewable());
        assert!(!DurationPolicy::ViewLimited { limit: 2 }.is_renewable());
        assert!(!DurationPolicy::Permanent.is_renewable());
    }

    #[test]
    fn test_state_str_roundtrip() {
        for state in [GrantState::Active, GrantState::Expired, GrantState::Revoked] {
            assert_eq!(GrantState::parse(state.as_str()), Some(state));
        }
    }
}
