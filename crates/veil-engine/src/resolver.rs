//! Visibility resolver: the read-path decision of what a viewer sees.
//!
//! Resolution is a pure precedence walk over state the ledgers already
//! hold: owner bypass, then a live grant, then the owner's policy. The
//! one side effect is deliberate — resolving through a view-counted
//! grant consumes a view, because resolution *is* the read.

use async_trait::async_trait;

use veil_core::{
    BlurLevel, Placeholder, PolicyMode, ResourceRef, ResourceType, SmartCondition, Username,
};
use veil_store::Store;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Source of relationship facts for smart policies.
///
/// The engine never stores who favorited or messaged whom; it asks this
/// provider at resolution time. Implementations are expected to answer
/// from their own state and never fail — an unknown pair is simply false.
#[async_trait]
pub trait RelationshipProvider: Send + Sync {
    /// Whether `condition` holds for this (viewer, owner) pair.
    async fn holds(
        &self,
        viewer: &Username,
        owner: &Username,
        condition: SmartCondition,
    ) -> bool;
}

/// The effective disclosure of one resource to one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disclosure {
    /// Render the resource in full.
    Clear,
    /// Render obscured at the given level.
    Blurred(BlurLevel),
    /// Render the placeholder instead of the resource.
    Hidden(Placeholder),
    /// Render obscured with an explicit "request access" affordance.
    RequiresRequest,
}

impl Disclosure {
    /// Whether the viewer sees the resource in full.
    pub fn is_clear(&self) -> bool {
        matches!(self, Disclosure::Clear)
    }

    /// Whether an obscured viewer could ask for access.
    pub fn offers_request(&self) -> bool {
        !self.is_clear()
    }

    /// Fold in the policy's approval flow for presentation: an obscured
    /// disclosure under an approval-gated policy becomes the explicit
    /// request affordance.
    pub fn with_request_affordance(self, requires_approval: bool) -> Disclosure {
        match self {
            Disclosure::Clear => Disclosure::Clear,
            obscured if requires_approval => {
                debug_assert!(obscured.offers_request());
                Disclosure::RequiresRequest
            }
            obscured => obscured,
        }
    }
}

impl<S: Store, R: RelationshipProvider> Engine<S, R> {
    // ─────────────────────────────────────────────────────────────────────────
    // Visibility Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve what `viewer` sees of `owner`'s resource.
    ///
    /// Precedence: the owner always sees their own data; a live grant for
    /// the resource discloses it clear (consuming a view if view-counted);
    /// otherwise the owner's policy decides. A grant that turns out to be
    /// spent or past its deadline falls through to the policy rather than
    /// surfacing an error — to the viewer it is indistinguishable from
    /// never having had one.
    ///
    /// Grant scope: an instance grant covers exactly its `resource_ref`;
    /// an images grant with no ref covers every image the owner has, and
    /// is consulted only when no instance grant matches.
    pub async fn resolve(
        &self,
        viewer: &Username,
        owner: &Username,
        resource_type: ResourceType,
        resource_ref: Option<&ResourceRef>,
    ) -> Result<Disclosure> {
        if viewer == owner {
            return Ok(Disclosure::Clear);
        }

        if let Some(grant) = self
            .lookup_grant(viewer, owner, resource_type, resource_ref)
            .await?
        {
            match self.check_and_consume(&grant.id, viewer).await {
                Ok(()) => return Ok(Disclosure::Clear),
                // Spent or stale grant: fall through to the policy.
                Err(EngineError::Expired | EngineError::GrantTerminated { .. }) => {}
                Err(other) => return Err(other),
            }
        }

        let policy = self.get_policy(owner, resource_type).await?;
        match &policy.mode {
            PolicyMode::Clear => Ok(Disclosure::Clear),
            PolicyMode::Blurred { level } => Ok(Disclosure::Blurred(*level)),
            PolicyMode::Hidden { placeholder } => Ok(Disclosure::Hidden(*placeholder)),
            PolicyMode::Smart { conditions } => {
                for condition in conditions {
                    if self.relationships.holds(viewer, owner, *condition).await {
                        return Ok(Disclosure::Clear);
                    }
                }
                // No condition held: obscure at the standard level.
                Ok(Disclosure::Blurred(BlurLevel::Medium))
            }
        }
    }

    /// The active grant covering the resource, preferring an instance
    /// grant over a whole-type grant for addressable resources.
    async fn lookup_grant(
        &self,
        viewer: &Username,
        owner: &Username,
        resource_type: ResourceType,
        resource_ref: Option<&ResourceRef>,
    ) -> Result<Option<veil_core::AccessGrant>> {
        if let Some(grant) = self
            .store
            .find_active_grant(owner, viewer, resource_type, resource_ref)
            .await?
        {
            return Ok(Some(grant));
        }
        if resource_ref.is_some() {
            return Ok(self
                .store
                .find_active_grant(owner, viewer, resource_type, None)
                .await?);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{DurationPolicy, VisibilityPolicy};
    use veil_engine::Disclosure;
    use veil_testkit::{user, TestFixture};

    #[tokio::test]
    async fn test_owner_always_sees_clear() {
        let fx = TestFixture::new();
        let owner = user("amara");
        fx.engine
            .set_policy(
                &owner,
                ResourceType::Images,
                VisibilityPolicy::with_mode(PolicyMode::Hidden {
                    placeholder: Placeholder::Lock,
                }),
            )
            .await
            .unwrap();
        let seen = fx
            .engine
            .resolve(&owner, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Clear);
    }

    #[tokio::test]
    async fn test_policy_modes_map_to_disclosures() {
        let fx = TestFixture::new();
        let (owner, viewer) = (user("amara"), user("bilal"));

        // No policy set: system default, medium blur.
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Blurred(BlurLevel::Medium));

        fx.engine
            .set_policy(
                &owner,
                ResourceType::Images,
                VisibilityPolicy::with_mode(PolicyMode::Hidden {
                    placeholder: Placeholder::Silhouette,
                }),
            )
            .await
            .unwrap();
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Hidden(Placeholder::Silhouette));

        fx.engine
            .set_policy(
                &owner,
                ResourceType::Images,
                VisibilityPolicy::with_mode(PolicyMode::Clear),
            )
            .await
            .unwrap();
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Clear);
    }

    #[tokio::test]
    async fn test_live_grant_overrides_policy() {
        let fx = TestFixture::new();
        let (owner, viewer) = (user("amara"), user("bilal"));
        fx.engine
            .set_policy(
                &owner,
                ResourceType::ContactEmail,
                VisibilityPolicy::with_mode(PolicyMode::Hidden {
                    placeholder: Placeholder::Lock,
                }),
            )
            .await
            .unwrap();
        fx.engine
            .create_grant(&owner, &viewer, ResourceType::ContactEmail, None, None)
            .await
            .unwrap();

        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::ContactEmail, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Clear);
        // The grant is per-viewer: someone else still sees the policy.
        let seen = fx
            .engine
            .resolve(&user("chen"), &owner, ResourceType::ContactEmail, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Hidden(Placeholder::Lock));
    }

    #[tokio::test]
    async fn test_instance_grant_scopes_to_its_image() {
        let fx = TestFixture::new();
        let (owner, viewer) = (user("amara"), user("bilal"));
        fx.engine
            .create_grant(
                &owner,
                &viewer,
                ResourceType::Images,
                Some(ResourceRef::from("img-2")),
                None,
            )
            .await
            .unwrap();

        let img2 = ResourceRef::from("img-2");
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, Some(&img2))
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Clear);

        let img1 = ResourceRef::from("img-1");
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, Some(&img1))
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Blurred(BlurLevel::Medium));
    }

    #[tokio::test]
    async fn test_spent_grant_falls_through_to_policy() {
        let fx = TestFixture::new();
        let (owner, viewer) = (user("amara"), user("bilal"));
        let grant = fx
            .engine
            .create_grant(
                &owner,
                &viewer,
                ResourceType::ContactEmail,
                None,
                Some(DurationPolicy::OneTimeView),
            )
            .await
            .unwrap();

        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::ContactEmail, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Clear);

        // The single view is spent; back to the default policy, no error.
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::ContactEmail, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Blurred(BlurLevel::Medium));
        let stored = fx.engine.store().get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(stored.views_consumed, 1);
    }

    #[tokio::test]
    async fn test_smart_policy_follows_relationship_facts() {
        let fx = TestFixture::new();
        let (owner, viewer) = (user("amara"), user("bilal"));
        fx.engine
            .set_policy(
                &owner,
                ResourceType::Images,
                VisibilityPolicy::with_mode(PolicyMode::smart([
                    SmartCondition::ViewerFavoritedOwner,
                ])),
            )
            .await
            .unwrap();

        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Blurred(BlurLevel::Medium));

        fx.relationships
            .set(&viewer, &owner, SmartCondition::ViewerFavoritedOwner);
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Clear);

        // The fact can lapse; visibility follows it back down.
        fx.relationships
            .unset(&viewer, &owner, SmartCondition::ViewerFavoritedOwner);
        let seen = fx
            .engine
            .resolve(&viewer, &owner, ResourceType::Images, None)
            .await
            .unwrap();
        assert_eq!(seen, Disclosure::Blurred(BlurLevel::Medium));
    }

    #[test]
    fn test_request_affordance_mapping() {
        assert_eq!(
            Disclosure::Blurred(BlurLevel::Heavy).with_request_affordance(true),
            Disclosure::RequiresRequest
        );
        assert_eq!(
            Disclosure::Hidden(Placeholder::Lock).with_request_affordance(false),
            Disclosure::Hidden(Placeholder::Lock)
        );
        assert_eq!(
            Disclosure::Clear.with_request_affordance(true),
            Disclosure::Clear
        );
    }
}
