//! Policy store operations.
//!
//! Per-owner, per-resource-type default visibility configuration. Setting
//! a policy validates and replaces it atomically; it has no side effects
//! beyond the stored value and never cascades to existing grants.

use veil_core::{ResourceType, Username, VisibilityPolicy};
use veil_store::Store;

use crate::engine::Engine;
use crate::error::Result;
use crate::resolver::RelationshipProvider;

impl<S: Store, R: RelationshipProvider> Engine<S, R> {
    /// Replace the owner's policy for a resource type.
    ///
    /// Fails with `InvalidPolicy` when the policy is internally
    /// inconsistent. Existing grants are untouched: their durations were
    /// frozen at grant time.
    pub async fn set_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
        policy: VisibilityPolicy,
    ) -> Result<()> {
        policy.validate()?;
        self.store
            .set_policy(owner, resource_type, &policy, self.now())
            .await?;
        tracing::info!(owner = %owner, resource_type = %resource_type, "policy replaced");
        Ok(())
    }

    /// The owner's policy for a resource type, falling back to the
    /// hardcoded system default when none was ever set.
    pub async fn get_policy(
        &self,
        owner: &Username,
        resource_type: ResourceType,
    ) -> Result<VisibilityPolicy> {
        Ok(self
            .store
            .get_policy(owner, resource_type)
            .await?
            .unwrap_or_else(VisibilityPolicy::system_default))
    }
}
