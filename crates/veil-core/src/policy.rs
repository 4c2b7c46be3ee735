//! Visibility policies: the ambient, owner-configured disclosure rules.
//!
//! A policy governs how a resource type renders to viewers who hold no
//! explicit grant. Exactly one mode is active per resource type; replacing
//! a policy never cascades to grants that already exist.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::grant::DurationPolicy;
use crate::types::DAY_MS;

/// How strongly a blurred resource is obscured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurLevel {
    Light,
    Medium,
    Heavy,
}

/// What stands in for a hidden resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    Lock,
    Silhouette,
    Frame,
}

/// Relationship predicates a smart policy can key on.
///
/// The facts themselves come from an external relationship service; the
/// engine only asks whether a predicate holds for a (viewer, owner) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartCondition {
    ViewerFavoritedOwner,
    ViewerShortlistedOwner,
    ViewerMessagedOwner,
}

/// The disclosure mode of a visibility policy.
///
/// A closed tagged union: each variant carries exactly the fields that
/// variant needs, checked exhaustively wherever policies are evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PolicyMode {
    /// Always visible to every viewer, no grant required.
    Clear,
    /// Rendered obscured at the given level.
    Blurred { level: BlurLevel },
    /// Not rendered at all; the placeholder is shown instead.
    Hidden { placeholder: Placeholder },
    /// Clear for viewers matching any condition, obscured otherwise.
    Smart { conditions: BTreeSet<SmartCondition> },
}

impl PolicyMode {
    /// Convenience constructor for a smart mode.
    pub fn smart(conditions: impl IntoIterator<Item = SmartCondition>) -> Self {
        PolicyMode::Smart {
            conditions: conditions.into_iter().collect(),
        }
    }
}

/// Controls applied to grants created under a policy.
///
/// These are read at grant-creation time and frozen into the grant;
/// editing them later never alters grants already issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    /// Default grant duration in days. 0 means unlimited.
    pub default_duration_days: u32,
    /// Whether the sweeper extends expiring grants instead of expiring them.
    pub auto_renew: bool,
    /// Whether viewers must go through the request/approve path.
    pub requires_approval: bool,
    /// Whether grantees may download the resource. Carried for the UI layer.
    pub download_allowed: bool,
    /// Maximum distinct grantees. 0 means unlimited. Carried for the UI layer.
    pub max_viewers: u32,
    /// Views allowed per grantee. 0 = unlimited, 1 = one-time, n = n-time.
    pub views_per_user: u32,
    /// Days before expiry at which a warning event fires. 0 disables it.
    pub warn_before_expiry_days: u32,
}

impl Default for AccessControl {
    fn default() -> Self {
        Self {
            default_duration_days: 30,
            auto_renew: false,
            requires_approval: true,
            download_allowed: false,
            max_viewers: 0,
            views_per_user: 0,
            warn_before_expiry_days: 3,
        }
    }
}

impl AccessControl {
    /// Derive the duration policy for a grant created under this control
    /// at time `now`.
    ///
    /// View budgets take precedence over time bounds: a per-user view
    /// limit produces a view-counted grant even when a default duration
    /// is also configured. The result is frozen into the grant.
    pub fn derive_duration(&self, now: i64) -> DurationPolicy {
        match self.views_per_user {
            1 => DurationPolicy::OneTimeView,
            n if n > 1 => DurationPolicy::ViewLimited { limit: n },
            _ if self.default_duration_days > 0 => DurationPolicy::ExpiresAt {
                at: now + self.default_duration_days as i64 * DAY_MS,
            },
            _ => DurationPolicy::Permanent,
        }
    }
}

/// An owner's visibility policy for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPolicy {
    /// The active disclosure mode.
    pub mode: PolicyMode,
    /// Controls for grants created under this policy.
    pub access: AccessControl,
}

impl VisibilityPolicy {
    /// The hardcoded system default, used when an owner never set a policy:
    /// medium blur, 30-day grants, approval required.
    pub fn system_default() -> Self {
        Self {
            mode: PolicyMode::Blurred {
                level: BlurLevel::Medium,
            },
            access: AccessControl::default(),
        }
    }

    /// Create a policy with the given mode and default access controls.
    pub fn with_mode(mode: PolicyMode) -> Self {
        Self {
            mode,
            access: AccessControl::default(),
        }
    }

    /// Validate internal consistency.
    ///
    /// The tagged union already forces blurred policies to carry a level
    /// and hidden policies a placeholder; what remains checkable is that
    /// a smart policy names at least one condition.
    pub fn validate(&self) -> Result<()> {
        if let PolicyMode::Smart { conditions } = &self.mode {
            if conditions.is_empty() {
                return Err(CoreError::InvalidPolicy(
                    "smart mode requires at least one condition".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_default_is_blurred_medium() {
        let policy = VisibilityPolicy::system_default();
        assert_eq!(
            policy.mode,
            PolicyMode::Blurred {
                level: BlurLevel::Medium
            }
        );
        assert_eq!(policy.access.default_duration_days, 30);
        assert!(policy.access.requires_approval);
    }

    #[test]
    fn test_empty_smart_conditions_rejected() {
        let policy = VisibilityPolicy::with_mode(PolicyMode::smart([]));
        assert!(matches!(
            policy.validate(),
            Err(CoreError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_smart_with_condition_valid() {
        let policy =
            VisibilityPolicy::with_mode(PolicyMode::smart([SmartCondition::ViewerFavoritedOwner]));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_json_roundtrip() {
        let policy = VisibilityPolicy::with_mode(PolicyMode::smart([
            SmartCondition::ViewerFavoritedOwner,
            SmartCondition::ViewerMessagedOwner,
        ]));
        let json = serde_json::to_string(&policy).unwrap();
        let recovered: VisibilityPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, recovered);
    }

    #[test]
    fn test_derive_duration_precedence() {
        let mut access = AccessControl::default();

        // Default control: 30-day expiry.
        assert_eq!(
            access.derive_duration(0),
            DurationPolicy::ExpiresAt { at: 30 * DAY_MS }
        );

        // View limits win over duration.
        access.views_per_user = 1;
        assert_eq!(access.derive_duration(0), DurationPolicy::OneTimeView);
        access.views_per_user = 4;
        assert_eq!(
            access.derive_duration(0),
            DurationPolicy::ViewLimited { limit: 4 }
        );

        // Neither configured: permanent.
        access.views_per_user = 0;
        access.default_duration_days = 0;
        assert_eq!(access.derive_duration(0), DurationPolicy::Permanent);
    }

    #[test]
    fn test_mode_tag_is_snake_case() {
        let policy = VisibilityPolicy::with_mode(PolicyMode::Hidden {
            placeholder: Placeholder::Lock,
        });
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["mode"]["mode"], "hidden");
        assert_eq!(json["mode"]["placeholder"], "lock");
    }
}
