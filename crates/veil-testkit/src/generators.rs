//! Proptest generators for property-based testing.

use proptest::prelude::*;

use veil_core::{
    AccessControl, BlurLevel, DurationPolicy, Placeholder, PolicyMode, ResourceRef, ResourceType,
    SmartCondition, Username, VisibilityPolicy,
};

/// Generate a plausible username.
pub fn username() -> impl Strategy<Value = Username> {
    "[a-z][a-z0-9_]{2,15}".prop_map(Username::new)
}

/// Generate a resource ref (an image id).
pub fn resource_ref() -> impl Strategy<Value = ResourceRef> {
    "img-[0-9]{1,4}".prop_map(ResourceRef::new)
}

/// Generate any resource type.
pub fn resource_type() -> impl Strategy<Value = ResourceType> {
    prop::sample::select(ResourceType::ALL.as_slice())
}

/// Generate a blur level.
pub fn blur_level() -> impl Strategy<Value = BlurLevel> {
    prop_oneof![
        Just(BlurLevel::Light),
        Just(BlurLevel::Medium),
        Just(BlurLevel::Heavy),
    ]
}

/// Generate a placeholder.
pub fn placeholder() -> impl Strategy<Value = Placeholder> {
    prop_oneof![
        Just(Placeholder::Lock),
        Just(Placeholder::Silhouette),
        Just(Placeholder::Frame),
    ]
}

/// Generate a smart condition.
pub fn smart_condition() -> impl Strategy<Value = SmartCondition> {
    prop_oneof![
        Just(SmartCondition::ViewerFavoritedOwner),
        Just(SmartCondition::ViewerShortlistedOwner),
        Just(SmartCondition::ViewerMessagedOwner),
    ]
}

/// Generate any valid policy mode. Smart modes carry at least one
/// condition, matching what validation accepts.
pub fn policy_mode() -> impl Strategy<Value = PolicyMode> {
    prop_oneof![
        Just(PolicyMode::Clear),
        blur_level().prop_map(|level| PolicyMode::Blurred { level }),
        placeholder().prop_map(|placeholder| PolicyMode::Hidden { placeholder }),
        prop::collection::btree_set(smart_condition(), 1..=3)
            .prop_map(|conditions| PolicyMode::Smart { conditions }),
    ]
}

/// Generate access controls within realistic ranges.
pub fn access_control() -> impl Strategy<Value = AccessControl> {
    (
        0u32..=365,
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        0u32..=100,
        0u32..=20,
        0u32..=14,
    )
        .prop_map(
            |(
                default_duration_days,
                auto_renew,
                requires_approval,
                download_allowed,
                max_viewers,
                views_per_user,
                warn_before_expiry_days,
            )| AccessControl {
                default_duration_days,
                auto_renew,
                requires_approval,
                download_allowed,
                max_viewers,
                views_per_user,
                warn_before_expiry_days,
            },
        )
}

/// Generate a complete, valid visibility policy.
pub fn visibility_policy() -> impl Strategy<Value = VisibilityPolicy> {
    (policy_mode(), access_control()).prop_map(|(mode, access)| VisibilityPolicy { mode, access })
}

/// Generate any duration policy. Deadlines stay within a plausible epoch
/// range.
pub fn duration_policy() -> impl Strategy<Value = DurationPolicy> {
    prop_oneof![
        Just(DurationPolicy::Permanent),
        (1i64..=4_102_444_800_000).prop_map(|at| DurationPolicy::ExpiresAt { at }),
        Just(DurationPolicy::OneTimeView),
        (2u32..=1_000).prop_map(|limit| DurationPolicy::ViewLimited { limit }),
    ]
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000
}
