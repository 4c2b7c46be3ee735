//! # Veil Core
//!
//! Domain model for the Veil consent engine: who may see a profile
//! owner's private data, under what policy, for how long.
//!
//! This crate contains no I/O, no storage, no async. It is pure data and
//! validation shared by the store and engine crates.
//!
//! ## Key Types
//!
//! - [`VisibilityPolicy`] - Ambient, owner-configured disclosure rule
//! - [`AccessRequest`] - A viewer asking an owner for access
//! - [`AccessGrant`] - A time/view-bounded authorization for one viewer
//! - [`DomainEvent`] - Lifecycle transitions for external notifiers
//! - [`Clock`] - Time source, replaceable in tests

pub mod clock;
pub mod error;
pub mod event;
pub mod grant;
pub mod policy;
pub mod request;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use event::DomainEvent;
pub use grant::{AccessGrant, DurationPolicy, GrantState};
pub use policy::{
    AccessControl, BlurLevel, Placeholder, PolicyMode, SmartCondition, VisibilityPolicy,
};
pub use request::{AccessRequest, RequestStatus};
pub use types::{GrantId, RequestId, ResourceRef, ResourceType, Username, DAY_MS};
