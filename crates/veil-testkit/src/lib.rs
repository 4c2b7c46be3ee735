//! # Veil Testkit
//!
//! Testing utilities for the Veil engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ready-made engine on a memory store with a manual
//!   clock and scriptable relationship facts
//! - **Generators**: proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust
//! use veil_testkit::{user, TestFixture};
//! use veil_core::DAY_MS;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let fixture = TestFixture::new();
//! fixture
//!     .engine
//!     .create_request(&user("amara"), &user("bilal"), veil_core::ResourceType::Images, None)
//!     .await
//!     .unwrap();
//! fixture.clock.advance(DAY_MS);
//! # }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use veil_testkit::generators::visibility_policy;
//!
//! proptest! {
//!     #[test]
//!     fn policies_always_validate(policy in visibility_policy()) {
//!         prop_assert!(policy.validate().is_ok());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{user, StaticRelationships, TestFixture, T0};
