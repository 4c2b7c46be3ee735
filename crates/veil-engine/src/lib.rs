//! Veil engine: consent-based, time-bounded access control.
//!
//! Profile owners set visibility policies per resource type, viewers
//! request access, owners grant it with durations or view budgets, and
//! every read resolves through the [`Engine`]. The engine is the single
//! write path to the ledgers; persistence lives behind the
//! [`Store`](veil_store::Store) trait and relationship facts behind
//! [`RelationshipProvider`].
//!
//! # Example
//!
//! ```no_run
//! use veil_engine::{Engine, RelationshipProvider};
//! use veil_store::MemoryStore;
//! # use veil_core::{SmartCondition, Username};
//! # struct NoRelationships;
//! # #[async_trait::async_trait]
//! # impl RelationshipProvider for NoRelationships {
//! #     async fn holds(&self, _: &Username, _: &Username, _: SmartCondition) -> bool {
//! #         false
//! #     }
//! # }
//!
//! # async fn demo() -> veil_engine::Result<()> {
//! let engine = Engine::new(MemoryStore::new(), NoRelationships);
//! let owner = Username::from("amara");
//! let viewer = Username::from("bilal");
//! let request = engine
//!     .create_request(&owner, &viewer, veil_core::ResourceType::Images, None)
//!     .await?;
//! engine.approve(&request.id, &owner, &[]).await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod grants;
pub mod policy;
pub mod requests;
pub mod resolver;
pub mod sweeper;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use requests::ApprovalItem;
pub use resolver::{Disclosure, RelationshipProvider};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperConfig};
