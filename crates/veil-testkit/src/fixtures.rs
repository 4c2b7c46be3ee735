//! Test fixtures and helpers.
//!
//! Common setup code for engine tests: an in-memory engine on a frozen
//! manual clock, with scriptable relationship facts for smart policies.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use veil_core::{ManualClock, SmartCondition, Username};
use veil_engine::{Engine, EngineConfig, RelationshipProvider};
use veil_store::MemoryStore;

/// The instant fixtures start at: 2023-11-14T22:13:20Z, far from any
/// boundary that would make day arithmetic surprising.
pub const T0: i64 = 1_700_000_000_000;

/// Shorthand for building usernames in tests.
pub fn user(name: &str) -> Username {
    Username::from(name)
}

/// A scriptable relationship source.
///
/// Tests assert facts with [`set`](StaticRelationships::set) and retract
/// them with [`unset`](StaticRelationships::unset); resolution reads
/// whatever is currently asserted.
#[derive(Debug, Default)]
pub struct StaticRelationships {
    facts: RwLock<HashSet<(Username, Username, SmartCondition)>>,
}

impl StaticRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert that `condition` holds for this (viewer, owner) pair.
    pub fn set(&self, viewer: &Username, owner: &Username, condition: SmartCondition) {
        self.facts
            .write()
            .unwrap()
            .insert((viewer.clone(), owner.clone(), condition));
    }

    /// Retract a previously asserted fact.
    pub fn unset(&self, viewer: &Username, owner: &Username, condition: SmartCondition) {
        self.facts
            .write()
            .unwrap()
            .remove(&(viewer.clone(), owner.clone(), condition));
    }
}

#[async_trait]
impl RelationshipProvider for StaticRelationships {
    async fn holds(
        &self,
        viewer: &Username,
        owner: &Username,
        condition: SmartCondition,
    ) -> bool {
        self.facts
            .read()
            .unwrap()
            .contains(&(viewer.clone(), owner.clone(), condition))
    }
}

/// A ready-to-use engine over a memory store and a manual clock.
pub struct TestFixture {
    /// The clock driving the engine; advance it to trigger expiry.
    pub clock: Arc<ManualClock>,
    /// Relationship facts read by smart policies.
    pub relationships: Arc<StaticRelationships>,
    /// The engine under test.
    pub engine: Engine<MemoryStore, StaticRelationships>,
}

impl TestFixture {
    /// Create a fixture frozen at [`T0`].
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let relationships = Arc::new(StaticRelationships::new());
        let engine = Engine::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::clone(&relationships),
            Arc::clone(&clock) as Arc<dyn veil_core::Clock>,
            EngineConfig::default(),
        );
        Self {
            clock,
            relationships,
            engine,
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
