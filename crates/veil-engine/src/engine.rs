//! The Engine: unified API for the Veil access control system.
//!
//! The Engine brings together the policy store, request ledger, grant
//! ledger, and visibility resolver behind one interface. Every call takes
//! explicit caller-supplied usernames; there is no ambient session state.

use std::sync::Arc;

use tokio::sync::broadcast;

use veil_core::{Clock, DomainEvent, SystemClock};
use veil_store::Store;

use crate::resolver::RelationshipProvider;
use crate::sweeper::{ExpirySweeper, SweeperConfig};

/// Configuration for the Engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the domain event broadcast channel. Slow subscribers
    /// that fall further behind than this lose oldest events.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}

/// The main Engine struct.
///
/// Provides a unified API for:
/// - Setting and reading visibility policies
/// - The request lifecycle (create, approve, reject, cancel)
/// - The grant lifecycle (create, consume, revoke, list)
/// - Resolving the effective disclosure of a resource to a viewer
/// - Spawning the expiry sweeper
pub struct Engine<S, R> {
    /// The storage backend.
    pub(crate) store: Arc<S>,
    /// Source of relationship facts for smart policies.
    pub(crate) relationships: Arc<R>,
    /// Time source. Replaceable for simulated-clock tests.
    pub(crate) clock: Arc<dyn Clock>,
    /// Domain event fan-out for external notifiers.
    events: broadcast::Sender<DomainEvent>,
}

impl<S: Store, R: RelationshipProvider> Engine<S, R> {
    /// Create a new engine over the given store and relationship source,
    /// using the system clock.
    pub fn new(store: S, relationships: R) -> Self {
        Self::with_parts(
            Arc::new(store),
            Arc::new(relationships),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
    }

    /// Create an engine from shared parts. Useful when the caller keeps
    /// handles to the store, relationships, or a manual clock.
    pub fn with_parts(
        store: Arc<S>,
        relationships: Arc<R>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            store,
            relationships,
            clock,
            events,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Subscribe to domain events emitted by this engine and its sweeper.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Build an expiry sweeper sharing this engine's store, clock, and
    /// event channel.
    pub fn sweeper(&self, config: SweeperConfig) -> ExpirySweeper<S> {
        ExpirySweeper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.events.clone(),
            config,
        )
    }

    /// Current time in Unix milliseconds.
    pub(crate) fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Emit a domain event. A send error only means no subscriber is
    /// currently listening; delivery is the dispatcher's concern.
    pub(crate) fn emit(&self, event: DomainEvent) {
        tracing::debug!(?event, "domain event");
        let _ = self.events.send(event);
    }
}
