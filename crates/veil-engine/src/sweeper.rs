//! Expiry sweeper: the background half of grant expiry.
//!
//! Reads enforce expiry lazily; the sweeper bounds how stale an untouched
//! grant can get. Each pass walks the active time-bounded grants and
//! expires, renews, or warns. Every sweep action funnels through the same
//! store primitives as the read path, so a sweep racing a read settles on
//! exactly one outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use veil_core::{AccessGrant, Clock, DomainEvent, VisibilityPolicy, DAY_MS};
use veil_store::{Result, Store};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often a sweep pass runs.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Grants transitioned to `Expired`.
    pub expired: usize,
    /// Grants extended by their original duration instead of expiring.
    pub renewed: usize,
    /// Expiring-soon warnings emitted.
    pub warned: usize,
}

impl SweepReport {
    /// Whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.renewed == 0 && self.warned == 0
    }
}

/// Periodic sweep over active time-bounded grants.
///
/// Built by [`Engine::sweeper`](crate::Engine::sweeper) so it shares the
/// engine's store, clock, and event channel.
pub struct ExpirySweeper<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DomainEvent>,
    config: SweeperConfig,
}

impl<S: Store> ExpirySweeper<S> {
    pub(crate) fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<DomainEvent>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            config,
        }
    }

    /// Run sweep passes until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.config.interval.as_secs(), "sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if !report.is_empty() => {
                            tracing::info!(
                                expired = report.expired,
                                renewed = report.renewed,
                                warned = report.warned,
                                "sweep pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => tracing::error!(error = %err, "sweep pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("sweeper stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One sweep pass over all active time-bounded grants.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let now = self.clock.now_millis();
        let mut report = SweepReport::default();

        for grant in self.store.list_active_timed().await? {
            let Some(at) = grant.duration.expires_at() else {
                continue;
            };
            if now >= at {
                if self.try_renew(&grant, at).await? {
                    report.renewed += 1;
                } else if self.expire(&grant, now).await? {
                    report.expired += 1;
                }
            } else if self.should_warn(&grant, at, now).await? {
                report.warned += 1;
            }
        }
        Ok(report)
    }

    /// Extend a past-deadline grant when its owner opted into renewal.
    /// Renewal re-issues the original span from the old deadline, so a
    /// late sweep does not drift the schedule.
    async fn try_renew(&self, grant: &AccessGrant, at: i64) -> Result<bool> {
        if !grant.duration.is_renewable() {
            return Ok(false);
        }
        let Some(span) = grant.original_duration_ms else {
            return Ok(false);
        };
        let policy = self
            .store
            .get_policy(&grant.owner, grant.resource_type)
            .await?
            .unwrap_or_else(VisibilityPolicy::system_default);
        if !policy.access.auto_renew {
            return Ok(false);
        }
        let renewed = self.store.renew_grant(&grant.id, at + span).await?;
        if renewed {
            tracing::debug!(grant_id = %grant.id, new_expires_at = at + span, "grant renewed");
        }
        Ok(renewed)
    }

    async fn expire(&self, grant: &AccessGrant, now: i64) -> Result<bool> {
        // Deadline-guarded: a read that expired the grant first, or a
        // renewal that pushed the deadline out, both make this a no-op.
        if !self.store.expire_overdue(&grant.id, now).await? {
            return Ok(false);
        }
        self.emit(DomainEvent::GrantExpired {
            grant_id: grant.id,
            owner: grant.owner.clone(),
            grantee: grant.grantee.clone(),
            resource_type: grant.resource_type,
        });
        Ok(true)
    }

    /// Fire the expiring-soon warning when the grant has entered its
    /// owner-configured window. The store flag guarantees at most one
    /// warning per grant lifetime; renewal resets it.
    async fn should_warn(&self, grant: &AccessGrant, at: i64, now: i64) -> Result<bool> {
        if grant.warning_sent {
            return Ok(false);
        }
        let policy = self
            .store
            .get_policy(&grant.owner, grant.resource_type)
            .await?
            .unwrap_or_else(VisibilityPolicy::system_default);
        let window = policy.access.warn_before_expiry_days as i64 * DAY_MS;
        if window == 0 || now < at - window {
            return Ok(false);
        }
        if !self.store.mark_warning_sent(&grant.id).await? {
            return Ok(false);
        }
        self.emit(DomainEvent::GrantExpiringSoon {
            grant_id: grant.id,
            owner: grant.owner.clone(),
            grantee: grant.grantee.clone(),
            resource_type: grant.resource_type,
            expires_at: at,
        });
        Ok(true)
    }

    fn emit(&self, event: DomainEvent) {
        tracing::debug!(?event, "domain event");
        let _ = self.events.send(event);
    }
}
