//! RouteInputUseCase: decides which machine receives input.
//!
//! The [`InputRouter`] runs for every pointer and keyboard event while input
//! sharing is on.  It consults the [`LayoutEngine`] for the screen under the
//! cursor and the [`ClientRegistry`] for the client's connection state:
//!
//! - Sharing off: everything stays local.
//! - Cursor on the master (or outside every screen): local.
//! - Cursor on a client screen whose client is `Active`: forward to that client.
//! - Cursor on a client screen whose client is anything else: local.
//!
//! # Event-rate telemetry (for beginners)
//!
//! Every event routed to a client is counted here, not where it is generated,
//! so the events-per-second figure shows what each client actually received.
//! Counting happens under the router's own lock; [`InputRouter::flush_into`]
//! moves the counts into the registry in one batch so the hot path never
//! waits for the registry's write lock.  Each count keeps the time it was
//! routed (to within [`COUNT_BUCKET`]), so a batch flushed late still lands
//! in the right one-second window.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use kvm_core::ClientId;
use tracing::{debug, info};

use crate::application::manage_clients::{ClientRegistry, RegistryError};
use crate::application::update_layout::LayoutEngine;

/// Routed events closer together than this share one timestamp.
pub const COUNT_BUCKET: Duration = Duration::from_millis(10);

/// Events routed to one client starting at `at`.
#[derive(Debug, Clone, Copy)]
struct RoutedBucket {
    at: Instant,
    count: u32,
}

/// Tracks which machine currently has keyboard/mouse focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveTarget {
    /// Input goes to the local master system.
    #[default]
    Master,
    /// Input is routed to the specified client.
    Client(ClientId),
}

/// Input routing state: the sharing flag, the current target, and routed
/// event counts not yet merged into the registry.
#[derive(Debug, Default)]
pub struct InputRouter {
    sharing_enabled: bool,
    active_target: ActiveTarget,
    pending: BTreeMap<ClientId, Vec<RoutedBucket>>,
}

impl InputRouter {
    /// Creates a router with sharing disabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sharing_enabled(&self) -> bool {
        self.sharing_enabled
    }

    /// Turns input sharing on or off.  Turning it off returns focus to the master.
    pub fn set_sharing_enabled(&mut self, enabled: bool) {
        if self.sharing_enabled != enabled {
            info!(enabled, "input sharing toggled");
        }
        self.sharing_enabled = enabled;
        if !enabled {
            self.active_target = ActiveTarget::Master;
        }
    }

    pub fn active_target(&self) -> ActiveTarget {
        self.active_target
    }

    /// Routes a pointer event at virtual coordinates `(x, y)`.
    ///
    /// Updates the active target and counts the event against the target
    /// client, if any.
    pub fn route_pointer(&mut self, x: i32, y: i32, layout: &LayoutEngine, registry: &ClientRegistry) -> ActiveTarget {
        self.route_pointer_at(x, y, layout, registry, Instant::now())
    }

    /// [`route_pointer`](Self::route_pointer) for an event observed at `now`.
    pub fn route_pointer_at(
        &mut self,
        x: i32,
        y: i32,
        layout: &LayoutEngine,
        registry: &ClientRegistry,
        now: Instant,
    ) -> ActiveTarget {
        let target = if self.sharing_enabled {
            match layout.resolve_client_at(x, y) {
                Some(id) if registry.is_active(id) => ActiveTarget::Client(id),
                _ => ActiveTarget::Master,
            }
        } else {
            ActiveTarget::Master
        };

        if target != self.active_target {
            debug!(from = ?self.active_target, to = ?target, "input target changed");
            self.active_target = target;
        }
        self.count(target, now);
        target
    }

    /// Routes a non-pointer event (key, button, scroll) to the current target.
    ///
    /// If the target client has left `Active` since the last pointer event,
    /// focus falls back to the master.
    pub fn route_event(&mut self, registry: &ClientRegistry) -> ActiveTarget {
        self.route_event_at(registry, Instant::now())
    }

    /// [`route_event`](Self::route_event) for an event observed at `now`.
    pub fn route_event_at(&mut self, registry: &ClientRegistry, now: Instant) -> ActiveTarget {
        if let ActiveTarget::Client(id) = self.active_target {
            if !self.sharing_enabled || !registry.is_active(id) {
                debug!(client_id = %id, "target no longer active, input returns to master");
                self.active_target = ActiveTarget::Master;
            }
        }
        let target = self.active_target;
        self.count(target, now);
        target
    }

    /// Drops all routing state for a client that is being removed.
    pub fn forget_client(&mut self, client_id: ClientId) {
        if self.active_target == ActiveTarget::Client(client_id) {
            self.active_target = ActiveTarget::Master;
        }
        self.pending.remove(&client_id);
    }

    /// Removes and returns the per-client totals accumulated since the last call.
    pub fn take_routed_counts(&mut self) -> Vec<(ClientId, u32)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, buckets)| (id, buckets.iter().fold(0u32, |n, b| n.saturating_add(b.count))))
            .collect()
    }

    /// Merges the accumulated counts into the registry's telemetry, each at
    /// the time it was routed.
    ///
    /// Counts for clients the registry no longer knows are discarded.
    pub fn flush_into(&mut self, registry: &mut ClientRegistry) {
        for (id, buckets) in std::mem::take(&mut self.pending) {
            for bucket in buckets {
                if let Err(RegistryError::NotFound(_)) = registry.record_telemetry(id, None, bucket.count, bucket.at) {
                    debug!(client_id = %id, "dropping routed counts for removed client");
                    break;
                }
            }
        }
    }

    fn count(&mut self, target: ActiveTarget, now: Instant) {
        let ActiveTarget::Client(id) = target else {
            return;
        };
        let buckets = self.pending.entry(id).or_default();
        match buckets.last_mut() {
            Some(bucket) if now.saturating_duration_since(bucket.at) < COUNT_BUCKET => {
                bucket.count = bucket.count.saturating_add(1);
            }
            _ => buckets.push(RoutedBucket { at: now, count: 1 }),
        }
    }
}
