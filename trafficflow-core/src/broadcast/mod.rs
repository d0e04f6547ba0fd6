//! Fan-out of segment changes to registered subscribers.
//!
//! Every subscriber owns a bounded outbound buffer. Publishing appends to
//! it and drains as much as the transport accepts without blocking; when
//! the buffer is full the oldest undelivered notification is dropped.

mod transport;

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use hashbrown::{HashMap, HashSet};
use log::{debug, info};
use serde::Serialize;

pub use transport::{MemoryTransport, Notification, SendOutcome, SubscriberTransport};

use crate::config::BroadcastConfig;
use crate::metrics::Metrics;
use crate::routing::RouteId;
use crate::{SegmentId, SegmentState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubscriptionId(u64);

/// What a subscriber wants to hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// Segments of a route registered with [`SubscriptionBroadcaster::register_route`]
    Route(RouteId),
    Segments(HashSet<SegmentId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Active,
    Disconnected,
}

/// Handle returned to the subscriber on registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub interest: Interest,
}

/// A segment update as emitted by ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentChange {
    pub segment_id: SegmentId,
    pub state: SegmentState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    pub buffered: usize,
    pub delivered: u64,
    pub dropped_updates: u64,
    pub liveness: Liveness,
}

struct Subscriber {
    interest: Interest,
    transport: Arc<dyn SubscriberTransport>,
    buffer: VecDeque<Notification>,
    delivered: u64,
    dropped: u64,
    liveness: Liveness,
}

impl Subscriber {
    fn wants(&self, segment: &SegmentId, routes: &HashMap<RouteId, HashSet<SegmentId>>) -> bool {
        match &self.interest {
            Interest::Segments(segments) => segments.contains(segment),
            Interest::Route(route) => routes
                .get(route)
                .is_some_and(|segments| segments.contains(segment)),
        }
    }

    /// Sends buffered notifications until the transport pushes back
    fn drain(&mut self) -> usize {
        let mut sent = 0;
        if !self.transport.is_connected() {
            self.liveness = Liveness::Disconnected;
            return sent;
        }
        while let Some(front) = self.buffer.front() {
            match self.transport.try_send(front) {
                SendOutcome::Delivered => {
                    self.buffer.pop_front();
                    self.delivered += 1;
                    sent += 1;
                }
                SendOutcome::Full => break,
                SendOutcome::Closed => {
                    self.liveness = Liveness::Disconnected;
                    break;
                }
            }
        }
        sent
    }
}

#[derive(Default)]
struct BroadcastState {
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
    routes: HashMap<RouteId, HashSet<SegmentId>>,
    // Registration order, oldest first
    route_order: VecDeque<RouteId>,
    next_id: u64,
}

impl BroadcastState {
    /// Evicts registrations beyond `limit`, oldest first, sparing routes a
    /// subscriber still follows while any unfollowed one remains
    fn evict_routes(&mut self, limit: usize) {
        while self.routes.len() > limit {
            let pos = {
                let followed: HashSet<&RouteId> = self
                    .subscribers
                    .values()
                    .filter_map(|sub| match &sub.interest {
                        Interest::Route(route) => Some(route),
                        Interest::Segments(_) => None,
                    })
                    .collect();
                self.route_order
                    .iter()
                    .position(|route| !followed.contains(route))
                    .unwrap_or(0)
            };
            let Some(route) = self.route_order.remove(pos) else {
                break;
            };
            self.routes.remove(&route);
            debug!("Route {route} evicted from the registry");
        }
    }

    fn remove_disconnected(&mut self, metrics: &Metrics) {
        let before = self.subscribers.len();
        self.subscribers.retain(|id, sub| {
            let alive = sub.liveness == Liveness::Active;
            if !alive {
                info!(
                    "Subscriber {} disconnected, {} updates dropped over its lifetime",
                    id.0, sub.dropped
                );
            }
            alive
        });
        Metrics::add(
            &metrics.subscribers_disconnected,
            (before - self.subscribers.len()) as u64,
        );
    }
}

pub struct SubscriptionBroadcaster {
    config: BroadcastConfig,
    state: Mutex<BroadcastState>,
    sequence: AtomicU64,
    metrics: Arc<Metrics>,
}

impl SubscriptionBroadcaster {
    pub fn new(config: BroadcastConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            state: Mutex::new(BroadcastState::default()),
            sequence: AtomicU64::new(0),
            metrics,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BroadcastState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(
        &self,
        transport: Arc<dyn SubscriberTransport>,
        interest: Interest,
    ) -> Subscription {
        let mut state = self.state();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.insert(
            id,
            Subscriber {
                interest: interest.clone(),
                transport,
                buffer: VecDeque::with_capacity(self.config.buffer_capacity.min(1024)),
                delivered: 0,
                dropped: 0,
                liveness: Liveness::Active,
            },
        );
        debug!("Subscriber {} registered for {:?}", id.0, interest);
        Subscription { id, interest }
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.state().subscribers.remove(&subscription.id).is_some()
    }

    /// Records the segments a route id stands for.
    ///
    /// At most `max_routes` registrations are kept; past that the oldest
    /// one no subscriber follows is evicted.
    pub fn register_route(
        &self,
        route_id: RouteId,
        segments: impl IntoIterator<Item = SegmentId>,
    ) {
        let mut state = self.state();
        if state
            .routes
            .insert(route_id.clone(), segments.into_iter().collect())
            .is_some()
        {
            state.route_order.retain(|route| *route != route_id);
        }
        state.route_order.push_back(route_id);
        state.evict_routes(self.config.max_routes.max(1));
    }

    pub fn forget_route(&self, route_id: &RouteId) {
        let mut state = self.state();
        if state.routes.remove(route_id).is_some() {
            state.route_order.retain(|route| route != route_id);
        }
    }

    /// Number of route registrations currently held
    pub fn route_count(&self) -> usize {
        self.state().routes.len()
    }

    /// Fans a change out to every interested subscriber without blocking.
    /// Returns the number of subscribers it was queued for.
    pub fn publish(&self, change: &SegmentChange) -> usize {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let capacity = self.config.buffer_capacity.max(1);

        let mut state = self.state();
        let BroadcastState {
            subscribers,
            routes,
            ..
        } = &mut *state;

        let mut queued = 0;
        for sub in subscribers.values_mut() {
            if !sub.wants(&change.segment_id, routes) {
                continue;
            }
            sub.buffer.push_back(Notification {
                sequence,
                segment_id: change.segment_id.clone(),
                state: change.state,
            });
            while sub.buffer.len() > capacity {
                sub.buffer.pop_front();
                sub.dropped += 1;
                Metrics::incr(&self.metrics.updates_dropped);
            }
            sub.drain();
            queued += 1;
        }
        state.remove_disconnected(&self.metrics);
        Metrics::incr(&self.metrics.notifications_published);
        queued
    }

    /// Retries buffered deliveries; returns how many went out
    pub fn flush(&self) -> usize {
        let mut state = self.state();
        let sent = state.subscribers.values_mut().map(Subscriber::drain).sum();
        state.remove_disconnected(&self.metrics);
        sent
    }

    pub fn stats(&self, subscription: &Subscription) -> Option<SubscriberStats> {
        self.state()
            .subscribers
            .get(&subscription.id)
            .map(|sub| SubscriberStats {
                buffered: sub.buffer.len(),
                delivered: sub.delivered,
                dropped_updates: sub.dropped,
                liveness: sub.liveness,
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Drops every subscription and route registration
    pub fn close(&self) {
        let mut state = self.state();
        let count = state.subscribers.len();
        state.subscribers.clear();
        state.routes.clear();
        state.route_order.clear();
        info!("Broadcaster closed, {count} subscriptions dropped");
    }
}
