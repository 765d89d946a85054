//! EventBus - in-process publish/subscribe router
//!
//! Subscribers are indexed by exact event type, with wildcard and namespace
//! patterns kept in a side list. Publishing never waits: each matching
//! subscriber gets one `try_send` into its bounded queue, and a full queue
//! loses the event for that subscriber only.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use nvr_plugin_api::{Event, EventBroker, EventPattern, PublishReport};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::plugins::ErrorKind;

pub type SubscriberId = u64;

/// Who holds a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum SubscriberOwner {
    Plugin(String),
    /// Host component (stream fanout, health hooks)
    System(String),
}

impl fmt::Display for SubscriberOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(id) => write!(f, "plugin:{id}"),
            Self::System(name) => write!(f, "system:{name}"),
        }
    }
}

struct Subscriber {
    id: SubscriberId,
    owner: SubscriberOwner,
    patterns: Vec<EventPattern>,
    tx: mpsc::Sender<Arc<Event>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct Table {
    by_id: HashMap<SubscriberId, Arc<Subscriber>>,
    exact: HashMap<String, Vec<Arc<Subscriber>>>,
    patterned: Vec<Arc<Subscriber>>,
}

impl Table {
    fn insert(&mut self, sub: Arc<Subscriber>) {
        let mut indexed_patterned = false;
        for pattern in &sub.patterns {
            match pattern {
                EventPattern::Exact(t) => self.exact.entry(t.clone()).or_default().push(sub.clone()),
                EventPattern::All | EventPattern::Namespace(_) => {
                    if !indexed_patterned {
                        self.patterned.push(sub.clone());
                        indexed_patterned = true;
                    }
                }
            }
        }
        self.by_id.insert(sub.id, sub);
    }

    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(sub) = self.by_id.remove(&id) else {
            return false;
        };
        for pattern in &sub.patterns {
            if let EventPattern::Exact(t) = pattern
                && let Some(list) = self.exact.get_mut(t)
            {
                list.retain(|s| s.id != id);
                if list.is_empty() {
                    self.exact.remove(t);
                }
            }
        }
        self.patterned.retain(|s| s.id != id);
        true
    }

    fn matching(&self, event_type: &str) -> Vec<Arc<Subscriber>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        if let Some(list) = self.exact.get(event_type) {
            for sub in list {
                if seen.insert(sub.id) {
                    out.push(sub.clone());
                }
            }
        }
        for sub in &self.patterned {
            if !seen.contains(&sub.id) && sub.patterns.iter().any(|p| p.matches(event_type)) {
                seen.insert(sub.id);
                out.push(sub.clone());
            }
        }
        out
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub owner: SubscriberOwner,
    pub patterns: Vec<String>,
    pub delivered: u64,
    pub dropped: u64,
}

/// In-process event router
pub struct EventBus {
    table: RwLock<Table>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register interest in `patterns`; events arrive in publish order.
    pub fn subscribe(
        &self,
        owner: SubscriberOwner,
        patterns: Vec<EventPattern>,
        capacity: usize,
    ) -> (SubscriberId, mpsc::Receiver<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscriber {
            id,
            owner,
            patterns,
            tx,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        tracing::debug!(
            subscriber = id,
            owner = %sub.owner,
            patterns = ?sub.patterns.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Subscribed"
        );
        self.write().insert(sub);
        (id, rx)
    }

    pub fn subscribe_system(
        &self,
        name: &str,
        patterns: Vec<EventPattern>,
        capacity: usize,
    ) -> (SubscriberId, mpsc::Receiver<Arc<Event>>) {
        self.subscribe(SubscriberOwner::System(name.to_string()), patterns, capacity)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.write().remove(id)
    }

    /// Remove every subscription owned by a plugin in one step.
    ///
    /// Returns how many were removed.
    pub fn unsubscribe_plugin(&self, plugin_id: &str) -> usize {
        let mut table = self.write();
        let ids: Vec<SubscriberId> = table
            .by_id
            .values()
            .filter(|s| matches!(&s.owner, SubscriberOwner::Plugin(p) if p == plugin_id))
            .map(|s| s.id)
            .collect();
        for id in &ids {
            table.remove(*id);
        }
        if !ids.is_empty() {
            tracing::debug!(plugin = %plugin_id, count = ids.len(), "Removed plugin subscriptions");
        }
        ids.len()
    }

    pub fn subscription_count(&self, plugin_id: &str) -> usize {
        self.read()
            .by_id
            .values()
            .filter(|s| matches!(&s.owner, SubscriberOwner::Plugin(p) if p == plugin_id))
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().by_id.len()
    }

    /// Deliver `event` to every matching subscriber without blocking.
    pub fn publish(&self, event: Event) -> PublishReport {
        self.publish_shared(Arc::new(event))
    }

    pub fn publish_shared(&self, event: Arc<Event>) -> PublishReport {
        self.published.fetch_add(1, Ordering::Relaxed);
        let targets = self.read().matching(&event.event_type);

        let mut report = PublishReport::default();
        let mut closed = Vec::new();
        for sub in targets {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {
                    sub.delivered.fetch_add(1, Ordering::Relaxed);
                    report.delivered += 1;
                }
                Err(TrySendError::Full(_)) => {
                    let previous = sub.dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                    if previous % 1000 == 0 {
                        tracing::warn!(
                            kind = %ErrorKind::EventDeliveryDropped,
                            subscriber = sub.id,
                            owner = %sub.owner,
                            event_type = %event.event_type,
                            dropped_total = previous + 1,
                            "Subscriber queue full, dropping event"
                        );
                    }
                }
                Err(TrySendError::Closed(_)) => closed.push(sub.id),
            }
        }

        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        if !closed.is_empty() {
            let mut table = self.write();
            for id in closed {
                table.remove(id);
            }
        }

        report
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }

    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        let mut infos: Vec<SubscriberInfo> = self
            .read()
            .by_id
            .values()
            .map(|s| SubscriberInfo {
                id: s.id,
                owner: s.owner.clone(),
                patterns: s.patterns.iter().map(ToString::to_string).collect(),
                delivered: s.delivered.load(Ordering::Relaxed),
                dropped: s.dropped.load(Ordering::Relaxed),
            })
            .collect();
        infos.sort_by_key(|s| s.id);
        infos
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBroker for EventBus {
    fn publish(&self, event: Event) -> PublishReport {
        EventBus::publish(self, event)
    }

    fn subscribe(
        &self,
        plugin_id: &str,
        patterns: Vec<EventPattern>,
        capacity: usize,
    ) -> mpsc::Receiver<Arc<Event>> {
        let (_, rx) = EventBus::subscribe(
            self,
            SubscriberOwner::Plugin(plugin_id.to_string()),
            patterns,
            capacity,
        );
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn patterns(raw: &[&str]) -> Vec<EventPattern> {
        raw.iter().map(|p| EventPattern::parse(p).unwrap()).collect()
    }

    fn plugin(id: &str) -> SubscriberOwner {
        SubscriberOwner::Plugin(id.to_string())
    }

    // ==================== Routing ====================

    #[tokio::test]
    async fn publish_reaches_exact_and_pattern_subscribers() {
        let bus = EventBus::new();
        let (_, mut exact) = bus.subscribe(plugin("a"), patterns(&["camera.added"]), 8);
        let (_, mut ns) = bus.subscribe(plugin("b"), patterns(&["camera.*"]), 8);
        let (_, mut all) = bus.subscribe_system("fanout", patterns(&["*"]), 8);
        let (_, mut other) = bus.subscribe(plugin("c"), patterns(&["motion"]), 8);

        let report = bus.publish(Event::new("camera.added").with_camera("c1"));
        assert_eq!(report.delivered, 3);
        assert_eq!(report.dropped, 0);

        assert_eq!(exact.recv().await.unwrap().event_type, "camera.added");
        assert_eq!(ns.recv().await.unwrap().event_type, "camera.added");
        assert_eq!(all.recv().await.unwrap().event_type, "camera.added");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn overlapping_patterns_deliver_once() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.subscribe(
            plugin("a"),
            patterns(&["detection", "detection.*", "*"]),
            8,
        );

        bus.publish(Event::new("detection"));
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_subscriber_order_is_fifo() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.subscribe(plugin("a"), patterns(&["motion"]), 16);

        for i in 0..10 {
            bus.publish(Event::new("motion").with_field("seq", i));
        }
        for i in 0..10 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.payload["seq"], i);
        }
    }

    // ==================== Backpressure ====================

    #[tokio::test]
    async fn full_subscriber_drops_without_blocking_or_starving_others() {
        let bus = EventBus::new();
        let (slow_id, _slow_rx) = bus.subscribe(plugin("slow"), patterns(&["detection"]), 2);
        let (_, mut fast_rx) = bus.subscribe(plugin("fast"), patterns(&["detection"]), 64);

        let started = Instant::now();
        let mut dropped = 0;
        for i in 0..50 {
            dropped += bus.publish(Event::new("detection").with_field("seq", i)).dropped;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(dropped, 48);

        for i in 0..50 {
            assert_eq!(fast_rx.recv().await.unwrap().payload["seq"], i);
        }

        let slow = bus
            .subscribers()
            .into_iter()
            .find(|s| s.id == slow_id)
            .unwrap();
        assert_eq!(slow.delivered, 2);
        assert_eq!(slow.dropped, 48);
        assert_eq!(bus.stats().dropped, 48);
    }

    // ==================== Unsubscribe ====================

    #[tokio::test]
    async fn unsubscribe_plugin_removes_all_of_its_subscriptions() {
        let bus = EventBus::new();
        let (_, mut a1) = bus.subscribe(plugin("a"), patterns(&["motion"]), 8);
        let (_, _a2) = bus.subscribe(plugin("a"), patterns(&["camera.*"]), 8);
        let (_, mut b) = bus.subscribe(plugin("b"), patterns(&["motion"]), 8);

        assert_eq!(bus.subscription_count("a"), 2);
        assert_eq!(bus.unsubscribe_plugin("a"), 2);
        assert_eq!(bus.subscription_count("a"), 0);

        let report = bus.publish(Event::new("motion"));
        assert_eq!(report.delivered, 1);
        assert!(b.recv().await.is_some());
        // sender dropped with the subscription
        assert!(a1.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned() {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe(plugin("gone"), patterns(&["motion"]), 8);
        drop(rx);

        let report = bus.publish(Event::new("motion"));
        assert_eq!(report.delivered, 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn broker_subscribe_tags_plugin_owner() {
        let bus = EventBus::new();
        let broker: &dyn EventBroker = &bus;
        let _rx = broker.subscribe("onvif", patterns(&["camera.*"]), 4);
        assert_eq!(bus.subscription_count("onvif"), 1);
        assert_eq!(
            bus.subscribers()[0].owner,
            SubscriberOwner::Plugin("onvif".into())
        );
    }
}
