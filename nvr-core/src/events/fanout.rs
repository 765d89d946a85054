//! StreamFanout - live event delivery to connected clients
//!
//! Each client owns a fixed-size queue. When a client's queue is full the
//! newest event is dropped for that client and its drop counter bumped; the
//! broadcaster never waits on a client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use nvr_plugin_api::{Event, EventPattern, PublishReport};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bus::EventBus;

pub type ClientId = u64;

/// Per-client event filter.
///
/// Empty lists match everything; a `*` camera entry matches every camera.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFilter {
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub cameras: Vec<String>,
}

impl ClientFilter {
    pub fn matches(&self, event: &Event) -> bool {
        let type_ok = self.event_types.is_empty()
            || self.event_types.iter().any(|raw| {
                EventPattern::parse(raw).is_ok_and(|p| p.matches(&event.event_type))
            });
        let camera_ok = self.cameras.is_empty()
            || self.cameras.iter().any(|c| c == "*")
            || event
                .camera_id
                .as_ref()
                .is_some_and(|id| self.cameras.contains(id));
        type_ok && camera_ok
    }
}

/// Wire message for one streamed event
#[derive(Debug, Serialize)]
pub struct StreamMessage<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub event: &'a Event,
}

impl<'a> StreamMessage<'a> {
    pub fn event(event: &'a Event) -> Self {
        Self {
            msg_type: "event",
            event,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

struct ClientSlot {
    tx: mpsc::Sender<Arc<Event>>,
    filter: RwLock<ClientFilter>,
    delivered: AtomicU64,
    dropped: Arc<AtomicU64>,
}

struct FanoutInner {
    clients: RwLock<HashMap<ClientId, Arc<ClientSlot>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl FanoutInner {
    fn remove(&self, id: ClientId) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientStats {
    pub id: ClientId,
    pub delivered: u64,
    pub dropped: u64,
}

/// Registry of live client channels
#[derive(Clone)]
pub struct StreamFanout {
    inner: Arc<FanoutInner>,
}

impl StreamFanout {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                clients: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a client. Dropping the returned handle disconnects it.
    pub fn connect(&self, filter: ClientFilter) -> FanoutClient {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));
        let slot = Arc::new(ClientSlot {
            tx,
            filter: RwLock::new(filter),
            delivered: AtomicU64::new(0),
            dropped: dropped.clone(),
        });
        self.inner
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, slot);
        tracing::debug!(client = id, "Stream client connected");
        FanoutClient {
            id,
            rx,
            dropped,
            fanout: Arc::downgrade(&self.inner),
        }
    }

    pub fn disconnect(&self, id: ClientId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            tracing::debug!(client = id, "Stream client disconnected");
        }
        removed
    }

    pub fn set_filter(&self, id: ClientId, filter: ClientFilter) -> bool {
        let clients = self
            .inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match clients.get(&id) {
            Some(slot) => {
                *slot.filter.write().unwrap_or_else(PoisonError::into_inner) = filter;
                true
            }
            None => false,
        }
    }

    /// Offer `event` to every connected client whose filter matches.
    pub fn broadcast(&self, event: Arc<Event>) -> PublishReport {
        let targets: Vec<(ClientId, Arc<ClientSlot>)> = self
            .inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut closed = Vec::new();
        for (id, slot) in targets {
            let wanted = slot
                .filter
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .matches(&event);
            if !wanted {
                continue;
            }
            match slot.tx.try_send(event.clone()) {
                Ok(()) => {
                    slot.delivered.fetch_add(1, Ordering::Relaxed);
                    report.delivered += 1;
                }
                Err(TrySendError::Full(_)) => {
                    slot.dropped.fetch_add(1, Ordering::Relaxed);
                    report.dropped += 1;
                    tracing::trace!(client = id, event_type = %event.event_type, "Client buffer full, dropping newest event");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }
        for id in closed {
            self.inner.remove(id);
        }
        report
    }

    /// Feed this fanout from a system subscription on `bus` until `shutdown`.
    pub fn attach(&self, bus: &EventBus, queue: usize, shutdown: CancellationToken) -> JoinHandle<()> {
        let (sub_id, mut rx) = bus.subscribe_system("stream-fanout", vec![EventPattern::All], queue);
        let fanout = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => {
                            fanout.broadcast(event);
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!(subscriber = sub_id, "Stream fanout detached");
        })
    }

    pub fn client_count(&self) -> usize {
        self.inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn client_stats(&self) -> Vec<ClientStats> {
        let mut stats: Vec<ClientStats> = self
            .inner
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, slot)| ClientStats {
                id: *id,
                delivered: slot.delivered.load(Ordering::Relaxed),
                dropped: slot.dropped.load(Ordering::Relaxed),
            })
            .collect();
        stats.sort_by_key(|s| s.id);
        stats
    }
}

/// A connected client's end of the fanout
pub struct FanoutClient {
    id: ClientId,
    rx: mpsc::Receiver<Arc<Event>>,
    dropped: Arc<AtomicU64>,
    fanout: Weak<FanoutInner>,
}

impl FanoutClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next event for this client; `None` once disconnected.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Events dropped for this client because its buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn into_receiver(mut self) -> mpsc::Receiver<Arc<Event>> {
        let (_, empty) = mpsc::channel(1);
        std::mem::replace(&mut self.rx, empty)
    }
}

impl Drop for FanoutClient {
    fn drop(&mut self) {
        if let Some(inner) = self.fanout.upgrade() {
            inner.remove(self.id);
        }
    }
}
