//! Bounded event history backed by a key-value store

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nvr_plugin_api::{Event, PluginError, Store};
use serde::{Deserialize, Serialize};

/// Key prefix for archived events inside the plugin's store scope
pub const EVENT_PREFIX: &str = "events/";
pub const DEFAULT_MAX_EVENTS: usize = 10_000;
const DEFAULT_RECENT_LIMIT: usize = 50;

/// Parameters of the `recent` RPC method
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecentQuery {
    pub limit: Option<usize>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub camera_id: Option<String>,
}

impl RecentQuery {
    fn matches(&self, event: &Event) -> bool {
        self.event_type
            .as_deref()
            .is_none_or(|t| event.event_type == t)
            && self
                .camera_id
                .as_deref()
                .is_none_or(|c| event.camera_id.as_deref() == Some(c))
    }
}

/// Result of the `count` RPC method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveCounts {
    pub total: usize,
    pub max_events: usize,
    pub by_type: BTreeMap<String, usize>,
    pub write_failures: u64,
}

/// In-memory window over the archived events, written through to a store.
///
/// The oldest events are evicted, from memory and store, once the archive
/// holds more than `max_events`.
pub struct EventArchive {
    store: Arc<dyn Store>,
    max_events: AtomicUsize,
    events: Mutex<VecDeque<Arc<Event>>>,
    write_failures: AtomicU64,
}

fn event_key(event: &Event) -> String {
    format!("{EVENT_PREFIX}{}", event.id)
}

impl EventArchive {
    pub fn new(store: Arc<dyn Store>, max_events: usize) -> Self {
        Self {
            store,
            max_events: AtomicUsize::new(max_events.max(1)),
            events: Mutex::new(VecDeque::new()),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn max_events(&self) -> usize {
        self.max_events.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Rebuild the window from the store, oldest first.
    ///
    /// Entries that no longer parse are skipped. Returns the number of
    /// events kept.
    pub async fn load(&self) -> Result<usize, PluginError> {
        let mut loaded: Vec<Event> = Vec::new();
        for (key, value) in self.store.list(EVENT_PREFIX).await? {
            match serde_json::from_value::<Event>(value) {
                Ok(event) => loaded.push(event),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable archived event"),
            }
        }
        loaded.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));

        let evicted = {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            events.clear();
            events.extend(loaded.into_iter().map(Arc::new));
            self.evict(&mut events)
        };
        self.delete_all(&evicted).await;
        Ok(self.len())
    }

    /// Add an event and persist it.
    ///
    /// The event is visible to queries even if the store write fails.
    pub async fn record(&self, event: Arc<Event>) -> Result<(), PluginError> {
        let evicted = {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            events.push_back(event.clone());
            self.evict(&mut events)
        };

        let value = serde_json::to_value(event.as_ref())?;
        let written = self.store.put(&event_key(&event), value).await;
        self.delete_all(&evicted).await;
        written.map_err(|e| {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            PluginError::from(e)
        })
    }

    /// Change the retention cap, evicting immediately if it shrank
    pub async fn set_max_events(&self, max_events: usize) {
        self.max_events.store(max_events.max(1), Ordering::Relaxed);
        let evicted = {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            self.evict(&mut events)
        };
        self.delete_all(&evicted).await;
    }

    /// Newest first
    pub fn recent(&self, query: &RecentQuery) -> Vec<Event> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .min(self.max_events());
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(limit)
            .map(|e| e.as_ref().clone())
            .collect()
    }

    pub fn counts(&self) -> ArchiveCounts {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let mut by_type = BTreeMap::new();
        for event in events.iter() {
            *by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        ArchiveCounts {
            total: events.len(),
            max_events: self.max_events(),
            by_type,
            write_failures: self.write_failures(),
        }
    }

    fn evict(&self, events: &mut VecDeque<Arc<Event>>) -> Vec<Arc<Event>> {
        let max = self.max_events();
        let excess = events.len().saturating_sub(max);
        events.drain(..excess).collect()
    }

    async fn delete_all(&self, evicted: &[Arc<Event>]) {
        for event in evicted {
            if let Err(e) = self.store.delete(&event_key(event)).await {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event_id = %event.id, error = %e, "Failed to delete evicted event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvr_core::MemoryStore;
    use nvr_plugin_api::StoreError;
    use serde_json::Value;

    fn motion(camera: &str) -> Arc<Event> {
        Arc::new(Event::new("motion").with_camera(camera))
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl Store for BrokenStore {
        async fn put(&self, _key: &str, _value: Value) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn list(&self, _prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn retention_evicts_oldest_from_memory_and_store() {
        let store = Arc::new(MemoryStore::new());
        let archive = EventArchive::new(store.clone(), 3);

        let events: Vec<_> = (0..5).map(|i| motion(&format!("cam-{i}"))).collect();
        for event in &events {
            archive.record(event.clone()).await.unwrap();
        }

        assert_eq!(archive.len(), 3);
        let recent = archive.recent(&RecentQuery::default());
        let cameras: Vec<_> = recent.iter().filter_map(|e| e.camera_id.as_deref()).collect();
        assert_eq!(cameras, ["cam-4", "cam-3", "cam-2"]);

        let stored = store.list(EVENT_PREFIX).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(store.get(&event_key(&events[0])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_restores_order_and_applies_cap() {
        let store = Arc::new(MemoryStore::new());
        let first = EventArchive::new(store.clone(), 10);
        for i in 0..4 {
            first.record(motion(&format!("cam-{i}"))).await.unwrap();
        }
        store
            .put("events/garbage", Value::String("nope".into()))
            .await
            .unwrap();

        let second = EventArchive::new(store.clone(), 2);
        assert_eq!(second.load().await.unwrap(), 2);
        let cameras: Vec<_> = second
            .recent(&RecentQuery::default())
            .into_iter()
            .filter_map(|e| e.camera_id)
            .collect();
        assert_eq!(cameras, ["cam-3", "cam-2"]);
        // two evicted, garbage left alone
        assert_eq!(store.list(EVENT_PREFIX).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn recent_filters_by_type_and_camera() {
        let archive = EventArchive::new(Arc::new(MemoryStore::new()), 100);
        archive.record(motion("front")).await.unwrap();
        archive.record(motion("back")).await.unwrap();
        archive
            .record(Arc::new(Event::new("detection").with_camera("front")))
            .await
            .unwrap();

        let query: RecentQuery =
            serde_json::from_value(serde_json::json!({"type": "motion", "camera_id": "front"}))
                .unwrap();
        let hits = archive.recent(&query);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event_type, "motion");

        let limited = archive.recent(&RecentQuery {
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(limited[0].event_type, "detection");

        let counts = archive.counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.by_type["motion"], 2);
        assert_eq!(counts.by_type["detection"], 1);
    }

    #[tokio::test]
    async fn shrinking_the_cap_evicts_immediately() {
        let store = Arc::new(MemoryStore::new());
        let archive = EventArchive::new(store.clone(), 10);
        for i in 0..6 {
            archive.record(motion(&format!("cam-{i}"))).await.unwrap();
        }
        archive.set_max_events(2).await;
        assert_eq!(archive.len(), 2);
        assert_eq!(store.list(EVENT_PREFIX).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn write_failure_keeps_event_in_memory() {
        let archive = EventArchive::new(Arc::new(BrokenStore), 10);
        let err = archive.record(motion("front")).await.unwrap_err();
        assert!(matches!(err, PluginError::Store(_)));
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.counts().write_failures, 1);
    }
}
