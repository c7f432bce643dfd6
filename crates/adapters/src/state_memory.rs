//! In-memory seen store with a size bound and a time-to-live

use async_trait::async_trait;
use autopost_domain::{Clock, SeenStore, StateError, SystemClock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

/// Bounded in-memory seen store.
///
/// Holds at most `capacity` identifiers; the least recently sighted is
/// forgotten first. An identifier not sighted for longer than `ttl` counts as
/// unseen again; every `mark_seen` call counts as a sighting.
pub struct BoundedSeenStore {
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<SeenEntries>,
}

#[derive(Default)]
struct SeenEntries {
    recorded_at: HashMap<String, OffsetDateTime>,
    order: VecDeque<(String, OffsetDateTime)>,
}

impl SeenEntries {
    fn purge_expired(&mut self, cutoff: OffsetDateTime) {
        while let Some((_, at)) = self.order.front() {
            if *at > cutoff {
                break;
            }
            if let Some((id, _)) = self.order.pop_front() {
                self.recorded_at.remove(&id);
            }
        }
    }
}

impl BoundedSeenStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            clock,
            entries: Mutex::new(SeenEntries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.recorded_at.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SeenStore for BoundedSeenStore {
    async fn is_seen(&self, id: &str) -> Result<bool, StateError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StateError::Database(e.to_string()))?;
        let cutoff = self.clock.now() - self.ttl;
        Ok(entries.recorded_at.get(id).is_some_and(|at| *at > cutoff))
    }

    async fn mark_seen(&self, id: &str) -> Result<bool, StateError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StateError::Database(e.to_string()))?;
        let now = self.clock.now();
        entries.purge_expired(now - self.ttl);

        // A repeat sighting refreshes the entry and moves it to the back
        if entries.recorded_at.insert(id.to_string(), now).is_some() {
            if let Some(pos) = entries.order.iter().position(|(seen, _)| seen == id) {
                entries.order.remove(pos);
            }
            entries.order.push_back((id.to_string(), now));
            return Ok(false);
        }

        entries.order.push_back((id.to_string(), now));

        while entries.order.len() > self.capacity {
            if let Some((evicted, _)) = entries.order.pop_front() {
                entries.recorded_at.remove(&evicted);
                tracing::trace!(id = %evicted, "Evicted from seen store");
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    struct ManualClock {
        now: Mutex<OffsetDateTime>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.now.lock().unwrap()
        }
    }

    fn store(capacity: usize, ttl: Duration) -> (BoundedSeenStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock {
            now: Mutex::new(datetime!(2024-01-01 00:00 UTC)),
        });
        let store = BoundedSeenStore::with_clock(capacity, ttl, clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_mark_seen_is_true_only_once() {
        let (store, _) = store(10, Duration::hours(1));

        assert!(store.mark_seen("a").await.unwrap());
        assert!(!store.mark_seen("a").await.unwrap());
        assert!(store.is_seen("a").await.unwrap());
        assert!(!store.is_seen("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let (store, _) = store(2, Duration::hours(1));

        store.mark_seen("a").await.unwrap();
        store.mark_seen("b").await.unwrap();
        store.mark_seen("c").await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(!store.is_seen("a").await.unwrap());
        assert!(store.is_seen("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let (store, clock) = store(10, Duration::hours(1));

        store.mark_seen("a").await.unwrap();
        clock.advance(Duration::minutes(59));
        assert!(store.is_seen("a").await.unwrap());

        clock.advance(Duration::minutes(2));
        assert!(!store.is_seen("a").await.unwrap());
        assert!(store.mark_seen("a").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_sightings_keep_entry_alive() {
        let (store, clock) = store(10, Duration::hours(72));

        assert!(store.mark_seen("guid-1").await.unwrap());

        // Polled every hour for well past the ttl, as a long-lived feed entry is
        for _ in 0..200 {
            clock.advance(Duration::hours(1));
            assert!(!store.mark_seen("guid-1").await.unwrap());
        }

        assert!(store.is_seen("guid-1").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_sighting_protects_from_eviction() {
        let (store, _) = store(2, Duration::hours(1));

        store.mark_seen("a").await.unwrap();
        store.mark_seen("b").await.unwrap();
        store.mark_seen("a").await.unwrap();
        store.mark_seen("c").await.unwrap();

        assert!(store.is_seen("a").await.unwrap());
        assert!(!store.is_seen("b").await.unwrap());
        assert!(store.is_seen("c").await.unwrap());
    }
}
