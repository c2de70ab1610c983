//! Cache Store Module
//!
//! Namespaced response storage with per-namespace LRU bounds and read-time TTL checks,
//! written behind to the durable database when one is attached.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{
    spawn_cache_writer, CacheEntry, CacheStats, CacheWriter, LruTracker, NamespacePolicy,
};
use crate::clock::SharedClock;
use crate::db::{Database, StorageError};
use crate::models::ResponsePayload;

// == Partition ==
/// One namespace: its entries, access order and counters.
#[derive(Debug)]
struct Partition {
    policy: NamespacePolicy,
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: CacheStats,
}

impl Partition {
    fn new(policy: NamespacePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
        }
    }

    /// Evicts least-recently-accessed entries until the bound holds.
    fn enforce_bound(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();

        if let Some(max) = self.policy.max_entries {
            while self.entries.len() > max {
                match self.lru.evict_oldest() {
                    Some(key) => {
                        self.entries.remove(&key);
                        self.stats.record_eviction();
                        evicted.push(key);
                    }
                    None => break,
                }
            }
        }

        self.stats.set_total_entries(self.entries.len());
        evicted
    }
}

// == Lookup ==
/// An entry found by [`CacheStore::lookup_any`].
#[derive(Debug, Clone)]
pub struct Lookup {
    pub entry: CacheEntry,
    /// Past the namespace's max age
    pub expired: bool,
}

// == Cache Store ==
/// The process-wide response cache.
#[derive(Debug)]
pub struct CacheStore {
    partitions: HashMap<String, Partition>,
    writer: Option<CacheWriter>,
    clock: SharedClock,
}

impl CacheStore {
    // == Constructors ==
    /// Creates a memory-only store with the given namespace policies.
    pub fn new(policies: Vec<NamespacePolicy>, clock: SharedClock) -> Self {
        let partitions = policies
            .into_iter()
            .map(|policy| (policy.name.clone(), Partition::new(policy)))
            .collect();

        Self {
            partitions,
            writer: None,
            clock,
        }
    }

    /// Creates a store backed by `db`, reloading whatever it already holds.
    ///
    /// Entries are replayed oldest first so the rebuilt LRU order matches
    /// storage order, then each namespace bound is re-applied in case the
    /// policies shrank since the entries were written. The reload reads the
    /// database directly; later writes go through a writer task, so this must
    /// run inside a tokio runtime.
    pub fn with_database(
        policies: Vec<NamespacePolicy>,
        clock: SharedClock,
        db: Arc<Database>,
    ) -> Result<Self, StorageError> {
        let mut store = Self::new(policies, clock);
        let entries = db.load_cache_entries()?;
        let loaded = entries.len();

        for entry in entries {
            let partition = store.partition_mut(&entry.namespace);
            partition.lru.touch(&entry.request_key);
            partition
                .entries
                .insert(entry.request_key.clone(), entry);
        }

        for (namespace, partition) in store.partitions.iter_mut() {
            for key in partition.enforce_bound() {
                db.delete_cache_entry(namespace, &key)?;
            }
        }

        debug!("Cache store reloaded {} entries", loaded);
        let (writer, _) = spawn_cache_writer(db);
        store.writer = Some(writer);
        Ok(store)
    }

    fn partition_mut(&mut self, namespace: &str) -> &mut Partition {
        self.partitions
            .entry(namespace.to_string())
            .or_insert_with(|| Partition::new(NamespacePolicy::new(namespace)))
    }

    // == Policy ==
    /// The policy of a namespace. Unknown namespaces are unbounded.
    pub fn policy(&self, namespace: &str) -> NamespacePolicy {
        self.partitions
            .get(namespace)
            .map(|p| p.policy.clone())
            .unwrap_or_else(|| NamespacePolicy::new(namespace))
    }

    // == Lookup Fresh ==
    /// Returns the entry for `key` if it exists and has not expired.
    ///
    /// An expired entry is deleted on the spot and reported as absent.
    pub fn lookup_fresh(&mut self, namespace: &str, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now_ms();
        let partition = self.partition_mut(namespace);

        let expired = match partition.entries.get(key) {
            Some(entry) => entry.is_expired(partition.policy.max_age, now),
            None => {
                partition.stats.record_miss();
                return None;
            }
        };

        if expired {
            partition.entries.remove(key);
            partition.lru.remove(key);
            partition.stats.record_expired();
            partition.stats.record_miss();
            partition.stats.set_total_entries(partition.entries.len());
            self.persist_delete(namespace, key);
            return None;
        }

        partition.stats.record_hit();
        partition.lru.touch(key);
        partition.entries.get(key).cloned()
    }

    // == Lookup Any ==
    /// Returns the entry for `key` whether or not it has expired.
    ///
    /// Used as a last-resort fallback; nothing is deleted.
    pub fn lookup_any(&mut self, namespace: &str, key: &str) -> Option<Lookup> {
        let now = self.clock.now_ms();
        let partition = self.partition_mut(namespace);

        let Some(entry) = partition.entries.get(key).cloned() else {
            partition.stats.record_miss();
            return None;
        };

        let expired = entry.is_expired(partition.policy.max_age, now);
        if expired {
            partition.stats.record_stale_served();
        } else {
            partition.stats.record_hit();
        }
        partition.lru.touch(key);

        Some(Lookup { entry, expired })
    }

    // == Put ==
    /// Stores a response under `key`, stamped `stored_at`.
    ///
    /// A write older than the entry already held is dropped, so the later
    /// `stored_at` wins when writes race. Returns whether the write was kept.
    /// Eviction runs after every accepted write.
    pub fn put(
        &mut self,
        namespace: &str,
        key: &str,
        payload: ResponsePayload,
        stored_at: u64,
    ) -> bool {
        let partition = self.partition_mut(namespace);

        if let Some(existing) = partition.entries.get(key) {
            if existing.stored_at > stored_at {
                debug!(
                    "Dropping older write for {} in '{}' ({} < {})",
                    key, namespace, stored_at, existing.stored_at
                );
                return false;
            }
        }

        let entry = CacheEntry::new(namespace, key, payload, stored_at);
        partition.entries.insert(key.to_string(), entry.clone());
        partition.lru.touch(key);
        partition.stats.record_write();
        let evicted = partition.enforce_bound();
        let kept = partition.entries.contains_key(key);

        if kept {
            self.persist_upsert(&entry);
        }
        for evicted_key in &evicted {
            self.persist_delete(namespace, evicted_key);
        }

        kept
    }

    // == Invalidate ==
    /// Removes one entry. Returns false if it was not present.
    pub fn invalidate(&mut self, namespace: &str, key: &str) -> bool {
        let Some(partition) = self.partitions.get_mut(namespace) else {
            return false;
        };

        let removed = partition.entries.remove(key).is_some();
        if removed {
            partition.lru.remove(key);
            partition.stats.set_total_entries(partition.entries.len());
            self.persist_delete(namespace, key);
        }
        removed
    }

    // == Clear ==
    /// Removes every entry of a namespace, returning how many were held.
    pub fn clear(&mut self, namespace: &str) -> usize {
        let Some(partition) = self.partitions.get_mut(namespace) else {
            return 0;
        };

        let count = partition.entries.len();
        partition.entries.clear();
        partition.lru.clear();
        partition.stats.set_total_entries(0);

        if let Some(writer) = &self.writer {
            writer.clear(namespace);
        }
        count
    }

    // == Stats ==
    /// Current statistics, keyed by namespace.
    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.partitions
            .iter()
            .map(|(name, partition)| {
                let mut stats = partition.stats.clone();
                stats.set_total_entries(partition.entries.len());
                (name.clone(), stats)
            })
            .collect()
    }

    // == Length ==
    /// Number of entries held in a namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.partitions
            .get(namespace)
            .map(|p| p.entries.len())
            .unwrap_or(0)
    }

    /// True when no namespace holds an entry.
    pub fn is_empty(&self) -> bool {
        self.partitions.values().all(|p| p.entries.is_empty())
    }

    // == Persistence ==
    /// A future that resolves once every write issued so far is on disk.
    ///
    /// It does not borrow the store, so callers can release the cache lock
    /// before awaiting it.
    pub fn flush(&self) -> impl Future<Output = ()> + Send + 'static {
        let writer = self.writer.clone();
        async move {
            if let Some(writer) = writer {
                writer.flush().await;
            }
        }
    }

    fn persist_upsert(&self, entry: &CacheEntry) {
        if let Some(writer) = &self.writer {
            writer.upsert(entry.clone());
        }
    }

    fn persist_delete(&self, namespace: &str, key: &str) {
        if let Some(writer) = &self.writer {
            writer.delete(namespace, key);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ASSETS, IMAGES, PAGES};
    use crate::clock::{Clock, ManualClock};
    use std::time::{Duration, Instant};

    const T0: u64 = 1_700_000_000_000;

    fn payload(body: &str) -> ResponsePayload {
        ResponsePayload::new(200, vec![], body)
    }

    fn store_with(policies: Vec<NamespacePolicy>) -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (CacheStore::new(policies, clock.clone()), clock)
    }

    #[test]
    fn test_store_new() {
        let (store, _) = store_with(vec![NamespacePolicy::new(PAGES)]);
        assert!(store.is_empty());
        assert_eq!(store.len(PAGES), 0);
    }

    #[test]
    fn test_put_and_lookup_fresh() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(PAGES)]);

        assert!(store.put(PAGES, "k1", payload("home"), T0));
        let entry = store.lookup_fresh(PAGES, "k1").unwrap();

        assert_eq!(entry.payload.body, b"home");
        assert_eq!(entry.stored_at, T0);
        assert_eq!(store.len(PAGES), 1);
    }

    #[test]
    fn test_lookup_missing() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(PAGES)]);
        assert!(store.lookup_fresh(PAGES, "nope").is_none());
        assert!(store.lookup_any(PAGES, "nope").is_none());
        assert_eq!(store.stats()[PAGES].misses, 2);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let (mut store, _) = store_with(vec![
            NamespacePolicy::new(ASSETS).with_max_entries(1),
            NamespacePolicy::new(IMAGES).with_max_entries(1),
        ]);

        store.put(ASSETS, "same", payload("css"), T0);
        store.put(IMAGES, "same", payload("png"), T0);

        assert_eq!(store.lookup_fresh(ASSETS, "same").unwrap().payload.body, b"css");
        assert_eq!(store.lookup_fresh(IMAGES, "same").unwrap().payload.body, b"png");
        assert_eq!(store.stats()[ASSETS].evictions, 0);
    }

    #[test]
    fn test_duplicate_key_replaces_and_resets_stored_at() {
        let (mut store, clock) = store_with(vec![NamespacePolicy::new(PAGES)]);

        store.put(PAGES, "k", payload("v1"), T0);
        clock.advance(Duration::from_secs(10));
        store.put(PAGES, "k", payload("v2"), clock.now_ms());

        let entry = store.lookup_fresh(PAGES, "k").unwrap();
        assert_eq!(entry.payload.body, b"v2");
        assert_eq!(entry.stored_at, T0 + 10_000);
        assert_eq!(store.len(PAGES), 1);
    }

    #[test]
    fn test_older_write_loses() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(PAGES)]);

        assert!(store.put(PAGES, "k", payload("newer"), T0 + 5));
        assert!(!store.put(PAGES, "k", payload("older"), T0));

        assert_eq!(store.lookup_fresh(PAGES, "k").unwrap().payload.body, b"newer");
    }

    #[test]
    fn test_ttl_expiry_removes_on_fresh_lookup() {
        let (mut store, clock) = store_with(vec![
            NamespacePolicy::new(IMAGES).with_max_age(Duration::from_secs(60))
        ]);

        store.put(IMAGES, "k", payload("png"), T0);

        clock.set(T0 + 60_000);
        assert!(store.lookup_fresh(IMAGES, "k").is_some());

        clock.set(T0 + 60_001);
        assert!(store.lookup_fresh(IMAGES, "k").is_none());
        assert_eq!(store.len(IMAGES), 0);
        assert_eq!(store.stats()[IMAGES].expired, 1);
    }

    #[test]
    fn test_lookup_any_returns_expired_without_deleting() {
        let (mut store, clock) = store_with(vec![
            NamespacePolicy::new(PAGES).with_max_age(Duration::from_secs(60))
        ]);

        store.put(PAGES, "k", payload("old"), T0);
        clock.advance(Duration::from_secs(10 * 24 * 3600));

        let found = store.lookup_any(PAGES, "k").unwrap();
        assert!(found.expired);
        assert_eq!(found.entry.payload.body, b"old");
        assert_eq!(store.len(PAGES), 1);
        assert_eq!(store.stats()[PAGES].stale_served, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(ASSETS).with_max_entries(3)]);

        store.put(ASSETS, "k1", payload("1"), T0);
        store.put(ASSETS, "k2", payload("2"), T0);
        store.put(ASSETS, "k3", payload("3"), T0);
        store.put(ASSETS, "k4", payload("4"), T0);

        assert_eq!(store.len(ASSETS), 3);
        assert!(store.lookup_fresh(ASSETS, "k1").is_none());
        assert!(store.lookup_fresh(ASSETS, "k2").is_some());
        assert_eq!(store.stats()[ASSETS].evictions, 1);
    }

    #[test]
    fn test_lru_read_protects_entry() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(ASSETS).with_max_entries(3)]);

        store.put(ASSETS, "k1", payload("1"), T0);
        store.put(ASSETS, "k2", payload("2"), T0);
        store.put(ASSETS, "k3", payload("3"), T0);

        store.lookup_fresh(ASSETS, "k1").unwrap();
        store.put(ASSETS, "k4", payload("4"), T0);

        assert!(store.lookup_fresh(ASSETS, "k1").is_some());
        assert!(store.lookup_fresh(ASSETS, "k2").is_none());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(ASSETS).with_max_entries(0)]);
        assert!(!store.put(ASSETS, "k", payload("x"), T0));
        assert_eq!(store.len(ASSETS), 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (mut store, _) = store_with(vec![NamespacePolicy::new(PAGES)]);

        store.put(PAGES, "a", payload("a"), T0);
        store.put(PAGES, "b", payload("b"), T0);

        assert!(store.invalidate(PAGES, "a"));
        assert!(!store.invalidate(PAGES, "a"));
        assert!(!store.invalidate("unknown", "a"));
        assert_eq!(store.clear(PAGES), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_namespace_is_unbounded() {
        let (mut store, _) = store_with(vec![]);
        for i in 0..20 {
            store.put("custom", &format!("k{i}"), payload("x"), T0);
        }
        assert_eq!(store.len("custom"), 20);
        assert_eq!(store.policy("custom").max_entries, None);
    }

    #[tokio::test]
    async fn test_with_database_survives_restart() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(T0));
        let policies = vec![NamespacePolicy::new(ASSETS).with_max_entries(2)];

        {
            let mut store =
                CacheStore::with_database(policies.clone(), clock.clone(), db.clone()).unwrap();
            store.put(ASSETS, "a", payload("a"), T0);
            store.put(ASSETS, "b", payload("b"), T0 + 1);
            store.put(ASSETS, "c", payload("c"), T0 + 2);
            store.flush().await;
        }

        let mut reloaded = CacheStore::with_database(policies, clock, db).unwrap();
        assert_eq!(reloaded.len(ASSETS), 2);
        assert!(reloaded.lookup_fresh(ASSETS, "a").is_none());
        assert_eq!(reloaded.lookup_fresh(ASSETS, "c").unwrap().stored_at, T0 + 2);
    }

    #[tokio::test]
    async fn test_with_database_applies_shrunk_bound() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(T0));

        {
            let mut store = CacheStore::with_database(
                vec![NamespacePolicy::new(ASSETS)],
                clock.clone(),
                db.clone(),
            )
            .unwrap();
            for i in 0..5u64 {
                store.put(ASSETS, &format!("k{i}"), payload("x"), T0 + i);
            }
            store.flush().await;
        }

        let reloaded = CacheStore::with_database(
            vec![NamespacePolicy::new(ASSETS).with_max_entries(2)],
            clock,
            db.clone(),
        )
        .unwrap();
        assert_eq!(reloaded.len(ASSETS), 2);
        assert_eq!(db.load_cache_entries().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_put_does_not_wait_on_a_busy_database() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(T0));
        let mut store =
            CacheStore::with_database(vec![NamespacePolicy::new(ASSETS)], clock, db.clone())
                .unwrap();

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let db = db.clone();
            std::thread::spawn(move || {
                db.hold_connection_for_test(Duration::from_millis(300), locked_tx);
            })
        };
        locked_rx.recv().unwrap();

        let started = Instant::now();
        assert!(store.put(ASSETS, "k", payload("css"), T0));
        store.lookup_fresh(ASSETS, "k").unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "put waited {:?} on the connection lock",
            started.elapsed()
        );

        store.flush().await;
        holder.join().unwrap();
        assert_eq!(db.load_cache_entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_lookup_and_clear_reach_disk() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(T0));
        let mut store = CacheStore::with_database(
            vec![
                NamespacePolicy::new(IMAGES).with_max_age(Duration::from_secs(60)),
                NamespacePolicy::new(PAGES),
            ],
            clock.clone(),
            db.clone(),
        )
        .unwrap();

        store.put(IMAGES, "old", payload("png"), clock.now_ms());
        store.put(PAGES, "home", payload("html"), clock.now_ms());
        clock.advance(Duration::from_secs(61));

        assert!(store.lookup_fresh(IMAGES, "old").is_none());
        store.clear(PAGES);
        store.flush().await;

        assert!(db.load_cache_entries().unwrap().is_empty());
    }
}
