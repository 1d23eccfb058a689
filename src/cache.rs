//! Caches shared by compilations.
//!
//! `LruCache` holds compiled artifacts keyed by signature. It is bounded, entries expire after a
//! time to live, and `get_or_compute` compiles each key at most once at a time: callers asking for
//! a key that is being compiled wait on that entry's lock and then see the result.
//!
//! `MemoCache` is an unbounded memo for values that are expensive to fetch during compilation,
//! such as table metadata from a schema. It is only emptied by `clear`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use xxhash_rust::xxh3::xxh3_128;

/// Cache key for a compiled query: hex of a 128-bit hash of the query text and the identity of
/// the provider it was compiled against.
pub fn signature(query_text: &str, provider_identity: &str) -> String {
    let mut bytes = Vec::with_capacity(query_text.len() + provider_identity.len() + 1);
    bytes.extend_from_slice(query_text.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(provider_identity.as_bytes());
    hex::encode(xxh3_128(&bytes).to_be_bytes())
}

struct Slot<V> {
    last_used: AtomicU64,
    value: Mutex<Option<(V, Instant)>>,
}

pub struct LruCache<K, V> {
    slots: RwLock<HashMap<K, Arc<Slot<V>>>>,
    tick: AtomicU64,
    capacity: usize,
    ttl: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        LruCache {
            slots: RwLock::new(HashMap::with_capacity(capacity)),
            tick: AtomicU64::new(0),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn touch(&self, slot: &Slot<V>) {
        let now = self.tick.fetch_add(1, Ordering::Relaxed);
        slot.last_used.store(now, Ordering::Relaxed);
    }

    fn slot(&self, key: &K) -> Arc<Slot<V>> {
        if let Some(slot) = self.slots.read().get(key) {
            self.touch(slot);
            return slot.clone();
        }
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get(key) {
            self.touch(slot);
            return slot.clone();
        }
        // Slots still being computed are never evicted, so the cache may run over capacity until
        // those computations finish.
        while slots.len() >= self.capacity {
            let victim = slots
                .iter()
                .filter(|(_, s)| s.value.try_lock().map_or(false, |v| v.is_some()))
                .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            match victim {
                Some(victim) => {
                    slots.remove(&victim);
                }
                None => break,
            }
        }
        let slot = Arc::new(Slot {
            last_used: AtomicU64::new(self.tick.fetch_add(1, Ordering::Relaxed)),
            value: Mutex::new(None),
        });
        slots.insert(key.clone(), slot.clone());
        slot
    }

    /// Return the cached value for `key`, computing it with `f` if it is missing or expired.
    /// Errors from `f` are returned and nothing is cached.
    pub fn get_or_compute<E, F>(&self, key: &K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = self.slot(key);
        let mut value = slot.value.lock();
        if let Some((v, at)) = value.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(v.clone());
            }
        }
        match f() {
            Ok(v) => {
                *value = Some((v.clone(), Instant::now()));
                Ok(v)
            }
            Err(e) => {
                *value = None;
                drop(value);
                let mut slots = self.slots.write();
                if slots.get(key).map(|s| Arc::ptr_eq(s, &slot)).unwrap_or(false) {
                    slots.remove(key);
                }
                Err(e)
            }
        }
    }

    /// The cached value for `key` if present and not expired. Refreshes recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.read().get(key).cloned()?;
        self.touch(&slot);
        let value = slot.value.lock();
        value
            .as_ref()
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(v, _)| v.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.slots.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.write().clear();
    }
}

pub struct MemoCache<K, V> {
    values: Mutex<HashMap<K, V>>,
}

impl<K: Hash + Eq, V: Clone> Default for MemoCache<K, V> {
    fn default() -> Self {
        MemoCache {
            values: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Hash + Eq, V: Clone> MemoCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoized value for `key`, or the result of `f`, which is stored if it succeeds.
    pub fn get_or_insert<E, F>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(v) = self.values.lock().get(&key) {
            return Ok(v.clone());
        }
        // `f` runs unlocked. Concurrent misses may both fetch; the first stored value wins.
        let v = f()?;
        Ok(self.values.lock().entry(key).or_insert(v).clone())
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.values.lock().clear();
    }
}

#[test]
fn test_signature_depends_on_text_and_identity() {
    let a = signature("SELECT 1", "memory");
    assert_eq!(a.len(), 32);
    assert_eq!(a, signature("SELECT 1", "memory"));
    assert_ne!(a, signature("SELECT 2", "memory"));
    assert_ne!(a, signature("SELECT 1", "other"));
}

#[test]
fn test_lru_evicts_least_recently_used() {
    let cache: LruCache<&str, i32> = LruCache::new(2, Duration::from_secs(60));
    let ok = |v| move || Ok::<i32, ()>(v);
    cache.get_or_compute(&"a", ok(1)).unwrap();
    cache.get_or_compute(&"b", ok(2)).unwrap();
    // Touch a so that b is the oldest.
    assert_eq!(cache.get(&"a"), Some(1));
    cache.get_or_compute(&"c", ok(3)).unwrap();
    assert!(cache.contains_key(&"a"));
    assert!(!cache.contains_key(&"b"));
    assert!(cache.contains_key(&"c"));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_lru_does_not_cache_failures() {
    let cache: LruCache<&str, i32> = LruCache::new(4, Duration::from_secs(60));
    assert_eq!(cache.get_or_compute(&"a", || Err("boom")), Err("boom"));
    assert!(cache.is_empty());
    assert_eq!(cache.get_or_compute(&"a", || Ok::<i32, &str>(7)), Ok(7));
    assert_eq!(cache.get_or_compute(&"a", || Err("unused")), Ok(7));
}

#[test]
fn test_lru_expired_entries_are_recomputed() {
    let cache: LruCache<&str, i32> = LruCache::new(4, Duration::from_millis(20));
    cache.get_or_compute(&"a", || Ok::<i32, ()>(1)).unwrap();
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(cache.get(&"a"), None);
    assert_eq!(cache.get_or_compute(&"a", || Ok::<i32, ()>(2)), Ok(2));
}

#[test]
fn test_lru_single_flight() {
    use std::sync::atomic::AtomicUsize;
    let cache = Arc::new(LruCache::<String, usize>::new(4, Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            std::thread::spawn(move || {
                cache
                    .get_or_compute(&"q".to_string(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(30));
                        Ok::<usize, ()>(42)
                    })
                    .unwrap()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lru_keeps_entries_being_computed() {
    use std::sync::atomic::AtomicUsize;
    let cache = Arc::new(LruCache::<String, usize>::new(1, Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = crossbeam_channel::bounded(0);
    let compile_x = |cache: Arc<LruCache<String, usize>>, calls: Arc<AtomicUsize>| {
        move || {
            cache.get_or_compute(&"x".to_string(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                Ok::<usize, ()>(1)
            })
        }
    };
    let first = {
        let run = compile_x(cache.clone(), calls.clone());
        std::thread::spawn(move || {
            started_tx.send(()).unwrap();
            run()
        })
    };
    started_rx.recv().unwrap();
    // Give the first thread time to take the entry lock.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(cache.get_or_compute(&"y".to_string(), || Ok::<usize, ()>(2)), Ok(2));
    assert!(cache.contains_key(&"x".to_string()));
    let second = std::thread::spawn(compile_x(cache.clone(), calls.clone()));
    assert_eq!(first.join().unwrap(), Ok(1));
    assert_eq!(second.join().unwrap(), Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_memo_cache() {
    let memo: MemoCache<(String, usize), String> = MemoCache::new();
    let key = || ("entities".to_string(), 0);
    assert_eq!(memo.get_or_insert(key(), || Ok::<_, ()>("first".to_string())), Ok("first".to_string()));
    assert_eq!(memo.get_or_insert(key(), || Ok::<_, ()>("second".to_string())), Ok("first".to_string()));
    assert!(memo.get_or_insert(("x".to_string(), 1), || Err(())).is_err());
    assert_eq!(memo.len(), 1);
    memo.clear();
    assert!(memo.is_empty());
}
