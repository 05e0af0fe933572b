//  Copyright 2025 Hive Project Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::{
    borrow::Borrow,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use hive_common::code::{Key, Value};
use parking_lot::Mutex;

use crate::{
    event::EventListener,
    lru::{Lru, Weighter},
};

/// Operation counters, shared as plain atomics.
#[derive(Debug, Default)]
pub struct Metrics {
    pub hit: AtomicU64,
    pub miss: AtomicU64,
    pub insert: AtomicU64,
    pub remove: AtomicU64,
}

pub struct CacheBuilder<K, V>
where
    K: Key + Clone,
    V: Value,
{
    capacity: usize,
    weighter: Weighter<K, V>,
    listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Key + Clone,
    V: Value,
{
    /// A capacity of `0` means unbounded. Each entry charges `1` unless a
    /// weighter is set.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            weighter: Arc::new(|_, _| 1),
            listener: None,
        }
    }

    pub fn with_weighter(mut self, weighter: impl Fn(&K, &V) -> usize + Send + Sync + 'static) -> Self {
        self.weighter = Arc::new(weighter);
        self
    }

    pub fn with_event_listener(mut self, listener: Arc<dyn EventListener<Key = K, Value = V>>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> Cache<K, V> {
        Cache {
            capacity: self.capacity,
            weighter: self.weighter,
            listener: self.listener,
            metrics: Metrics::default(),
            inner: Mutex::new(None),
        }
    }
}

/// A mutex-guarded [`Lru`], lazily constructed on the first insert so empty
/// caches do not allocate.
///
/// A plain mutex rather than a read-write lock: every lookup mutates the
/// recency order. Evicted values and listener calls happen after the lock is
/// released.
pub struct Cache<K, V>
where
    K: Key + Clone,
    V: Value,
{
    capacity: usize,
    weighter: Weighter<K, V>,
    listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    metrics: Metrics,

    inner: Mutex<Option<Lru<K, V>>>,
}

impl<K, V> Cache<K, V>
where
    K: Key + Clone,
    V: Value,
{
    pub fn builder(capacity: usize) -> CacheBuilder<K, V> {
        CacheBuilder::new(capacity)
    }

    /// Look up `key`, cloning the value out and promoting the entry.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = {
            let mut inner = self.inner.lock();
            inner.as_mut().and_then(|lru| lru.get(key).cloned())
        };
        match value {
            Some(value) => {
                self.metrics.hit.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.metrics.miss.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let evicted = {
            let mut inner = self.inner.lock();
            let lru = inner.get_or_insert_with(|| Lru::new(self.capacity, self.weighter.clone()));
            lru.insert(key, value)
        };
        self.metrics.insert.fetch_add(1, Ordering::Relaxed);
        if !evicted.is_empty() {
            tracing::trace!(count = evicted.len(), "evicted entries");
        }
        self.notify(evicted);
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut inner = self.inner.lock();
            inner.as_mut().and_then(|lru| lru.remove(key))
        };
        match removed {
            Some(entry) => {
                self.metrics.remove.fetch_add(1, Ordering::Relaxed);
                self.notify([entry]);
                true
            }
            None => false,
        }
    }

    pub fn usage(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, Lru::usage)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, Lru::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn notify(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let entries = entries.into_iter();
        if let Some(listener) = self.listener.as_ref() {
            for (key, value) in entries {
                listener.on_evict(&key, &value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex as PlainMutex;

    use super::*;

    fn cache(capacity: usize) -> Cache<String, String> {
        Cache::builder(capacity)
            .with_weighter(|k: &String, v: &String| k.len() + v.len())
            .build()
    }

    #[test]
    fn test_lazy_init() {
        let cache = cache(16);
        assert!(cache.get("a").is_none());
        assert!(!cache.remove("a"));
        assert_eq!(cache.usage(), 0);

        cache.insert("a".to_string(), "1".to_string());
        assert_eq!(cache.usage(), 2);
        assert_eq!(cache.get("a"), Some("1".to_string()));
    }

    #[test]
    fn test_metrics() {
        let cache = cache(16);
        cache.insert("a".to_string(), "1".to_string());

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.remove("a"));

        let metrics = cache.metrics();
        assert_eq!(metrics.hit.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.miss.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.insert.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.remove.load(Ordering::Relaxed), 1);
    }

    struct Recorder {
        events: PlainMutex<Vec<(String, String)>>,
    }

    impl EventListener for Recorder {
        type Key = String;
        type Value = String;

        fn on_evict(&self, key: &Self::Key, value: &Self::Value) {
            self.events.lock().push((key.clone(), value.clone()));
        }
    }

    #[test]
    fn test_event_listener() {
        let recorder = Arc::new(Recorder {
            events: PlainMutex::new(vec![]),
        });
        let cache = Cache::builder(16)
            .with_weighter(|k: &String, v: &String| k.len() + v.len())
            .with_event_listener(recorder.clone())
            .build();

        cache.insert("a".to_string(), "1234567".to_string());
        cache.insert("b".to_string(), "1234567".to_string());
        cache.insert("c".to_string(), "123".to_string());
        assert!(cache.remove("b"));

        assert_eq!(
            recorder.events.lock().clone(),
            vec![
                ("a".to_string(), "1234567".to_string()),
                ("b".to_string(), "1234567".to_string()),
            ]
        );
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache(1 << 16));
        let handles = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..256 {
                        let key = format!("k{}", i % 64);
                        cache.insert(key.clone(), format!("v{t}"));
                        let _ = cache.get(&key);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 64);
    }
}
