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

use std::{borrow::Borrow, collections::BTreeMap, hash::Hash, sync::Arc};

use hashbrown::HashMap;
use hive_common::code::{Key, Value};

/// Charges the weight of an entry against the cache capacity.
pub type Weighter<K, V> = Arc<dyn Fn(&K, &V) -> usize + Send + Sync + 'static>;

struct LruEntry<V> {
    value: V,
    weight: usize,
    tick: u64,
}

/// A byte-accounted LRU set. Not thread-safe; see [`crate::Cache`] for the
/// concurrent wrapper.
///
/// Recency is tracked with a monotone tick per touch and an ordered index
/// from tick to key, so the LRU end is always the entry with the smallest
/// live tick.
///
/// Invariants:
/// - `usage()` equals the summed weight of live entries.
/// - after any [`Lru::insert`] with a non-zero capacity, `usage() <=
///   capacity()`. An entry whose own weight exceeds the capacity is admitted
///   and then immediately evicted.
pub struct Lru<K, V>
where
    K: Key + Clone,
    V: Value,
{
    capacity: usize,
    usage: usize,
    tick: u64,

    entries: HashMap<K, LruEntry<V>>,
    order: BTreeMap<u64, K>,

    weighter: Weighter<K, V>,
}

impl<K, V> Lru<K, V>
where
    K: Key + Clone,
    V: Value,
{
    /// A capacity of `0` means unbounded.
    pub fn new(capacity: usize, weighter: Weighter<K, V>) -> Self {
        Self {
            capacity,
            usage: 0,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            weighter,
        }
    }

    /// Look up `key`, promoting it to the MRU end on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let tick = self.next_tick();
        let (owned, old_tick) = {
            let (k, entry) = self.entries.get_key_value(key)?;
            (k.clone(), entry.tick)
        };
        self.order.remove(&old_tick);
        self.order.insert(tick, owned);

        let entry = self.entries.get_mut(key)?;
        entry.tick = tick;
        Some(&entry.value)
    }

    /// Insert or replace `key`, then reclaim space from the LRU end until the
    /// usage fits the capacity. The evicted entries are returned so callers
    /// can fire listeners or drop values outside their own locks.
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        let weight = (self.weighter)(&key, &value);
        let tick = self.next_tick();

        if let Some(entry) = self.entries.get_mut(&key) {
            self.usage = self.usage - entry.weight + weight;
            self.order.remove(&entry.tick);
            self.order.insert(tick, key);
            entry.value = value;
            entry.weight = weight;
            entry.tick = tick;
        } else {
            self.usage += weight;
            self.order.insert(tick, key.clone());
            self.entries.insert(
                key,
                LruEntry {
                    value,
                    weight,
                    tick,
                },
            );
        }

        self.evict()
    }

    /// Remove `key`. Returns the owned pair if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (key, entry) = self.entries.remove_entry(key)?;
        self.order.remove(&entry.tick);
        self.usage -= entry.weight;
        Some((key, entry.value))
    }

    fn evict(&mut self) -> Vec<(K, V)> {
        let mut evicted = vec![];
        while self.capacity > 0 && self.usage > self.capacity {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            let Some(entry) = self.entries.remove(&key) else {
                break;
            };
            self.usage -= entry.weight;
            evicted.push((key, entry.value));
        }
        evicted
    }

    /// The entry at the LRU end, least recently touched.
    pub fn peek_lru(&self) -> Option<(&K, &V)> {
        let (_, key) = self.order.first_key_value()?;
        let entry = self.entries.get(key)?;
        Some((key, &entry.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
