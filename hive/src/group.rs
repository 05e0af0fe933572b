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

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::{hash_map::Entry as HashMapEntry, HashMap};
use hive_common::{
    peers::PeerPicker,
    singleflight::SingleFlight,
    ByteView, Error, Result,
};
use hive_memory::{Cache, CacheBuilder, EventListener};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rand::Rng;

/// Hot-cache share: one eighth of the main budget, populated for roughly one
/// eighth of remote fetches.
const HOT_FRACTION: usize = 8;

/// Produces the bytes for a key when the cache misses and this peer owns it.
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// A name-to-group map, cheap to clone and safe for concurrent readers.
///
/// Groups are registered once and never removed for the lifetime of the map.
#[derive(Clone, Default)]
pub struct Groups {
    inner: Arc<RwLock<HashMap<String, Arc<Group>>>>,
}

impl Groups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.inner.read().get(name).cloned()
    }

    fn register(&self, group: Arc<Group>) -> Result<()> {
        let mut groups = self.inner.write();
        match groups.entry(group.name().to_owned()) {
            HashMapEntry::Occupied(_) => Err(Error::invalid_argument(format!(
                "group {:?} already registered",
                group.name()
            ))),
            HashMapEntry::Vacant(v) => {
                v.insert(group);
                Ok(())
            }
        }
    }
}

static GROUPS: Lazy<Groups> = Lazy::new(Groups::default);

/// The process-wide group map. [`GroupBuilder::build`] registers into it.
pub fn groups() -> Groups {
    GROUPS.clone()
}

/// Look up a group in the process-wide map.
pub fn group(name: &str) -> Option<Arc<Group>> {
    GROUPS.get(name)
}

pub struct GroupBuilder {
    name: String,
    capacity: usize,
    loader: Option<Arc<dyn Loader>>,
    picker: Option<Arc<dyn PeerPicker>>,
    hot_cache: bool,
    listener: Option<Arc<dyn EventListener<Key = String, Value = ByteView>>>,
}

impl GroupBuilder {
    /// `capacity` is the main-cache byte budget; `0` means unbounded.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            loader: None,
            picker: None,
            hot_cache: true,
            listener: None,
        }
    }

    pub fn with_loader(mut self, loader: impl Loader) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Route keys through `picker`; without one every key loads locally.
    pub fn with_picker(mut self, picker: Arc<dyn PeerPicker>) -> Self {
        self.picker = Some(picker);
        self
    }

    /// Skip the hot cache for remote-fetched entries.
    pub fn without_hot_cache(mut self) -> Self {
        self.hot_cache = false;
        self
    }

    pub fn with_event_listener(
        mut self,
        listener: Arc<dyn EventListener<Key = String, Value = ByteView>>,
    ) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Build the group and register it in the process-wide map.
    pub fn build(self) -> Result<Arc<Group>> {
        let groups = groups();
        self.build_in(&groups)
    }

    /// Build the group and register it in an explicit map.
    pub fn build_in(self, groups: &Groups) -> Result<Arc<Group>> {
        if self.name.is_empty() {
            return Err(Error::invalid_argument("group name must not be empty"));
        }
        let Some(loader) = self.loader else {
            return Err(Error::invalid_argument(format!(
                "group {:?} requires a loader",
                self.name
            )));
        };

        let weighter = |key: &String, value: &ByteView| key.len() + value.len();
        let mut main = CacheBuilder::new(self.capacity).with_weighter(weighter);
        if let Some(listener) = self.listener {
            main = main.with_event_listener(listener);
        }
        let hot = self.hot_cache.then(|| {
            CacheBuilder::new(self.capacity / HOT_FRACTION)
                .with_weighter(weighter)
                .build()
        });

        let group = Arc::new(Group {
            name: self.name,
            loader,
            main: main.build(),
            hot,
            flight: SingleFlight::new(),
            picker: self.picker,
        });
        groups.register(group.clone())?;
        Ok(group)
    }
}

/// A named cache space: loader, byte-budgeted main cache, optional hot cache
/// for remote-fetched entries, and a single-flight scope per key.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main: Cache<String, ByteView>,
    hot: Option<Cache<String, ByteView>>,
    flight: SingleFlight<Result<ByteView>>,
    picker: Option<Arc<dyn PeerPicker>>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("name", &self.name).finish()
    }
}

impl Group {
    pub fn builder(name: impl Into<String>, capacity: usize) -> GroupBuilder {
        GroupBuilder::new(name, capacity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes currently charged across the main and hot caches.
    pub fn usage(&self) -> usize {
        self.main.usage() + self.hot.as_ref().map_or(0, Cache::usage)
    }

    /// Get the value for `key`, serving from memory, the owning peer, or the
    /// loader, in that order.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::invalid_argument("key must not be empty"));
        }

        if let Some(view) = self.lookup(key) {
            tracing::debug!(group = %self.name, key, "cache hit");
            return Ok(view);
        }

        let (result, _shared) = self.flight.flight(key, || self.load(key)).await;
        result
    }

    /// Remove `key` on its owner, then drop any local copy.
    ///
    /// Returns whether the key was present on the owning peer.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(Error::invalid_argument("key must not be empty"));
        }

        if let Some(picked) = self.pick(key) {
            if !picked.is_self {
                let removed = picked.client.evict(&self.name, key).await?;
                // Local copies are stale at best once the owner dropped it.
                self.purge(key);
                return Ok(removed);
            }
        }
        Ok(self.purge(key))
    }

    fn lookup(&self, key: &str) -> Option<ByteView> {
        if let Some(view) = self.main.get(key) {
            return Some(view);
        }
        self.hot.as_ref().and_then(|hot| hot.get(key))
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        if let Some(picked) = self.pick(key) {
            if !picked.is_self {
                let view = picked.client.fetch(&self.name, key).await?;
                if let Some(hot) = self.hot.as_ref() {
                    if rand::thread_rng().gen_ratio(1, HOT_FRACTION as u32) {
                        hot.insert(key.to_owned(), view.clone());
                    }
                }
                return Ok(view);
            }
        }

        let bytes = self.loader.load(key).await.map_err(Error::upstream)?;
        let view = ByteView::from(bytes);
        self.main.insert(key.to_owned(), view.clone());
        Ok(view)
    }

    fn pick(&self, key: &str) -> Option<hive_common::peers::PickedPeer> {
        self.picker.as_ref().and_then(|picker| picker.pick_peer(key))
    }

    fn purge(&self, key: &str) -> bool {
        let main = self.main.remove(key);
        let hot = self.hot.as_ref().is_some_and(|hot| hot.remove(key));
        main || hot
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::future::join_all;
    use hive_common::peers::{PeerClient, PickedPeer};

    use super::*;

    struct MapLoader {
        scores: HashMap<String, String>,
        loads: AtomicUsize,
    }

    impl MapLoader {
        fn scores() -> Self {
            Self {
                scores: [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                loads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Loader for Arc<MapLoader> {
        async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.scores
                .get(key)
                .map(|score| score.as_bytes().to_vec())
                .ok_or_else(|| anyhow::anyhow!("{key} not exist"))
        }
    }

    struct FailingLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl Loader for Arc<FailingLoader> {
        async fn load(&self, _: &str) -> anyhow::Result<Vec<u8>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            anyhow::bail!("db down")
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_local_hit() {
        let loader = Arc::new(MapLoader::scores());
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .build_in(&Groups::new())
            .unwrap();

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        // Mutating a copy of the returned bytes must not reach the cache.
        let mut copy = group.get("Tom").await.unwrap().to_vec();
        copy[0] = b'9';
        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
    }

    struct SevenByteLoader;

    #[async_trait]
    impl Loader for SevenByteLoader {
        async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
            match key {
                "c" => Ok(b"123".to_vec()),
                _ => Ok(b"1234567".to_vec()),
            }
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_eviction_honors_byte_budget() {
        let group = Group::builder("tiny", 16)
            .with_loader(SevenByteLoader)
            .without_hot_cache()
            .build_in(&Groups::new())
            .unwrap();

        group.get("a").await.unwrap();
        group.get("b").await.unwrap();
        assert_eq!(group.usage(), 16);

        // "c" pushes the budget over; "a" is the LRU entry and goes.
        group.get("c").await.unwrap();
        assert_eq!(group.usage(), 12);
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_key_is_upstream_error() {
        let loader = Arc::new(MapLoader::scores());
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .build_in(&Groups::new())
            .unwrap();

        let err = group.get("unknown").await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)), "got {err:?}");
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_key_rejected() {
        let group = Group::builder("scores", 1024)
            .with_loader(Arc::new(MapLoader::scores()))
            .build_in(&Groups::new())
            .unwrap();

        assert!(matches!(
            group.get("").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            group.remove("").await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_loader_required() {
        let err = Group::builder("scores", 1024)
            .build_in(&Groups::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let groups = Groups::new();
        let first = Group::builder("scores", 1024)
            .with_loader(Arc::new(MapLoader::scores()))
            .build_in(&groups)
            .unwrap();

        let err = Group::builder("scores", 1024)
            .with_loader(Arc::new(MapLoader::scores()))
            .build_in(&groups)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        // The registered group is still the first one.
        assert!(Arc::ptr_eq(&first, &groups.get("scores").unwrap()));
    }

    #[test]
    fn test_global_registration() {
        let built = Group::builder("group-registry-smoke", 1024)
            .with_loader(Arc::new(MapLoader::scores()))
            .build()
            .unwrap();
        let found = group("group-registry-smoke").unwrap();
        assert!(Arc::ptr_eq(&built, &found));
        assert!(group("group-registry-missing").is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_misses_are_coalesced() {
        let loader = Arc::new(FailingLoader {
            loads: AtomicUsize::new(0),
        });
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .build_in(&Groups::new())
            .unwrap();

        let results = join_all((0..50).map(|_| group.get("Tom"))).await;

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        for result in results {
            let err = result.unwrap_err();
            assert!(matches!(&err, Error::Upstream(source) if source.to_string() == "db down"));
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_remove_local() {
        let loader = Arc::new(MapLoader::scores());
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .build_in(&Groups::new())
            .unwrap();

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert!(group.remove("Tom").await.unwrap());
        assert!(!group.remove("Tom").await.unwrap());

        // The next get goes back to the loader.
        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    struct StubPeer {
        fetches: AtomicUsize,
        evicts: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PeerClient for StubPeer {
        fn addr(&self) -> &str {
            "10.0.0.2:8001"
        }

        async fn fetch(&self, _: &str, _: &str) -> Result<ByteView> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Peer("10.0.0.2:8001: connection refused".to_string()));
            }
            Ok(ByteView::from("630"))
        }

        async fn evict(&self, _: &str, _: &str) -> Result<bool> {
            self.evicts.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct StubPicker {
        peer: Arc<StubPeer>,
        is_self: bool,
    }

    impl PeerPicker for StubPicker {
        fn pick_peer(&self, _: &str) -> Option<PickedPeer> {
            Some(PickedPeer {
                client: self.peer.clone(),
                is_self: self.is_self,
            })
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_remote_owner_is_fetched_not_loaded() {
        let loader = Arc::new(MapLoader::scores());
        let peer = Arc::new(StubPeer {
            fetches: AtomicUsize::new(0),
            evicts: AtomicUsize::new(0),
            fail: false,
        });
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .with_picker(Arc::new(StubPicker {
                peer: peer.clone(),
                is_self: false,
            }))
            .build_in(&Groups::new())
            .unwrap();

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");

        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        // The second get may have hit the hot cache; it never loads locally.
        let fetches = peer.fetches.load(Ordering::SeqCst);
        assert!((1..=2).contains(&fetches), "got {fetches} fetches");
    }

    #[test_log::test(tokio::test)]
    async fn test_peer_failure_does_not_fall_back() {
        let loader = Arc::new(MapLoader::scores());
        let peer = Arc::new(StubPeer {
            fetches: AtomicUsize::new(0),
            evicts: AtomicUsize::new(0),
            fail: true,
        });
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .with_picker(Arc::new(StubPicker {
                peer: peer.clone(),
                is_self: false,
            }))
            .build_in(&Groups::new())
            .unwrap();

        let err = group.get("Tom").await.unwrap_err();
        assert!(matches!(err, Error::Peer(_)), "got {err:?}");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_self_owner_loads_locally() {
        let loader = Arc::new(MapLoader::scores());
        let peer = Arc::new(StubPeer {
            fetches: AtomicUsize::new(0),
            evicts: AtomicUsize::new(0),
            fail: false,
        });
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .with_picker(Arc::new(StubPicker {
                peer: peer.clone(),
                is_self: true,
            }))
            .build_in(&Groups::new())
            .unwrap();

        assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(peer.fetches.load(Ordering::SeqCst), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_remove_forwards_then_purges() {
        let loader = Arc::new(MapLoader::scores());
        let peer = Arc::new(StubPeer {
            fetches: AtomicUsize::new(0),
            evicts: AtomicUsize::new(0),
            fail: false,
        });
        let group = Group::builder("scores", 1024)
            .with_loader(loader.clone())
            .with_picker(Arc::new(StubPicker {
                peer: peer.clone(),
                is_self: false,
            }))
            .build_in(&Groups::new())
            .unwrap();

        assert!(group.remove("Tom").await.unwrap());
        assert_eq!(peer.evicts.load(Ordering::SeqCst), 1);
        assert_eq!(group.usage(), 0);
    }
}
