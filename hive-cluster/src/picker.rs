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

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use hashbrown::{HashMap, HashSet};
use hive_common::{
    peers::{PeerClient, PeerPicker, PickedPeer},
    Result,
};
use itertools::Itertools;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::{
    addr::validate_addr,
    client::RemoteClient,
    registry::{Registry, RegistryEvent, SNAPSHOT_TIMEOUT},
    ring::{HashRing, RingConfig},
};

const WATCH_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PickerConfig {
    /// Registry keys are `"{service}/{addr}"`; the watch covers the
    /// `"{service}/"` prefix.
    pub service: String,
    pub ring: RingConfig,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            service: "hive".to_string(),
            ring: RingConfig::default(),
        }
    }
}

struct PickerState {
    ring: HashRing,
    clients: HashMap<String, Arc<RemoteClient>>,
}

/// Maps keys to owner peers and keeps one RPC client per live peer.
///
/// The picker seeds itself with its own address, then tracks the live peer
/// set through the registry: a self-registration task holds the lease, and a
/// discovery task replays membership changes into the ring and client map.
/// The state lock is written only by the discovery task; [`PeerPicker`]
/// readers never block it for long.
pub struct RingPicker {
    self_addr: String,
    config: PickerConfig,
    state: RwLock<PickerState>,
    cancel: CancellationToken,
}

impl RingPicker {
    pub fn new(self_addr: impl Into<String>, config: PickerConfig) -> Result<Arc<Self>> {
        let self_addr = self_addr.into();
        validate_addr(&self_addr)?;

        let mut ring = HashRing::with_config(config.ring.clone());
        ring.add(&self_addr);
        let mut clients = HashMap::new();
        clients.insert(
            self_addr.clone(),
            Arc::new(RemoteClient::new(self_addr.clone())),
        );

        Ok(Arc::new(Self {
            self_addr,
            config,
            state: RwLock::new(PickerState { ring, clients }),
            cancel: CancellationToken::new(),
        }))
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn service(&self) -> &str {
        &self.config.service
    }

    /// The live peer set, self included, in address order.
    pub fn peers(&self) -> Vec<String> {
        self.state.read().clients.keys().cloned().sorted().collect()
    }

    /// Spawn the membership agent: self-registration under a lease and the
    /// discovery loop. Both stop on [`RingPicker::shutdown`].
    pub fn start(self: &Arc<Self>, registry: Arc<dyn Registry>) {
        let prefix = format!("{}/", self.config.service);

        {
            let registry = registry.clone();
            let key = format!("{prefix}{}", self.self_addr);
            let addr = self.self_addr.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                // On registration failure the picker keeps serving with its
                // last-known membership.
                if let Err(e) = registry.register(&key, &addr, cancel).await {
                    tracing::warn!(error = %e, "self-registration ended");
                }
            });
        }

        {
            let picker = self.clone();
            tokio::spawn(async move { picker.discover(registry, prefix).await });
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn discover(self: Arc<Self>, registry: Arc<dyn Registry>, prefix: String) {
        while !self.cancel.is_cancelled() {
            // Watch before seeding: events raced by the snapshot replay onto
            // an idempotent reconcile instead of getting lost.
            let stream = match registry.watch(&prefix).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "registry watch failed");
                    self.backoff().await;
                    continue;
                }
            };

            match tokio::time::timeout(SNAPSHOT_TIMEOUT, registry.snapshot(&prefix)).await {
                Ok(Ok(keys)) => self.reconcile(&prefix, keys),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "registry snapshot failed");
                    self.backoff().await;
                    continue;
                }
                Err(_) => {
                    tracing::warn!("registry snapshot timed out");
                    self.backoff().await;
                    continue;
                }
            }

            let mut stream = stream;
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    event = stream.next() => match event {
                        Some(event) => self.apply(&prefix, event),
                        None => break,
                    },
                }
            }

            tracing::warn!("registry watch ended, resyncing");
            self.backoff().await;
        }
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(WATCH_BACKOFF) => {}
        }
    }

    /// Fold a full snapshot into the live set. Unknown addresses join, known
    /// addresses missing from the snapshot leave; self always stays.
    fn reconcile(&self, prefix: &str, keys: Vec<String>) {
        let live: HashSet<&str> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(prefix))
            .filter(|addr| !addr.is_empty())
            .collect();

        for addr in &live {
            if *addr != self.self_addr {
                self.set_peer(addr);
            }
        }

        let stale: Vec<String> = {
            let state = self.state.read();
            state
                .clients
                .keys()
                .filter(|addr| *addr != &self.self_addr && !live.contains(addr.as_str()))
                .cloned()
                .collect()
        };
        for addr in stale {
            self.remove_peer(&addr);
        }
    }

    fn apply(&self, prefix: &str, event: RegistryEvent) {
        let Some(addr) = event.key().strip_prefix(prefix) else {
            return;
        };
        if addr.is_empty() || addr == self.self_addr {
            return;
        }
        match &event {
            RegistryEvent::Put(_) => self.set_peer(addr),
            RegistryEvent::Delete(_) => self.remove_peer(addr),
        }
    }

    fn set_peer(&self, addr: &str) {
        let mut state = self.state.write();
        if state.clients.contains_key(addr) {
            return;
        }
        state.ring.add(addr);
        state
            .clients
            .insert(addr.to_owned(), Arc::new(RemoteClient::new(addr)));
        drop(state);
        tracing::info!(addr, "peer joined");
    }

    fn remove_peer(&self, addr: &str) {
        let mut state = self.state.write();
        if state.clients.remove(addr).is_none() {
            return;
        }
        state.ring.remove(addr);
        drop(state);
        tracing::info!(addr, "peer left");
    }
}

impl PeerPicker for RingPicker {
    fn pick_peer(&self, key: &str) -> Option<PickedPeer> {
        let state = self.state.read();
        let addr = state.ring.get(key)?;
        let client = state.clients.get(addr)?.clone() as Arc<dyn PeerClient>;
        let is_self = addr == self.self_addr;
        Some(PickedPeer { client, is_self })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::registry::mem::MemoryRegistry;

    use super::*;

    const SELF_ADDR: &str = "127.0.0.1:8001";

    async fn eventually(deadline: Duration, mut check: impl FnMut() -> bool) {
        let start = tokio::time::Instant::now();
        while !check() {
            assert!(start.elapsed() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_rejects_malformed_self_addr() {
        assert!(RingPicker::new("localhost", PickerConfig::default()).is_err());
        assert!(RingPicker::new("", PickerConfig::default()).is_err());
    }

    #[test]
    fn test_seeds_itself() {
        let picker = RingPicker::new(SELF_ADDR, PickerConfig::default()).unwrap();
        assert_eq!(picker.peers(), vec![SELF_ADDR.to_string()]);

        let picked = picker.pick_peer("Tom").unwrap();
        assert!(picked.is_self);
        assert_eq!(picked.client.addr(), SELF_ADDR);
    }

    #[test]
    fn test_set_and_remove_keep_ring_and_clients_aligned() {
        let picker = RingPicker::new(SELF_ADDR, PickerConfig::default()).unwrap();
        picker.set_peer("10.0.0.2:8001");
        picker.set_peer("10.0.0.3:8001");

        assert_eq!(picker.peers().len(), 3);
        {
            let state = picker.state.read();
            for addr in picker.peers() {
                assert!(state.ring.contains(&addr));
                assert!(state.clients.contains_key(addr.as_str()));
            }
        }

        picker.remove_peer("10.0.0.2:8001");
        let state = picker.state.read();
        assert!(!state.ring.contains("10.0.0.2:8001"));
        assert!(!state.clients.contains_key("10.0.0.2:8001"));
    }

    #[test]
    fn test_pick_spreads_over_peers() {
        let picker = RingPicker::new(SELF_ADDR, PickerConfig::default()).unwrap();
        picker.set_peer("10.0.0.2:8001");

        let mut self_owned = 0;
        let mut remote_owned = 0;
        for i in 0..1_000 {
            let picked = picker.pick_peer(&format!("key-{i}")).unwrap();
            if picked.is_self {
                self_owned += 1;
            } else {
                remote_owned += 1;
            }
        }
        assert!(self_owned > 0);
        assert!(remote_owned > 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_discovers_and_forgets_peers() {
        let registry = Arc::new(MemoryRegistry::new());
        let picker = RingPicker::new(SELF_ADDR, PickerConfig::default()).unwrap();
        picker.start(registry.clone());

        let peer_cancel = CancellationToken::new();
        tokio::spawn({
            let registry = registry.clone();
            let cancel = peer_cancel.clone();
            async move {
                registry
                    .register("hive/10.0.0.9:8001", "10.0.0.9:8001", cancel)
                    .await
            }
        });

        eventually(Duration::from_secs(5), || picker.peers().len() == 2).await;
        assert!(picker.peers().contains(&"10.0.0.9:8001".to_string()));

        peer_cancel.cancel();
        eventually(Duration::from_secs(5), || picker.peers().len() == 1).await;

        picker.shutdown();
        eventually(Duration::from_secs(5), || registry.is_empty()).await;
    }
}
