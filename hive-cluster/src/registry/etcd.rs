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

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, EventType, GetOptions, PutOptions, WatchOptions};
use futures::StreamExt;
use hive_common::{Error, Result};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::{EventStream, Registry, RegistryConfig, RegistryEvent, LEASE_TTL};

const WATCH_BUFFER: usize = 64;

fn registry_err(e: etcd_client::Error) -> Error {
    Error::Registry(e.to_string())
}

/// A [`Registry`] backed by etcd.
pub struct EtcdRegistry {
    client: Client,
}

impl EtcdRegistry {
    pub async fn connect(config: RegistryConfig) -> Result<Self> {
        let options = ConnectOptions::new().with_connect_timeout(config.dial_timeout);
        let client = Client::connect(config.endpoints.clone(), Some(options))
            .await
            .map_err(registry_err)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Registry for EtcdRegistry {
    async fn register(&self, key: &str, value: &str, cancel: CancellationToken) -> Result<()> {
        let mut client = self.client.clone();

        let lease = client
            .lease_grant(LEASE_TTL.as_secs() as i64, None)
            .await
            .map_err(registry_err)?;
        let lease_id = lease.id();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease_id)))
            .await
            .map_err(registry_err)?;

        let (mut keeper, mut responses) =
            client.lease_keep_alive(lease_id).await.map_err(registry_err)?;
        let mut heartbeat = tokio::time::interval(LEASE_TTL / 3);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = heartbeat.tick() => {
                    keeper.keep_alive().await.map_err(registry_err)?;
                    match responses.message().await.map_err(registry_err)? {
                        Some(response) if response.ttl() > 0 => {}
                        _ => return Err(Error::Registry(format!("lease {lease_id} expired"))),
                    }
                }
            }
        }

        client.lease_revoke(lease_id).await.map_err(registry_err)?;
        Ok(())
    }

    async fn snapshot(&self, prefix: &str) -> Result<Vec<String>> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(registry_err)?;

        let mut keys = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            keys.push(kv.key_str().map_err(registry_err)?.to_owned());
        }
        Ok(keys)
    }

    async fn watch(&self, prefix: &str) -> Result<EventStream> {
        let mut client = self.client.clone();
        let (watcher, mut responses) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(registry_err)?;

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        tokio::spawn(async move {
            // The watcher handle must outlive the stream or etcd cancels it.
            let _watcher = watcher;
            while let Ok(Some(response)) = responses.message().await {
                for event in response.events() {
                    let Some(kv) = event.kv() else {
                        continue;
                    };
                    let Ok(key) = kv.key_str() else {
                        continue;
                    };
                    let event = match event.event_type() {
                        EventType::Put => RegistryEvent::Put(key.to_owned()),
                        EventType::Delete => RegistryEvent::Delete(key.to_owned()),
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(ReceiverStream::new(rx).boxed())
    }
}
