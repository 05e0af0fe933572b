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

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use hive_common::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use super::{EventStream, Registry, RegistryEvent};

const EVENT_BUFFER: usize = 256;

/// An in-process [`Registry`] for tests and single-process clusters.
///
/// Cancellation stands in for lease expiry: a registered key lives exactly
/// until its cancellation token fires.
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, String>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, key: &str, value: &str, cancel: CancellationToken) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_owned(), value.to_owned());
        let _ = self.events.send(RegistryEvent::Put(key.to_owned()));

        cancel.cancelled().await;

        self.entries.lock().remove(key);
        let _ = self.events.send(RegistryEvent::Delete(key.to_owned()));
        Ok(())
    }

    async fn snapshot(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock();
        Ok(entries
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn watch(&self, prefix: &str) -> Result<EventStream> {
        let prefix = prefix.to_owned();
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(move |event| {
            futures::future::ready(match event {
                Ok(event) if event.key().starts_with(&prefix) => Some(event),
                // A lagged receiver skips events; the agent repairs through
                // its next full sync.
                _ => None,
            })
        });
        Ok(stream.boxed())
    }
}
