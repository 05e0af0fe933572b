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

//! Service discovery over a watchable ordered key-value store.
//!
//! Peers register themselves under `"{service}/{addr}"` with a lease that
//! outlives them by at most [`LEASE_TTL`], and discover each other by a
//! prefix snapshot plus a prefix watch. The [`Registry`] trait is the seam:
//! the `etcd` feature binds it to etcd, and [`mem::MemoryRegistry`] drives
//! single-process clusters and tests.

#[cfg(feature = "etcd")]
pub mod etcd;
pub mod mem;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use hive_common::Result;
use tokio_util::sync::CancellationToken;

/// How long a registered key survives its peer.
pub const LEASE_TTL: Duration = Duration::from_secs(5);

/// Deadline for full-sync snapshot reads.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(3);

/// A change under a watched prefix. Carries the full registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Put(String),
    Delete(String),
}

impl RegistryEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Put(key) | Self::Delete(key) => key,
        }
    }
}

pub type EventStream = BoxStream<'static, RegistryEvent>;

/// A watchable ordered key-value store.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Register `key` with `value` under a lease and keep it alive until
    /// `cancel` fires, then deregister. Returns early on lease loss.
    async fn register(&self, key: &str, value: &str, cancel: CancellationToken) -> Result<()>;

    /// The keys currently present under `prefix`.
    async fn snapshot(&self, prefix: &str) -> Result<Vec<String>>;

    /// Open a stream of changes under `prefix`, starting from now. To avoid
    /// losing events, consumers open the watch first and reconcile a
    /// snapshot afterwards; duplicated puts must therefore be idempotent.
    async fn watch(&self, prefix: &str) -> Result<EventStream>;
}

/// Connection surface of a remote registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            dial_timeout: Duration::from_secs(3),
        }
    }
}
