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

use crate::{ByteView, Result};

/// A handle to one peer's RPC surface.
#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
    /// The `host:port` address this client is bound to.
    fn addr(&self) -> &str;

    /// Fetch the value for `key` in `group` from the peer.
    async fn fetch(&self, group: &str, key: &str) -> Result<ByteView>;

    /// Ask the peer to drop `key` from `group`. Returns whether the key was
    /// present on the peer.
    async fn evict(&self, group: &str, key: &str) -> Result<bool>;
}

/// Selects the owner peer for a key.
pub trait PeerPicker: Send + Sync + 'static {
    /// Returns the owner of `key`, or `None` when no peer is known.
    fn pick_peer(&self, key: &str) -> Option<PickedPeer>;
}

/// The owner selected for a key.
///
/// When `is_self` is set the caller is the owner and must load locally; the
/// client handle is never dialed in that case.
#[derive(Clone)]
pub struct PickedPeer {
    pub client: Arc<dyn PeerClient>,
    pub is_self: bool,
}
