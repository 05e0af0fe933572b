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

/// Error kinds of the cache cluster.
///
/// The enum is `Clone` so a single-flight leader can hand the identical error
/// to every coalesced waiter; opaque loader errors are shared behind an `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed input: empty key, bad address, missing loader.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The named group is not registered on this peer.
    #[error("group not registered: {0}")]
    NotFound(String),
    /// The loader failed; its error is forwarded verbatim.
    #[error("upstream: {0}")]
    Upstream(Arc<anyhow::Error>),
    /// A remote peer call failed. Never falls back to a local load.
    #[error("peer: {0}")]
    Peer(String),
    /// Registry interaction failed; membership keeps its last-known state.
    #[error("registry: {0}")]
    Registry(String),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn upstream(source: anyhow::Error) -> Self {
        Self::Upstream(Arc::new(source))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
