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

pub use hive_cluster::{
    picker::{PickerConfig, RingPicker},
    registry::{mem::MemoryRegistry, Registry, RegistryConfig, RegistryEvent},
    ring::{HashRing, RingConfig},
};
#[cfg(feature = "etcd")]
pub use hive_cluster::registry::etcd::EtcdRegistry;
pub use hive_common::{
    peers::{PeerClient, PeerPicker, PickedPeer},
    singleflight::SingleFlight,
    ByteView, Error, Result,
};
pub use hive_memory::{Cache, CacheBuilder, EventListener};

pub use crate::{
    group::{group, groups, Group, GroupBuilder, Groups, Loader},
    server::Server,
};
