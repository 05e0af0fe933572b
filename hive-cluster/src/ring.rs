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

use hashbrown::HashMap;

/// Hash function over raw bytes, 32-bit output.
pub type HashFn = fn(&[u8]) -> u32;

pub const DEFAULT_REPLICAS: usize = 50;

#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Virtual nodes per address. More replicas smooth the key distribution
    /// at the cost of a larger position table.
    pub replicas: usize,
    pub hash: HashFn,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
            hash: crc32fast::hash,
        }
    }
}

/// A consistent-hash ring mapping keys to peer addresses.
///
/// Every address contributes `replicas` positions, hashed from the replica
/// index concatenated with the address. A key is owned by the address of the
/// first position at or after the key's hash, sweeping circularly. Removing
/// an address only reroutes the keys that mapped to its positions; re-adding
/// the same address reproduces the same positions.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,

    /// Sorted hash positions of all virtual nodes.
    positions: Vec<u32>,
    /// Position to owning address. On a position collision the later-added
    /// address wins the slot.
    owners: HashMap<u32, String>,
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl HashRing {
    pub fn new() -> Self {
        Self::with_config(RingConfig::default())
    }

    pub fn with_config(config: RingConfig) -> Self {
        Self {
            replicas: config.replicas,
            hash: config.hash,
            positions: vec![],
            owners: HashMap::new(),
        }
    }

    /// Add `addr` to the ring. Callers must not re-add a live address: the
    /// positions would be duplicated, not refreshed.
    pub fn add(&mut self, addr: &str) {
        for i in 0..self.replicas {
            let position = (self.hash)(format!("{i}{addr}").as_bytes());
            self.positions.push(position);
            self.owners.insert(position, addr.to_string());
        }
        self.positions.sort_unstable();
    }

    /// Drop every position owned by `addr`. Remaining positions stay sorted.
    pub fn remove(&mut self, addr: &str) {
        let owners = &self.owners;
        self.positions
            .retain(|position| owners.get(position).is_some_and(|owner| owner != addr));
        self.owners.retain(|_, owner| owner != addr);
    }

    /// The address owning `key`, or `None` on an empty ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let index = self.positions.partition_point(|&position| position < hash);
        let position = self.positions[index % self.positions.len()];
        self.owners.get(&position).map(String::as_str)
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.owners.values().any(|owner| owner == addr)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of virtual-node positions, not addresses.
    pub fn len(&self) -> usize {
        self.positions.len()
    }
}
