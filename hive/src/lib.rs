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

//! hive is a distributed read-through cache cluster.
//!
//! Peers shard one keyspace by consistent hashing over the live peer set.
//! A [`Group`] is a named cache space with its own loader and byte budget:
//! keys this peer owns are served from memory or populated through the
//! loader, keys another peer owns are forwarded over the RPC link, and
//! concurrent duplicate loads are coalesced so a key is loaded at most once
//! per peer at a time.

pub mod group;
pub mod server;

pub mod prelude;

pub use group::{group, groups, Group, GroupBuilder, Groups, Loader};
pub use hive_common::{ByteView, Error, Result};
pub use server::Server;
