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

use std::hash::Hash;

/// Cache key bound.
pub trait Key: Send + Sync + 'static + Hash + Eq {}
impl<T: Send + Sync + 'static + Hash + Eq> Key for T {}

/// Cache value bound.
pub trait Value: Send + Sync + 'static + Clone {}
impl<T: Send + Sync + 'static + Clone> Value for T {}
