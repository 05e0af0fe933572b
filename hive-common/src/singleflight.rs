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

use std::future::Future;

use hashbrown::hash_map::{Entry as HashMapEntry, HashMap};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Coalesces concurrent duplicate loads.
///
/// For any burst of concurrent [`SingleFlight::flight`] calls with the same
/// key, the future is created and run at most once; every caller receives a
/// clone of the single result. Results are not cached past completion: a call
/// arriving after the flight lands runs its own flight.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone,
{
    /// Run the future built by `make` under the coalescing scope of `key`.
    ///
    /// Returns the result and whether it was shared from another caller's
    /// flight (`false` for the leader that actually ran the future).
    ///
    /// The map lock is never held across the future. A leader dropped
    /// mid-flight releases its entry, and parked waiters re-enter the flight,
    /// so at most one future is in flight for a key at every instant.
    pub async fn flight<F, Fut>(&self, key: &str, make: F) -> (T, bool)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let waiter = {
                let mut calls = self.calls.lock();
                match calls.entry(key.to_owned()) {
                    HashMapEntry::Occupied(mut o) => {
                        let (tx, rx) = oneshot::channel();
                        o.get_mut().push(tx);
                        Some(rx)
                    }
                    HashMapEntry::Vacant(v) => {
                        v.insert(vec![]);
                        None
                    }
                }
            };

            match waiter {
                Some(rx) => {
                    if let Ok(value) = rx.await {
                        return (value, true);
                    }
                    // The leader was dropped before completing; race for the
                    // vacant slot and run the flight ourselves.
                }
                None => {
                    let guard = FlightGuard {
                        calls: &self.calls,
                        key,
                        armed: true,
                    };
                    let value = make().await;
                    for tx in guard.finish() {
                        let _ = tx.send(value.clone());
                    }
                    return (value, false);
                }
            }
        }
    }
}

/// Clears the in-flight entry even if the leader future is dropped, waking
/// waiters so they can retry instead of parking forever.
struct FlightGuard<'a, T> {
    calls: &'a Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>,
    key: &'a str,
    armed: bool,
}

impl<T> FlightGuard<'_, T> {
    fn finish(mut self) -> Vec<oneshot::Sender<T>> {
        self.armed = false;
        self.calls.lock().remove(self.key).unwrap_or_default()
    }
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.calls.lock().remove(self.key);
        }
    }
}
