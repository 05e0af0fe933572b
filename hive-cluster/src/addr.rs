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

use hive_common::{Error, Result};

/// Validate a peer address of the form `host:port`.
pub fn validate_addr(addr: &str) -> Result<()> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(Error::invalid_argument(format!(
            "address {addr:?} must be of the form host:port"
        )));
    };
    if host.is_empty() {
        return Err(Error::invalid_argument(format!(
            "address {addr:?} has an empty host"
        )));
    }
    match port.parse::<u16>() {
        Ok(port) if port != 0 => Ok(()),
        _ => Err(Error::invalid_argument(format!(
            "address {addr:?} must carry a port in 1..=65535"
        ))),
    }
}
