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

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hive_common::{peers::PeerClient, ByteView, Error, Result};
use tokio::net::TcpStream;

use crate::proto::{self, Request, Response, Transport};

pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// An RPC handle bound to one peer address.
///
/// The connection is established lazily on the first call and kept for later
/// ones; requests on it are serialized. Any transport failure or missed
/// deadline tears the link down so the next call redials, and surfaces as
/// [`Error::Peer`] — owners are never silently substituted by a local load.
pub struct RemoteClient {
    addr: String,
    timeout: Duration,
    conn: tokio::sync::Mutex<Option<Transport>>,
}

impl RemoteClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, RPC_TIMEOUT)
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let mut conn = self.conn.lock().await;
        match tokio::time::timeout(self.timeout, Self::roundtrip(&self.addr, &mut conn, &request))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                *conn = None;
                Err(Error::Peer(format!("{}: deadline exceeded", self.addr)))
            }
        }
    }

    /// Take the link out of the slot for the duration of the exchange; it is
    /// only put back once the response arrived, so every failure path leaves
    /// the slot empty and the next call redials.
    async fn roundtrip(
        addr: &str,
        conn: &mut Option<Transport>,
        request: &Request,
    ) -> Result<Response> {
        let mut link = match conn.take() {
            Some(link) => link,
            None => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| Error::Peer(format!("{addr}: connect: {e}")))?;
                proto::transport(stream)
            }
        };

        link.send(proto::encode(request)?)
            .await
            .map_err(|e| Error::Peer(format!("{addr}: send: {e}")))?;

        let response = match link.next().await {
            Some(Ok(frame)) => proto::decode::<Response>(&frame)?,
            Some(Err(e)) => return Err(Error::Peer(format!("{addr}: recv: {e}"))),
            None => return Err(Error::Peer(format!("{addr}: connection closed"))),
        };

        *conn = Some(link);
        Ok(response)
    }
}

#[async_trait]
impl PeerClient for RemoteClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch(&self, group: &str, key: &str) -> Result<ByteView> {
        let request = Request::Get {
            group: group.to_owned(),
            key: key.to_owned(),
        };
        match self.call(request).await? {
            Response::Value(bytes) => Ok(ByteView::from(bytes)),
            Response::Error(message) => Err(Error::Peer(format!("{}: {message}", self.addr))),
            other => Err(Error::Peer(format!(
                "{}: unexpected response: {other:?}",
                self.addr
            ))),
        }
    }

    async fn evict(&self, group: &str, key: &str) -> Result<bool> {
        let request = Request::Delete {
            group: group.to_owned(),
            key: key.to_owned(),
        };
        match self.call(request).await? {
            Response::Deleted(found) => Ok(found),
            Response::Error(message) => Err(Error::Peer(format!("{}: {message}", self.addr))),
            other => Err(Error::Peer(format!(
                "{}: unexpected response: {other:?}",
                self.addr
            ))),
        }
    }
}
