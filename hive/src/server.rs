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

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use hive_cluster::{
    addr::validate_addr,
    proto::{self, Request, Response},
};
use hive_common::{Error, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::group::Groups;

/// Serves the peer RPC surface of this process: `Get` and `Delete` against
/// the groups of one [`Groups`] map.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(addr: &str) -> Result<Self> {
        validate_addr(addr)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::invalid_argument(format!("bind {addr}: {e}")))?;
        Ok(Self { listener })
    }

    /// Serve on an already-bound listener, e.g. one bound to an ephemeral
    /// port.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// The bound address, with the concrete port when bound to port `0`.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| Error::invalid_argument(format!("local addr: {e}")))
    }

    /// Accept connections until `shutdown` fires, one task per connection.
    pub async fn serve(self, groups: Groups, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let groups = groups.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle(stream, groups, shutdown).await {
                                    tracing::debug!(error = %e, %peer, "connection ended");
                                }
                            });
                        }
                        Err(e) => tracing::warn!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }
}

async fn handle(stream: TcpStream, groups: Groups, shutdown: CancellationToken) -> Result<()> {
    let mut link = proto::transport(stream);
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = link.next() => match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(Error::Peer(format!("recv: {e}"))),
                None => return Ok(()),
            },
        };

        let request = proto::decode::<Request>(&frame)?;
        let response = dispatch(&groups, request).await;
        link.send(proto::encode(&response)?)
            .await
            .map_err(|e| Error::Peer(format!("send: {e}")))?;
    }
}

/// Errors cross the wire as explicit error records, never as empty values.
async fn dispatch(groups: &Groups, request: Request) -> Response {
    match request {
        Request::Get { group, key } => match groups.get(&group) {
            None => Response::Error(Error::NotFound(group).to_string()),
            Some(group) => match group.get(&key).await {
                Ok(view) => Response::Value(view.to_vec()),
                Err(e) => Response::Error(e.to_string()),
            },
        },
        Request::Delete { group, key } => match groups.get(&group) {
            None => Response::Error(Error::NotFound(group).to_string()),
            Some(group) => match group.remove(&key).await {
                Ok(found) => Response::Deleted(found),
                Err(e) => Response::Error(e.to_string()),
            },
        },
    }
}
