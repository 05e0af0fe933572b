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

//! Wire records of the peer RPC link.
//!
//! One bincode record per length-delimited frame, strictly request/response
//! on each connection. Values travel as opaque byte sequences.

use bytes::Bytes;
use hive_common::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Get { group: String, key: String },
    Delete { group: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Value(Vec<u8>),
    Deleted(bool),
    Error(String),
}

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn transport(stream: TcpStream) -> Transport {
    Framed::new(
        stream,
        LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LEN)
            .new_codec(),
    )
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    bincode::serialize(message)
        .map(Bytes::from)
        .map_err(|e| Error::Peer(format!("encode: {e}")))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    bincode::deserialize(frame).map_err(|e| Error::Peer(format!("decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = Request::Get {
            group: "scores".to_string(),
            key: "Tom".to_string(),
        };
        let frame = encode(&request).unwrap();
        assert_eq!(decode::<Request>(&frame).unwrap(), request);
    }

    #[test]
    fn test_response_shapes() {
        for response in [
            Response::Value(b"630".to_vec()),
            Response::Deleted(true),
            Response::Error("group not registered: scores".to_string()),
        ] {
            let frame = encode(&response).unwrap();
            assert_eq!(decode::<Response>(&frame).unwrap(), response);
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode::<Request>(&[0xff; 3]).is_err());
    }
}
