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

use std::fmt::Debug;

use bytes::Bytes;

/// An immutable snapshot of cached bytes.
///
/// Cloning a [`ByteView`] is cheap and shares the underlying buffer. No method
/// hands out mutable access, so a view read from a cache can never alter what
/// later readers observe. Use [`ByteView::to_vec`] for an owned copy.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView(Bytes);

impl ByteView {
    /// Length of the viewed bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Copy the viewed bytes into an owned vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Debug for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteView").field("len", &self.len()).finish()
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_immutable() {
        let view = ByteView::from("630");

        let mut copy = view.to_vec();
        copy[0] = b'9';

        assert_eq!(view.as_slice(), b"630");
        assert_eq!(view.clone().as_slice(), b"630");
    }

    #[test]
    fn test_clone_shares_buffer() {
        let view = ByteView::from(vec![1u8, 2, 3]);
        let clone = view.clone();

        assert_eq!(view, clone);
        assert_eq!(clone.len(), 3);
        assert!(!clone.is_empty());
    }

    #[test]
    fn test_empty() {
        let view = ByteView::default();
        assert_eq!(view.len(), 0);
        assert!(view.is_empty());
    }
}
