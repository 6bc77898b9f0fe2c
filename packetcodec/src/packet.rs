//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Opaque tagged packets

use bytes::Bytes;
use std::fmt;

use crate::FRAME_HEADER_LEN;

/// Application-defined packet discriminator.
///
/// The transport never interprets tags; a packet factory above it does.
pub type PacketTag = u16;

/// An opaque, length-known unit of application data.
///
/// Cloning a packet is cheap: the payload is reference counted, which lets the
/// same packet be broadcast to many connections without copying.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    tag: PacketTag,
    payload: Bytes,
}

impl Packet {
    /// Create a packet from a tag and payload bytes
    pub fn new(tag: PacketTag, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Create a packet that carries only a tag
    pub fn empty(tag: PacketTag) -> Self {
        Self {
            tag,
            payload: Bytes::new(),
        }
    }

    /// Get the packet tag
    pub fn tag(&self) -> PacketTag {
        self.tag
    }

    /// Get the payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the packet, returning its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of bytes this packet occupies on the wire, header included
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("tag", &self.tag)
            .field("len", &self.payload.len())
            .finish()
    }
}
