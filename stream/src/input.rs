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

//! Bounded receive buffer

use bytes::BytesMut;
use std::io;
use tickmux_packetcodec::{Decoder, DEFAULT_MAX_PAYLOAD, FRAME_HEADER_LEN, KeyCipher, Packet, PacketCodec};
use tracing::trace;

use crate::{Socket, StreamError, StreamResult};

/// Starting capacity of an input buffer (8 KiB)
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 8 * 1024;

/// Hard limit of an input buffer: one maximum-size frame
pub const DEFAULT_INPUT_BUFFER_MAX: usize = DEFAULT_MAX_PAYLOAD + FRAME_HEADER_LEN;

const READ_CHUNK: usize = 4096;

/// Result of a single [`InputStream::fill`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Bytes read from the socket during this call
    pub bytes: usize,
    /// The socket reported would-block, so it has nothing more right now.
    ///
    /// `false` means reading stopped because the buffer reached its limit and
    /// the socket may still hold data.
    pub drained: bool,
}

/// Buffered, keyed inbound byte stream.
///
/// Bytes are buffered as received and unkeyed only as far as the frame being
/// decoded reaches, so a key installed after one packet is decoded applies to
/// everything behind it, even bytes that arrived in the same read.
#[derive(Debug)]
pub struct InputStream {
    buffer: BytesMut,
    /// Leading bytes of `buffer` already unkeyed
    plain: usize,
    initial_capacity: usize,
    max_capacity: usize,
    cipher: KeyCipher,
    codec: PacketCodec,
    bytes_received: u64,
}

impl InputStream {
    /// Create a stream with the default sizes
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INPUT_BUFFER_SIZE, DEFAULT_INPUT_BUFFER_MAX)
    }

    /// Create a stream with a starting capacity and hard limit
    pub fn with_capacity(initial_capacity: usize, max_capacity: usize) -> Self {
        let initial_capacity = initial_capacity.min(max_capacity);
        Self {
            buffer: BytesMut::with_capacity(initial_capacity),
            plain: 0,
            initial_capacity,
            max_capacity,
            cipher: KeyCipher::new(),
            codec: PacketCodec::new(),
            bytes_received: 0,
        }
    }

    /// Use `codec` to decode frames (sets the payload limit)
    pub fn with_codec(mut self, codec: PacketCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Read from the socket until it would block or the buffer is full.
    ///
    /// An orderly shutdown by the peer is reported as [`StreamError::Closed`].
    pub fn fill<S: Socket + ?Sized>(&mut self, socket: &mut S) -> StreamResult<FillOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut bytes = 0;
        loop {
            let room = self.max_capacity.saturating_sub(self.buffer.len());
            if room == 0 {
                trace!(len = self.buffer.len(), "Input buffer full");
                return Ok(FillOutcome {
                    bytes,
                    drained: false,
                });
            }
            let want = room.min(READ_CHUNK);
            match socket.receive(&mut chunk[..want]) {
                Ok(0) => return Err(StreamError::Closed),
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    self.bytes_received += n as u64;
                    bytes += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FillOutcome {
                        bytes,
                        drained: true,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode the next complete packet, if one is buffered
    ///
    /// Only the bytes of that packet are unkeyed.
    pub fn next_packet(&mut self) -> StreamResult<Option<Packet>> {
        if !self.unkey_through(FRAME_HEADER_LEN) {
            return Ok(None);
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&self.buffer[2..FRAME_HEADER_LEN]);
        let payload = u32::from_le_bytes(len) as usize;
        // An oversized header goes straight to the decoder, which rejects it
        if payload <= self.codec.max_payload() && !self.unkey_through(FRAME_HEADER_LEN + payload) {
            return Ok(None);
        }

        let before = self.buffer.len();
        let decoded = self.codec.decode(&mut self.buffer);
        self.plain -= before - self.buffer.len();
        Ok(decoded?)
    }

    /// Unkey the buffer up to `end`; returns whether that many bytes are buffered
    fn unkey_through(&mut self, end: usize) -> bool {
        let available = end.min(self.buffer.len());
        if available > self.plain {
            self.cipher.apply(&mut self.buffer[self.plain..available]);
            self.plain = available;
        }
        self.buffer.len() >= end
    }

    /// Install or replace the key for bytes not yet decoded
    pub fn set_key(&mut self, key: &[u8]) -> StreamResult<()> {
        self.cipher.set_key(key)?;
        Ok(())
    }

    /// Length of the installed key
    pub fn key_len(&self) -> usize {
        self.cipher.key_len()
    }

    /// Number of buffered bytes not yet decoded
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if the buffer has reached its limit
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_capacity
    }

    /// Hard limit
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Total bytes read since the last cleanup
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Return to the empty, unkeyed state
    pub fn cleanup(&mut self) {
        self.buffer = BytesMut::with_capacity(self.initial_capacity);
        self.plain = 0;
        self.cipher.clear();
        self.codec.reset();
        self.bytes_received = 0;
    }
}

impl Default for InputStream {
    fn default() -> Self {
        Self::new()
    }
}
