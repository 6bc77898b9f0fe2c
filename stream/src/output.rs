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

//! Bounded send buffer

use bytes::{Buf, BytesMut};
use metrics::counter;
use std::io;
use tickmux_packetcodec::{CodecError, Encoder, KeyCipher, Packet, PacketCodec};
use tracing::{trace, warn};

use crate::{Socket, StreamError, StreamResult};

/// Starting capacity of an output buffer (8 KiB)
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 8 * 1024;

/// Hard limit of an output buffer (100 KiB); beyond it the peer is dropped
pub const DEFAULT_OUTPUT_BUFFER_MAX: usize = 100 * 1024;

/// Buffered, keyed outbound byte stream.
///
/// Invariant: `len() <= capacity() <= max_capacity()` after every call that
/// returns successfully. Capacity grows by doubling (or to the exact size
/// needed, whichever is larger) and never shrinks on write; only
/// [`cleanup`](Self::cleanup) returns it to the starting size.
#[derive(Debug)]
pub struct OutputStream {
    buffer: BytesMut,
    capacity: usize,
    initial_capacity: usize,
    max_capacity: usize,
    cipher: KeyCipher,
    codec: PacketCodec,
    bytes_written: u64,
    bytes_flushed: u64,
}

impl OutputStream {
    /// Create a stream with the default sizes
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_BUFFER_SIZE, DEFAULT_OUTPUT_BUFFER_MAX)
    }

    /// Create a stream with a starting capacity and hard limit
    ///
    /// The starting capacity is clamped to the limit.
    pub fn with_capacity(initial_capacity: usize, max_capacity: usize) -> Self {
        let initial_capacity = initial_capacity.min(max_capacity);
        Self {
            buffer: BytesMut::with_capacity(initial_capacity),
            capacity: initial_capacity,
            initial_capacity,
            max_capacity,
            cipher: KeyCipher::new(),
            codec: PacketCodec::new(),
            bytes_written: 0,
            bytes_flushed: 0,
        }
    }

    /// Use `codec` to frame packets (sets the payload limit)
    pub fn with_codec(mut self, codec: PacketCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Append raw bytes, keying them first.
    ///
    /// Fails without side effects if the result would exceed the hard limit.
    pub fn write(&mut self, bytes: &[u8]) -> StreamResult<usize> {
        self.reserve_for(bytes.len())?;
        let start = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        self.cipher.apply(&mut self.buffer[start..]);
        self.bytes_written += bytes.len() as u64;
        Ok(bytes.len())
    }

    /// Frame a packet and append it, keying the whole frame.
    ///
    /// A payload over the codec limit is rejected before the buffer is touched.
    pub fn write_packet(&mut self, packet: &Packet) -> StreamResult<usize> {
        let max = self.codec.max_payload();
        if packet.len() > max {
            return Err(CodecError::PayloadTooLarge {
                len: packet.len(),
                max,
            }
            .into());
        }
        let len = packet.encoded_len();
        self.reserve_for(len)?;
        let start = self.buffer.len();
        self.codec.encode(packet, &mut self.buffer)?;
        self.cipher.apply(&mut self.buffer[start..]);
        self.bytes_written += len as u64;
        trace!(tag = packet.tag(), len, "Buffered packet");
        Ok(len)
    }

    /// Send as much as the socket takes without blocking.
    ///
    /// Unsent bytes stay at the front of the buffer in their original order.
    /// Returns the number of bytes sent, which is 0 when the socket would block.
    pub fn flush<S: Socket + ?Sized>(&mut self, socket: &mut S) -> StreamResult<usize> {
        let mut sent = 0;
        while !self.buffer.is_empty() {
            match socket.send(&self.buffer) {
                Ok(0) => return Err(StreamError::Closed),
                Ok(n) => {
                    self.buffer.advance(n);
                    sent += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.bytes_flushed += sent as u64;
        Ok(sent)
    }

    /// Check if nothing is waiting to be sent
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of buffered bytes, independent of capacity headroom
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Current logical capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hard limit
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Total bytes accepted by `write`/`write_packet` since the last cleanup
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Total bytes handed to the socket since the last cleanup
    pub fn bytes_flushed(&self) -> u64 {
        self.bytes_flushed
    }

    /// Install or replace the key for subsequently written bytes.
    ///
    /// Bytes already buffered keep the encoding they were written with.
    pub fn set_key(&mut self, key: &[u8]) -> StreamResult<()> {
        self.cipher.set_key(key)?;
        Ok(())
    }

    /// Length of the installed key
    pub fn key_len(&self) -> usize {
        self.cipher.key_len()
    }

    /// Look at up to `len` buffered (already keyed) bytes without consuming them
    pub fn peek(&self, len: usize) -> &[u8] {
        &self.buffer[..len.min(self.buffer.len())]
    }

    /// Request a specific capacity.
    ///
    /// Fails if it is above the hard limit or below what is already buffered.
    pub fn resize(&mut self, new_capacity: usize) -> bool {
        if new_capacity > self.max_capacity || new_capacity < self.buffer.len() {
            return false;
        }
        if new_capacity > self.buffer.capacity() {
            self.buffer.reserve(new_capacity - self.buffer.len());
        }
        self.capacity = new_capacity;
        true
    }

    /// Return to the empty, default-capacity, unkeyed state.
    ///
    /// Must run before the owning slot is handed to a new peer.
    pub fn cleanup(&mut self) {
        self.buffer = BytesMut::with_capacity(self.initial_capacity);
        self.capacity = self.initial_capacity;
        self.cipher.clear();
        self.codec.reset();
        self.bytes_written = 0;
        self.bytes_flushed = 0;
    }

    fn reserve_for(&mut self, additional: usize) -> StreamResult<()> {
        let required = self.buffer.len().saturating_add(additional);
        if required > self.max_capacity {
            warn!(
                required,
                max = self.max_capacity,
                "Output buffer overflow"
            );
            counter!("tickmux.stream.overflows").increment(1);
            return Err(StreamError::BufferOverflow {
                required,
                max: self.max_capacity,
            });
        }
        if required > self.capacity {
            let grown = self
                .capacity
                .saturating_mul(2)
                .max(required)
                .min(self.max_capacity);
            trace!(from = self.capacity, to = grown, "Growing output buffer");
            self.buffer.reserve(grown - self.buffer.len());
            self.capacity = grown;
        }
        Ok(())
    }
}

impl Default for OutputStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSocket;
    use tickmux_packetcodec::FRAME_HEADER_LEN;

    #[test]
    fn test_overflow_leaves_buffer_untouched() {
        let mut output = OutputStream::with_capacity(16, 64);
        let err = output.write(&[7u8; 100]).unwrap_err();
        assert!(matches!(
            err,
            StreamError::BufferOverflow {
                required: 100,
                max: 64
            }
        ));
        assert_eq!(output.len(), 0);
        assert!(output.is_empty());
        assert_eq!(output.bytes_written(), 0);
    }

    #[test]
    fn test_overflow_keeps_cipher_position() {
        let mut output = OutputStream::with_capacity(8, 8);
        output.set_key(b"ab").unwrap();
        output.write(&[0u8; 3]).unwrap();
        assert!(output.write(&[0u8; 6]).is_err());
        output.write(&[0u8; 1]).unwrap();
        // Cursor continued from 3, not from 9
        assert_eq!(output.peek(4), b"abab");
    }

    #[test]
    fn test_growth_doubles_up_to_limit() {
        let mut output = OutputStream::with_capacity(10, 50);
        output.write(&[1u8; 11]).unwrap();
        assert_eq!(output.capacity(), 20);
        output.write(&[1u8; 20]).unwrap();
        assert_eq!(output.capacity(), 40);
        output.write(&[1u8; 15]).unwrap();
        assert_eq!(output.capacity(), 50);
        assert_eq!(output.len(), 46);
        assert!(output.len() <= output.capacity());
    }

    #[test]
    fn test_growth_jumps_to_required_size() {
        let mut output = OutputStream::with_capacity(4, 1024);
        output.write(&[1u8; 100]).unwrap();
        assert_eq!(output.capacity(), 100);
    }

    #[test]
    fn test_partial_flush_preserves_remainder() {
        let mut output = OutputStream::new();
        let mut socket = MockSocket::new(3);
        output.write(b"0123456789").unwrap();

        socket.set_send_budget(Some(4));
        assert_eq!(output.flush(&mut socket).unwrap(), 4);
        assert_eq!(output.len(), 6);
        assert_eq!(output.peek(6), b"456789");

        socket.set_send_budget(None);
        assert_eq!(output.flush(&mut socket).unwrap(), 6);
        assert!(output.is_empty());
        assert_eq!(socket.take_outbound(), b"0123456789");
    }

    #[test]
    fn test_flush_would_block_is_not_an_error() {
        let mut output = OutputStream::new();
        let mut socket = MockSocket::new(3);
        output.write(b"abc").unwrap();
        socket.set_send_budget(Some(0));
        assert_eq!(output.flush(&mut socket).unwrap(), 0);
        assert_eq!(output.len(), 3);
    }

    #[test]
    fn test_flush_socket_error_propagates() {
        let mut output = OutputStream::new();
        let mut socket = MockSocket::new(3);
        output.write(b"abc").unwrap();
        socket.fail_send(io::ErrorKind::BrokenPipe);
        let err = output.flush(&mut socket).unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_set_key_applies_to_later_bytes_only() {
        let mut output = OutputStream::new();
        output.write(&[0u8; 2]).unwrap();
        output.set_key(&[0x0F]).unwrap();
        output.write(&[0u8; 2]).unwrap();
        assert_eq!(output.peek(4), &[0x00, 0x00, 0x0F, 0x0F]);
        assert_eq!(output.key_len(), 1);
    }

    #[test]
    fn test_write_packet_frames_and_counts() {
        let mut output = OutputStream::new();
        let n = output.write_packet(&Packet::new(2, &b"xyz"[..])).unwrap();
        assert_eq!(n, FRAME_HEADER_LEN + 3);
        assert_eq!(output.len(), n);
        assert_eq!(output.peek(2), &[2, 0]);
    }

    #[test]
    fn test_write_packet_overflow_is_atomic() {
        let mut output = OutputStream::with_capacity(8, 16);
        let err = output
            .write_packet(&Packet::new(1, vec![0u8; 32]))
            .unwrap_err();
        assert!(err.is_overflow());
        assert!(output.is_empty());
    }

    #[test]
    fn test_write_packet_over_payload_limit_keeps_capacity() {
        let mut output =
            OutputStream::with_capacity(16, 4096).with_codec(PacketCodec::with_max_payload(32));
        let err = output
            .write_packet(&Packet::new(1, vec![0u8; 64]))
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::Codec(CodecError::PayloadTooLarge { len: 64, max: 32 })
        ));
        assert!(!err.is_overflow());
        assert!(output.is_empty());
        assert_eq!(output.capacity(), 16);
        assert_eq!(output.bytes_written(), 0);
    }

    #[test]
    fn test_resize_bounds() {
        let mut output = OutputStream::with_capacity(8, 64);
        output.write(&[0u8; 8]).unwrap();
        assert!(!output.resize(65));
        assert!(!output.resize(4));
        assert!(output.resize(32));
        assert_eq!(output.capacity(), 32);
        assert!(output.resize(8));
    }

    #[test]
    fn test_cleanup_resets_everything() {
        let mut output = OutputStream::with_capacity(8, 64);
        output.set_key(b"key").unwrap();
        output.write(&[9u8; 40]).unwrap();
        output.cleanup();

        assert!(output.is_empty());
        assert_eq!(output.capacity(), 8);
        assert_eq!(output.key_len(), 0);
        assert_eq!(output.bytes_written(), 0);

        output.write(b"ab").unwrap();
        assert_eq!(output.peek(2), b"ab");
    }
}
