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

//! Length-prefixed packet framing

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::{CodecError, CodecResult, Packet, PacketTag};

/// Size of the frame header: `tag: u16` followed by `length: u32`, both little-endian.
pub const FRAME_HEADER_LEN: usize = 6;

/// Default upper bound on a single packet payload (64 KiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Waiting for a complete header
    Header,
    /// Header consumed, waiting for `len` payload bytes
    Payload { tag: PacketTag, len: usize },
}

/// Frame encoder and decoder for [`Packet`]s.
///
/// The decoder is stateful: once a header has been consumed it remembers the
/// pending tag and length, so partially received frames cost nothing to retry.
#[derive(Debug, Clone)]
pub struct PacketCodec {
    max_payload: usize,
    state: DecoderState,
}

impl PacketCodec {
    /// Create a codec with the default payload limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with a custom payload limit
    ///
    /// The limit is clamped to what the 32-bit length field can express.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(u32::MAX as usize),
            state: DecoderState::Header,
        }
    }

    /// Get the payload limit
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Check if the decoder is between frames
    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::Header
    }

    /// Forget any partially decoded header
    pub fn reset(&mut self) {
        self.state = DecoderState::Header;
    }

    fn check_len(&self, len: usize) -> CodecResult<()> {
        if len > self.max_payload {
            return Err(CodecError::PayloadTooLarge {
                len,
                max: self.max_payload,
            });
        }
        Ok(())
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        loop {
            match self.state {
                DecoderState::Header => {
                    if src.len() < FRAME_HEADER_LEN {
                        return Ok(None);
                    }
                    let tag = src.get_u16_le();
                    let len = src.get_u32_le() as usize;
                    self.check_len(len)?;
                    self.state = DecoderState::Payload { tag, len };
                }
                DecoderState::Payload { tag, len } => {
                    if src.len() < len {
                        return Ok(None);
                    }
                    let payload = src.split_to(len).freeze();
                    self.state = DecoderState::Header;
                    trace!(tag, len, "Decoded packet");
                    return Ok(Some(Packet::new(tag, payload)));
                }
            }
        }
    }
}

impl Encoder<&Packet> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check_len(item.len())?;
        dst.reserve(item.encoded_len());
        dst.put_u16_le(item.tag());
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(item.payload());
        Ok(())
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Packet>::encode(self, &item, dst)
    }
}
