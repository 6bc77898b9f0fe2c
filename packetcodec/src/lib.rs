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

//! # Tickmux Packet Codec
//!
//! Framing and byte obfuscation for the tickmux transport core. The codec knows
//! nothing about what a packet *means*; it only delimits payloads on the wire
//! and optionally scrambles them with a shared key.
//!
//! ## Frame Layout
//!
//! Every packet travels as one frame:
//!
//! ```text
//! +----------------+------------------+------------------------+
//! | tag: u16 (LE)  | length: u32 (LE) | payload: length bytes  |
//! +----------------+------------------+------------------------+
//! ```
//!
//! The header is [`FRAME_HEADER_LEN`] bytes. `length` counts payload bytes only
//! and is bounded by the codec's maximum payload size, which both sides must
//! agree on.
//!
//! ## Core Components
//!
//! ### [`Packet`]
//!
//! An opaque, cheaply cloneable tagged payload.
//!
//! ### [`PacketCodec`]
//!
//! Implements [`Encoder`] and [`Decoder`] from `tokio_util::codec`, so it can be
//! driven directly against a `BytesMut` by the synchronous stream layer or
//! wrapped in a `Framed` by async callers.
//!
//! ### [`KeyCipher`]
//!
//! A keyed, position-dependent XOR transform. It is obfuscation, **not**
//! encryption: it offers no confidentiality against anyone who can observe
//! traffic and guess the key length, and no integrity protection at all.
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use tickmux_packetcodec::{KeyCipher, Packet, PacketCodec};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut codec = PacketCodec::new();
//! let mut wire = BytesMut::new();
//! codec.encode(&Packet::new(7, &b"hello"[..]), &mut wire)?;
//!
//! // Both ends scramble with the same key from the same starting position.
//! let mut outbound = KeyCipher::with_key(b"secret")?;
//! let mut inbound = KeyCipher::with_key(b"secret")?;
//! outbound.apply(&mut wire);
//! inbound.apply(&mut wire);
//!
//! let packet = codec.decode(&mut wire)?.expect("complete frame");
//! assert_eq!(packet.tag(), 7);
//! assert_eq!(&packet.payload()[..], b"hello");
//! # Ok(())
//! # }
//! ```

mod cipher;
mod codec;
mod packet;
mod result;

pub use cipher::{KeyCipher, MAX_KEY_LEN};
pub use codec::{DEFAULT_MAX_PAYLOAD, FRAME_HEADER_LEN, PacketCodec};
pub use packet::{Packet, PacketTag};
pub use result::{CodecError, CodecResult};

#[doc(no_inline)]
pub use tokio_util::codec::{Decoder, Encoder};
