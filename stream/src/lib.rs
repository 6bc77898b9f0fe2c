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

//! # Tickmux Socket Streams
//!
//! Buffered, non-blocking byte streams sitting between a raw [`Socket`] and the
//! packet layer. Nothing in this crate blocks: every socket call tolerates a
//! would-block result and reports it as a short count rather than an error.
//!
//! ## Core Components
//!
//! ### [`Socket`]
//!
//! The narrow socket surface the transport needs: send, receive, linger,
//! error state and an OS descriptor for readiness bookkeeping. [`TcpSocket`]
//! implements it over a `mio` TCP stream.
//!
//! ### [`OutputStream`]
//!
//! A bounded, growable send buffer. Writes are keyed through a
//! [`KeyCipher`](tickmux_packetcodec::KeyCipher) as they are appended and are
//! all-or-nothing: a write that would push the buffer past its maximum fails
//! with [`StreamError::BufferOverflow`] and leaves the buffer untouched. The
//! owner is expected to treat that peer as unresponsive and disconnect it.
//!
//! ### [`InputStream`]
//!
//! The receive-side counterpart: accumulates socket bytes up to a bound,
//! reverses the key transform and yields complete [`Packet`]s.
//!
//! ## Example
//!
//! ```rust
//! use tickmux_packetcodec::Packet;
//! use tickmux_stream::{OutputStream, mock::MockSocket};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut socket = MockSocket::new(10);
//! let mut output = OutputStream::new();
//!
//! output.write_packet(&Packet::new(1, &b"hello"[..]))?;
//! let sent = output.flush(&mut socket)?;
//! assert_eq!(sent, socket.outbound_len());
//! assert!(output.is_empty());
//! # Ok(())
//! # }
//! ```

mod input;
mod output;
mod result;
mod socket;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use input::{DEFAULT_INPUT_BUFFER_MAX, DEFAULT_INPUT_BUFFER_SIZE, FillOutcome, InputStream};
pub use output::{DEFAULT_OUTPUT_BUFFER_MAX, DEFAULT_OUTPUT_BUFFER_SIZE, OutputStream};
pub use result::{StreamError, StreamResult};
pub use socket::{Socket, TcpSocket};

pub use tickmux_packetcodec::Packet;
