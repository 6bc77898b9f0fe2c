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

//! Error types for the packet codec

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while framing, unframing or keying packets.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error surfaced through a `Framed` transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame declared (or a packet carried) more payload than allowed.
    ///
    /// On the receive path this means the peer is speaking a different
    /// protocol or is hostile; the connection should be dropped.
    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Declared or actual payload length
        len: usize,
        /// Configured maximum payload length
        max: usize,
    },

    /// A cipher key longer than [`MAX_KEY_LEN`](crate::MAX_KEY_LEN) was supplied.
    #[error("Cipher key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLong {
        /// Supplied key length
        len: usize,
        /// Maximum key length
        max: usize,
    },
}

impl CodecError {
    /// Check if the error was caused by the remote peer's data
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, CodecError::PayloadTooLarge { .. })
    }
}
