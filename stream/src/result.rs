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

//! Error types for socket streams

use tickmux_packetcodec::CodecError;

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while buffering or moving bytes through a socket
///
/// Would-block conditions never appear here; streams report them as short
/// counts.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A write would grow the buffer past its hard limit
    ///
    /// The write was not applied. The peer is not draining its data and
    /// should be disconnected.
    #[error("Buffer overflow: {required} bytes required, {max} allowed")]
    BufferOverflow {
        /// Buffered length the write would have produced
        required: usize,
        /// Hard buffer limit
        max: usize,
    },

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    Closed,

    /// An I/O error from the underlying socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A framing or keying error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl StreamError {
    /// Check if the error means the owning connection must be torn down
    ///
    /// Only a rejected cipher key is a local usage error; everything else is
    /// fatal for that peer.
    pub fn is_disconnect(&self) -> bool {
        !matches!(self, StreamError::Codec(CodecError::KeyTooLong { .. }))
    }

    /// Check if the error is a buffer overflow
    pub fn is_overflow(&self) -> bool {
        matches!(self, StreamError::BufferOverflow { .. })
    }
}
