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

//! Error types for the multiplexing core

use crate::types::{ConnectionId, ServerId};
use thiserror::Error;
use tickmux_packetcodec::CodecError;
use tickmux_stream::StreamError;

/// Result type for service operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Service error types
///
/// Would-block conditions never surface here: the stream layer turns them into
/// short counts.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from a socket or the readiness backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffering error from a connection's streams
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Framing or keying error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Every slot in the pool is in use
    #[error("Connection pool exhausted ({0} slots)")]
    PoolExhausted(usize),

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// The readiness view cannot hold another descriptor
    #[error("Descriptor limit ({0}) reached")]
    FdLimitReached(usize),

    /// The socket reported a pending error
    #[error("Socket error on {0}")]
    SocketError(ConnectionId),

    /// The peer missed its heartbeat deadline
    #[error("Heartbeat timeout on {0}")]
    HeartbeatTimeout(ConnectionId),

    /// Server id outside the peer directory
    #[error("Server {0} not found")]
    ServerNotFound(ServerId),

    /// The command handler rejected the connection's input
    #[error("Handler error: {0}")]
    Handler(String),

    /// The configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with a message
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors leave the loop and every other connection intact;
    /// retrying on a later tick may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::PoolExhausted(_)
                | ServiceError::FdLimitReached(_)
                | ServiceError::ConnectionNotFound(_)
                | ServiceError::Io(_)
        )
    }

    /// Check if the error ends a single connection
    pub fn is_connection_error(&self) -> bool {
        match self {
            ServiceError::Stream(e) => e.is_disconnect(),
            ServiceError::SocketError(_)
            | ServiceError::HeartbeatTimeout(_)
            | ServiceError::Codec(_)
            | ServiceError::Handler(_)
            | ServiceError::Io(_) => true,
            _ => false,
        }
    }

    /// Check if the error came from malformed peer input
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Codec(_) | ServiceError::Stream(StreamError::Codec(_))
        )
    }

    /// Check if the error is an output overflow
    pub fn is_overflow(&self) -> bool {
        matches!(self, ServiceError::Stream(e) if e.is_overflow())
    }
}
