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

//! Core identifiers and states

use std::fmt;

/// Slot index of a connection in the pool
///
/// Ids are reused once a slot is released; pair an id with the slot's
/// generation to tell successive peers apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Create a new connection ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the underlying u32 value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Get the slot index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier of a peer server in the [`PeerDirectory`](crate::PeerDirectory)
pub type ServerId = u16;

/// Lifecycle of a pool slot
///
/// `Free -> Connecting -> Active -> Disconnecting -> Free`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Slot is unused and may be handed out by the pool
    #[default]
    Free,
    /// Slot is allocated and a peer is being admitted
    Connecting,
    /// Peer is registered and serviced every tick
    Active,
    /// Peer is being torn down
    Disconnecting,
}

impl ConnectionStatus {
    /// Check if the slot is owned by a peer
    pub fn is_allocated(self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Check if the connection is serviced by the event loop
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
            Self::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id() {
        let id1 = ConnectionId::new(1);
        let id2 = ConnectionId::new(2);

        assert_eq!(id1.as_u32(), 1);
        assert_eq!(id2.index(), 2);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id1.to_string(), "conn-1");
    }

    #[test]
    fn test_connection_status() {
        assert!(!ConnectionStatus::Free.is_allocated());
        assert!(ConnectionStatus::Connecting.is_allocated());
        assert!(ConnectionStatus::Disconnecting.is_allocated());
        assert!(ConnectionStatus::Active.is_active());
        assert!(!ConnectionStatus::Connecting.is_active());
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Free);
        assert_eq!(ConnectionStatus::Disconnecting.to_string(), "disconnecting");
    }
}
