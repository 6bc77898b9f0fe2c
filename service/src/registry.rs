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

//! Active-connection registry, tick snapshots and the peer server directory

use tickmux_stream::Socket;

use crate::pool::ConnectionPool;
use crate::{ConnectionId, ServerId, ServiceError, ServiceResult};

/// Ordered set of active connection ids
///
/// The event loop walks a [`TickSnapshot`] of this set, never the set itself,
/// so teardown and admission during a phase cannot disturb iteration.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    ids: Vec<ConnectionId>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`; returns false if it was already present
    pub fn add(&mut self, id: ConnectionId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove `id`; returns false if it was not present
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        match self.ids.iter().position(|&member| member == id) {
            Some(index) => {
                self.ids.remove(index);
                true
            }
            None => false,
        }
    }

    /// Check if `id` is registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of registered connections
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Check if no connection is registered
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate registered ids in insertion order
    pub fn iter(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.ids.iter().copied()
    }
}

/// One entry of a [`TickSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Slot id
    pub id: ConnectionId,
    /// Slot generation when the snapshot was taken
    pub generation: u64,
}

/// The registry as it stood at the start of a tick
///
/// Each entry carries its slot generation, so a slot torn down and re-admitted
/// within the same tick is not serviced under its old identity.
#[derive(Debug, Clone, Default)]
pub struct TickSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl TickSnapshot {
    /// Capture the registry's members with their current generations
    pub fn capture<S: Socket>(registry: &ConnectionRegistry, pool: &ConnectionPool<S>) -> Self {
        let entries = registry
            .iter()
            .filter_map(|id| {
                pool.get(id).ok().map(|conn| SnapshotEntry {
                    id,
                    generation: conn.generation(),
                })
            })
            .collect();
        Self { entries }
    }

    /// Iterate entries in registry order
    pub fn iter(&self) -> impl Iterator<Item = SnapshotEntry> + '_ {
        self.entries.iter().copied()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed-size table from peer server id to the connection serving it
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    entries: Vec<Option<ConnectionId>>,
}

impl PeerDirectory {
    /// Create a directory for server ids `0..capacity`
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
        }
    }

    /// Number of server ids the directory can hold
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of bound server ids
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    /// Check if no server id is bound
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Link `server_id` to `id`, returning the connection it replaced
    pub fn bind(
        &mut self,
        server_id: ServerId,
        id: ConnectionId,
    ) -> ServiceResult<Option<ConnectionId>> {
        let entry = self
            .entries
            .get_mut(usize::from(server_id))
            .ok_or(ServiceError::ServerNotFound(server_id))?;
        Ok(entry.replace(id))
    }

    /// Clear the link for `server_id`
    pub fn unbind(&mut self, server_id: ServerId) -> Option<ConnectionId> {
        self.entries
            .get_mut(usize::from(server_id))
            .and_then(Option::take)
    }

    /// Clear every link pointing at `id`, returning how many were cleared
    pub fn release(&mut self, id: ConnectionId) -> usize {
        let mut released = 0;
        for entry in self.entries.iter_mut().filter(|entry| **entry == Some(id)) {
            *entry = None;
            released += 1;
        }
        released
    }

    /// Look up the connection linked to `server_id`
    pub fn server_connection(&self, server_id: ServerId) -> Option<ConnectionId> {
        self.entries.get(usize::from(server_id)).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_add_remove() {
        let mut registry = ConnectionRegistry::new();
        let a = ConnectionId::new(0);
        let b = ConnectionId::new(1);
        let c = ConnectionId::new(2);

        assert!(registry.add(a));
        assert!(registry.add(b));
        assert!(registry.add(c));
        assert!(!registry.add(b));
        assert_eq!(registry.count(), 3);

        assert!(registry.remove(b));
        assert!(!registry.remove(b));
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn test_directory_bind_and_release() {
        let mut directory = PeerDirectory::new(4);
        let a = ConnectionId::new(5);
        let b = ConnectionId::new(6);

        assert_eq!(directory.bind(0, a).unwrap(), None);
        assert_eq!(directory.bind(3, a).unwrap(), None);
        assert_eq!(directory.bind(0, b).unwrap(), Some(a));
        assert!(matches!(
            directory.bind(4, a),
            Err(ServiceError::ServerNotFound(4))
        ));
        assert_eq!(directory.len(), 2);

        assert_eq!(directory.release(a), 1);
        assert_eq!(directory.server_connection(3), None);
        assert_eq!(directory.server_connection(0), Some(b));
        assert_eq!(directory.unbind(0), Some(b));
        assert!(directory.is_empty());
        assert_eq!(directory.server_connection(100), None);
    }
}
