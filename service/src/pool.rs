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

//! Fixed-capacity connection slot pool

use std::collections::VecDeque;
use tickmux_stream::Socket;
use tracing::trace;

use crate::connection::Connection;
use crate::registry::ConnectionRegistry;
use crate::{ConnectionId, ConnectionStatus, ServerConfig, ServiceError, ServiceResult};

/// Fixed array of connection slots addressed by [`ConnectionId`]
///
/// Free slots are handed out in FIFO order, so a released id is reused only
/// after every other free id. [`remove_registered`](Self::remove_registered)
/// also drops the id from the registry; the readiness view and multiplexer are
/// the server manager's job.
#[derive(Debug)]
pub struct ConnectionPool<S> {
    slots: Vec<Connection<S>>,
    free: VecDeque<ConnectionId>,
    next_generation: u64,
}

impl<S: Socket> ConnectionPool<S> {
    /// Create a pool of `config.pool_capacity` free slots
    pub fn new(config: &ServerConfig) -> Self {
        let capacity = config.pool_capacity.min(u32::MAX as usize) as u32;
        let slots = (0..capacity)
            .map(|index| Connection::new(ConnectionId::new(index), config))
            .collect();
        let free = (0..capacity).map(ConnectionId::new).collect();
        Self {
            slots,
            free,
            next_generation: 1,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots available to `create`
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of slots owned by a peer
    pub fn allocated_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots in the `Active` state
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|conn| conn.status().is_active())
            .count()
    }

    /// Take the next free slot
    ///
    /// The slot comes back `Connecting` with a fresh generation; the caller
    /// resets and initialises it before use.
    pub fn create(&mut self) -> ServiceResult<ConnectionId> {
        let id = self
            .free
            .pop_front()
            .ok_or(ServiceError::PoolExhausted(self.slots.len()))?;
        let generation = self.next_generation;
        self.next_generation += 1;

        let conn = &mut self.slots[id.index()];
        conn.set_generation(generation);
        conn.set_status(ConnectionStatus::Connecting);
        trace!(connection_id = %id, generation, "Allocated slot");
        Ok(id)
    }

    /// Look up an allocated slot
    pub fn get(&self, id: ConnectionId) -> ServiceResult<&Connection<S>> {
        match self.slots.get(id.index()) {
            Some(conn) if conn.status().is_allocated() => Ok(conn),
            _ => Err(ServiceError::ConnectionNotFound(id)),
        }
    }

    /// Look up an allocated slot mutably
    pub fn get_mut(&mut self, id: ConnectionId) -> ServiceResult<&mut Connection<S>> {
        match self.slots.get_mut(id.index()) {
            Some(conn) if conn.status().is_allocated() => Ok(conn),
            _ => Err(ServiceError::ConnectionNotFound(id)),
        }
    }

    /// Release a slot: close its socket, clear its buffers and mark it free
    ///
    /// Releasing a free or out-of-range slot is a no-op. Returns whether the
    /// slot was released by this call.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(conn) = self.slots.get_mut(id.index()) else {
            return false;
        };
        if !conn.status().is_allocated() {
            return false;
        }
        conn.cleanup();
        conn.set_status(ConnectionStatus::Free);
        self.free.push_back(id);
        trace!(connection_id = %id, "Released slot");
        true
    }

    /// Drop `id` from `registry`, then release its slot
    ///
    /// Idempotent like [`remove`](Self::remove).
    pub fn remove_registered(
        &mut self,
        id: ConnectionId,
        registry: &mut ConnectionRegistry,
    ) -> bool {
        registry.remove(id);
        self.remove(id)
    }

    /// Iterate allocated slots
    pub fn iter(&self) -> impl Iterator<Item = &Connection<S>> {
        self.slots
            .iter()
            .filter(|conn| conn.status().is_allocated())
    }
}
