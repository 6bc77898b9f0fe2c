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

//! Readiness bookkeeping: the registered descriptor view and per-tick events

use std::collections::HashMap;
use std::os::fd::RawFd;
use tracing::trace;

use crate::{ConnectionId, ServiceError, ServiceResult};

/// Readiness reported for one connection in one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Connection the event belongs to
    pub id: ConnectionId,
    /// Input may be available (includes read-side hangup)
    pub readable: bool,
    /// Output may be accepted
    pub writable: bool,
    /// Socket error or out-of-band condition
    pub exceptional: bool,
}

impl Readiness {
    /// No readiness for `id`
    pub fn none(id: ConnectionId) -> Self {
        Self {
            id,
            readable: false,
            writable: false,
            exceptional: false,
        }
    }

    /// Read readiness for `id`
    pub fn readable(id: ConnectionId) -> Self {
        Self {
            readable: true,
            ..Self::none(id)
        }
    }

    /// Write readiness for `id`
    pub fn writable(id: ConnectionId) -> Self {
        Self {
            writable: true,
            ..Self::none(id)
        }
    }

    /// Exceptional condition on `id`
    pub fn exceptional(id: ConnectionId) -> Self {
        Self {
            exceptional: true,
            ..Self::none(id)
        }
    }
}

/// Events gathered by one readiness wait
#[derive(Debug, Clone, Default)]
pub struct ReadyEvents {
    /// The listening socket has pending connections
    pub listener: bool,
    connections: Vec<Readiness>,
}

impl ReadyEvents {
    /// Create an empty event set
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all events
    pub fn clear(&mut self) {
        self.listener = false;
        self.connections.clear();
    }

    /// Record readiness for a connection
    pub fn push(&mut self, readiness: Readiness) {
        self.connections.push(readiness);
    }

    /// Iterate connection events
    pub fn iter(&self) -> impl Iterator<Item = &Readiness> {
        self.connections.iter()
    }

    /// Iterate connections with an exceptional condition
    pub fn exceptional(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections
            .iter()
            .filter(|readiness| readiness.exceptional)
            .map(|readiness| readiness.id)
    }

    /// Number of connection events
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if nothing is ready
    pub fn is_empty(&self) -> bool {
        !self.listener && self.connections.is_empty()
    }
}

/// Every descriptor registered for multiplexed waiting
///
/// Tracks the listening descriptor and each peer descriptor with its
/// connection, plus the `[min_fd, max_fd]` range covering all of them. The
/// range is only ever rebuilt by [`recompute_bounds`](Self::recompute_bounds).
#[derive(Debug, Clone)]
pub struct ReadinessView {
    listener_fd: RawFd,
    fds: HashMap<RawFd, ConnectionId>,
    max_fds: usize,
    min_fd: RawFd,
    max_fd: RawFd,
}

impl ReadinessView {
    /// Create a view holding only the listener, with room for `max_fds` peers
    pub fn new(listener_fd: RawFd, max_fds: usize) -> Self {
        Self {
            listener_fd,
            fds: HashMap::new(),
            max_fds,
            min_fd: listener_fd,
            max_fd: listener_fd,
        }
    }

    /// Descriptor of the listening socket
    pub fn listener_fd(&self) -> RawFd {
        self.listener_fd
    }

    /// Lowest registered descriptor
    pub fn min_fd(&self) -> RawFd {
        self.min_fd
    }

    /// Highest registered descriptor
    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    /// Peer descriptor limit
    pub fn max_fds(&self) -> usize {
        self.max_fds
    }

    /// Number of peer descriptors
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Check if no peer descriptor is registered
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Check if `fd` is registered as a peer
    pub fn contains(&self, fd: RawFd) -> bool {
        self.fds.contains_key(&fd)
    }

    /// Connection registered under `fd`
    pub fn connection(&self, fd: RawFd) -> Option<ConnectionId> {
        self.fds.get(&fd).copied()
    }

    /// Register a peer descriptor
    pub fn insert(&mut self, fd: RawFd, id: ConnectionId) -> ServiceResult<()> {
        if fd == self.listener_fd || self.fds.contains_key(&fd) {
            return Err(ServiceError::Other(format!(
                "descriptor {fd} is already registered"
            )));
        }
        if self.fds.len() >= self.max_fds {
            return Err(ServiceError::FdLimitReached(self.max_fds));
        }
        self.fds.insert(fd, id);
        self.min_fd = self.min_fd.min(fd);
        self.max_fd = self.max_fd.max(fd);
        Ok(())
    }

    /// Unregister a peer descriptor
    ///
    /// The bounds are recomputed when `fd` was at either end of the range.
    pub fn remove(&mut self, fd: RawFd) -> Option<ConnectionId> {
        let id = self.fds.remove(&fd)?;
        if fd == self.min_fd || fd == self.max_fd {
            self.recompute_bounds();
        }
        Some(id)
    }

    /// Rebuild `[min_fd, max_fd]` from every registered descriptor
    pub fn recompute_bounds(&mut self) {
        let (min, max) = self
            .fds
            .keys()
            .fold((self.listener_fd, self.listener_fd), |(min, max), &fd| {
                (min.min(fd), max.max(fd))
            });
        trace!(min_fd = min, max_fd = max, "Recomputed descriptor bounds");
        self.min_fd = min;
        self.max_fd = max;
    }
}
