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

//! Scriptable [`Multiplexer`] for tests
//!
//! `MockMultiplexer` hands out queued [`MockSocket`]s from `accept` and reports
//! level-triggered readiness for registered sockets: readable while they hold
//! inbound bytes (or have been closed for reading), writable always. Extra
//! events and failures can be injected. Clones share state, so a test keeps a
//! handle while the manager owns another.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
pub use tickmux_stream::mock::MockSocket;

use crate::multiplexer::Multiplexer;
use crate::readiness::{Readiness, ReadyEvents};
use crate::ConnectionId;

#[derive(Debug, Default)]
struct MockMuxState {
    pending: VecDeque<MockSocket>,
    scripted: Vec<Readiness>,
    registered: BTreeMap<ConnectionId, MockSocket>,
    accept_error: Option<io::ErrorKind>,
    register_error: Option<io::ErrorKind>,
    select_error: Option<io::ErrorKind>,
    select_calls: usize,
}

/// In-memory multiplexer
#[derive(Debug, Clone)]
pub struct MockMultiplexer {
    listener_fd: RawFd,
    state: Arc<Mutex<MockMuxState>>,
}

impl MockMultiplexer {
    /// Create a multiplexer whose listener reports `listener_fd`
    pub fn new(listener_fd: RawFd) -> Self {
        Self {
            listener_fd,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockMuxState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a connection for `accept`, returning a handle to it
    pub fn push_connection(&self, fd: RawFd) -> MockSocket {
        let socket = MockSocket::new(fd);
        self.state().pending.push_back(socket.clone());
        socket
    }

    /// Number of queued connections not yet accepted
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Report `readiness` on the next `select`
    pub fn push_ready(&self, readiness: Readiness) {
        self.state().scripted.push(readiness);
    }

    /// Make `accept` fail with `kind`, or clear the failure
    pub fn set_accept_error(&self, kind: Option<io::ErrorKind>) {
        self.state().accept_error = kind;
    }

    /// Make `register` fail with `kind`, or clear the failure
    pub fn set_register_error(&self, kind: Option<io::ErrorKind>) {
        self.state().register_error = kind;
    }

    /// Make `select` fail with `kind`, or clear the failure
    pub fn set_select_error(&self, kind: Option<io::ErrorKind>) {
        self.state().select_error = kind;
    }

    /// Check if a socket is registered under `id`
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.state().registered.contains_key(&id)
    }

    /// Number of registered sockets
    pub fn registered_count(&self) -> usize {
        self.state().registered.len()
    }

    /// Number of `select` calls so far
    pub fn select_calls(&self) -> usize {
        self.state().select_calls
    }
}

impl Default for MockMultiplexer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Multiplexer for MockMultiplexer {
    type Socket = MockSocket;

    fn accept(&mut self) -> io::Result<Option<MockSocket>> {
        let mut state = self.state();
        if let Some(kind) = state.accept_error {
            return Err(kind.into());
        }
        Ok(state.pending.pop_front())
    }

    fn register(&mut self, id: ConnectionId, socket: &mut MockSocket) -> io::Result<()> {
        let mut state = self.state();
        if let Some(kind) = state.register_error {
            return Err(kind.into());
        }
        if state.registered.contains_key(&id) {
            return Err(io::ErrorKind::AlreadyExists.into());
        }
        state.registered.insert(id, socket.clone());
        Ok(())
    }

    fn deregister(&mut self, id: ConnectionId, _socket: &mut MockSocket) -> io::Result<()> {
        match self.state().registered.remove(&id) {
            Some(_) => Ok(()),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn select(&mut self, _timeout: Duration, events: &mut ReadyEvents) -> io::Result<()> {
        events.clear();
        let mut state = self.state();
        state.select_calls += 1;
        if let Some(kind) = state.select_error {
            return Err(kind.into());
        }

        events.listener = !state.pending.is_empty();
        for readiness in state.scripted.drain(..) {
            events.push(readiness);
        }
        for (&id, socket) in &state.registered {
            events.push(Readiness {
                id,
                readable: socket.inbound_len() > 0 || socket.is_read_closed(),
                writable: true,
                exceptional: false,
            });
        }
        Ok(())
    }

    fn listener_fd(&self) -> RawFd {
        self.listener_fd
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7777))
    }
}
