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

//! In-memory [`Socket`] for tests
//!
//! A `MockSocket` is a cheap handle onto shared state: clones observe and
//! control the same socket, so a test can keep one handle while the code under
//! test owns another.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::Socket;

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    send_budget: Option<usize>,
    read_closed: bool,
    pending_error: bool,
    send_error: Option<io::ErrorKind>,
    receive_error: Option<io::ErrorKind>,
    linger_error: Option<io::ErrorKind>,
    linger: Option<Option<Duration>>,
    nonblocking: bool,
    closed: bool,
}

/// Scriptable socket backed by in-memory buffers
#[derive(Debug, Clone)]
pub struct MockSocket {
    fd: RawFd,
    peer_addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
}

impl MockSocket {
    /// Create a socket reporting `fd` as its descriptor
    pub fn new(fd: RawFd) -> Self {
        let port = 40000u16.wrapping_add(fd as u16);
        Self {
            fd,
            peer_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue bytes for the code under test to receive
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state().inbound.extend(bytes.iter().copied());
    }

    /// Number of queued inbound bytes not yet received
    pub fn inbound_len(&self) -> usize {
        self.state().inbound.len()
    }

    /// Take everything sent so far
    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.state().outbound)
    }

    /// Number of bytes sent and not yet taken
    pub fn outbound_len(&self) -> usize {
        self.state().outbound.len()
    }

    /// Limit how many more bytes `send` accepts before reporting would-block.
    ///
    /// `None` removes the limit.
    pub fn set_send_budget(&self, budget: Option<usize>) {
        self.state().send_budget = budget;
    }

    /// Make `receive` report an orderly shutdown once inbound data runs out
    pub fn close_read(&self) {
        self.state().read_closed = true;
    }

    /// Check if `close_read` was called
    pub fn is_read_closed(&self) -> bool {
        self.state().read_closed
    }

    /// Raise or clear the socket-level error flag
    pub fn set_error(&self, error: bool) {
        self.state().pending_error = error;
    }

    /// Make every `send` fail with `kind`
    pub fn fail_send(&self, kind: io::ErrorKind) {
        self.state().send_error = Some(kind);
    }

    /// Make every `receive` fail with `kind`
    pub fn fail_receive(&self, kind: io::ErrorKind) {
        self.state().receive_error = Some(kind);
    }

    /// Make `set_linger` fail with `kind`
    pub fn fail_linger(&self, kind: io::ErrorKind) {
        self.state().linger_error = Some(kind);
    }

    /// Linger setting last applied, if any
    pub fn linger(&self) -> Option<Option<Duration>> {
        self.state().linger
    }

    /// Check if the socket was put in non-blocking mode
    pub fn is_nonblocking(&self) -> bool {
        self.state().nonblocking
    }

    /// Check if `close` was called
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl Socket for MockSocket {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if let Some(kind) = state.send_error {
            return Err(kind.into());
        }
        if state.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = match state.send_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => budget.min(buf.len()),
            None => buf.len(),
        };
        if let Some(budget) = state.send_budget.as_mut() {
            *budget -= n;
        }
        state.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if let Some(kind) = state.receive_error {
            return Err(kind.into());
        }
        if state.inbound.is_empty() {
            return if state.read_closed || state.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_nonblocking(&mut self) -> io::Result<()> {
        self.state().nonblocking = true;
        Ok(())
    }

    fn set_linger(&mut self, linger: Option<Duration>) -> io::Result<()> {
        let mut state = self.state();
        if let Some(kind) = state.linger_error {
            return Err(kind.into());
        }
        state.linger = Some(linger);
        Ok(())
    }

    fn is_error(&self) -> bool {
        self.state().pending_error
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer_addr)
    }

    fn close(&mut self) {
        self.state().closed = true;
    }
}
