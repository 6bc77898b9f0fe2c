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

//! Socket abstraction and its mio-backed implementation

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use socket2::SockRef;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// The socket surface the transport core consumes.
///
/// Implementations are expected to be non-blocking: `send` and `receive`
/// return [`io::ErrorKind::WouldBlock`] instead of waiting.
pub trait Socket {
    /// OS descriptor, used as the key in readiness bookkeeping
    fn raw_fd(&self) -> RawFd;

    /// Send as many bytes of `buf` as the socket accepts right now
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Receive up to `buf.len()` bytes; `Ok(0)` means the peer closed
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Put the socket in non-blocking mode
    fn set_nonblocking(&mut self) -> io::Result<()>;

    /// Configure `SO_LINGER`; `Some(Duration::ZERO)` resets on close
    fn set_linger(&mut self, linger: Option<Duration>) -> io::Result<()>;

    /// Check for a pending socket-level error
    fn is_error(&self) -> bool;

    /// Remote address
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Shut down both directions; errors are ignored
    fn close(&mut self);
}

/// A non-blocking TCP stream registered with a `mio` poll.
#[derive(Debug)]
pub struct TcpSocket {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl TcpSocket {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self { stream, peer_addr }
    }

    /// Connect to `addr` without blocking.
    ///
    /// The connection completes asynchronously; the socket becomes writable
    /// once it is established.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::new(stream, addr))
    }

    /// Get the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Consume the socket, returning the underlying stream
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

impl Socket for TcpSocket {
    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn set_nonblocking(&mut self) -> io::Result<()> {
        SockRef::from(&self.stream).set_nonblocking(true)
    }

    fn set_linger(&mut self, linger: Option<Duration>) -> io::Result<()> {
        SockRef::from(&self.stream).set_linger(linger)
    }

    fn is_error(&self) -> bool {
        !matches!(self.stream.take_error(), Ok(None))
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer_addr)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Source for TcpSocket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}
