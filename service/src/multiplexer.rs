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

//! Readiness backends

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Type};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tickmux_stream::{Socket, TcpSocket};
use tracing::{debug, info};

use crate::readiness::{Readiness, ReadyEvents};
use crate::{ConnectionId, ServerConfig};

const LISTENER: Token = Token(0);
const EVENT_CAPACITY: usize = 1024;

/// Source of accepted sockets and readiness events.
///
/// The server manager drives exactly one listening endpoint through this
/// trait. `accept` returns `Ok(None)` when no connection is pending and
/// `select` waits at most `timeout`.
pub trait Multiplexer {
    /// Socket type produced by `accept`
    type Socket: Socket;

    /// Accept one pending connection without blocking
    fn accept(&mut self) -> io::Result<Option<Self::Socket>>;

    /// Start reporting readiness of `socket` under `id`
    fn register(&mut self, id: ConnectionId, socket: &mut Self::Socket) -> io::Result<()>;

    /// Stop reporting readiness of `socket`
    fn deregister(&mut self, id: ConnectionId, socket: &mut Self::Socket) -> io::Result<()>;

    /// Wait for readiness, replacing the contents of `events`
    fn select(&mut self, timeout: Duration, events: &mut ReadyEvents) -> io::Result<()>;

    /// Descriptor of the listening socket
    fn listener_fd(&self) -> RawFd;

    /// Address the listening socket is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// `mio` poll with a TCP listener.
///
/// Readiness is edge-triggered; connections latch it until they observe a
/// would-block.
pub struct MioMultiplexer {
    poll: Poll,
    events: Events,
    listener: TcpListener,
}

impl MioMultiplexer {
    /// Bind a non-blocking listener on `addr`
    pub fn bind(addr: SocketAddr, backlog: u32) -> io::Result<Self> {
        let socket = socket2::Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

        let mut listener = TcpListener::from_std(socket.into());
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        info!(
            local_addr = %listener.local_addr()?,
            fd = listener.as_raw_fd(),
            backlog,
            "Listening"
        );
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener,
        })
    }

    /// Bind using the address and backlog from `config`
    pub fn from_config(config: &ServerConfig) -> io::Result<Self> {
        Self::bind(config.bind_address, config.backlog)
    }

    fn token(id: ConnectionId) -> Token {
        Token(id.index() + 1)
    }
}

impl Multiplexer for MioMultiplexer {
    type Socket = TcpSocket;

    fn accept(&mut self) -> io::Result<Option<TcpSocket>> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => return Ok(Some(TcpSocket::new(stream, peer_addr))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn register(&mut self, id: ConnectionId, socket: &mut TcpSocket) -> io::Result<()> {
        self.poll.registry().register(
            socket,
            Self::token(id),
            Interest::READABLE | Interest::WRITABLE,
        )
    }

    fn deregister(&mut self, _id: ConnectionId, socket: &mut TcpSocket) -> io::Result<()> {
        self.poll.registry().deregister(socket)
    }

    fn select(&mut self, timeout: Duration, events: &mut ReadyEvents) -> io::Result<()> {
        events.clear();
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                debug!("Readiness wait interrupted");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        for event in self.events.iter() {
            match event.token() {
                LISTENER => events.listener = true,
                Token(token) => events.push(Readiness {
                    id: ConnectionId::new((token - 1) as u32),
                    readable: event.is_readable() || event.is_read_closed(),
                    writable: event.is_writable() || event.is_write_closed(),
                    exceptional: event.is_error() || event.is_priority(),
                }),
            }
        }
        Ok(())
    }

    fn listener_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl std::fmt::Debug for MioMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MioMultiplexer")
            .field("listener", &self.listener)
            .finish()
    }
}
