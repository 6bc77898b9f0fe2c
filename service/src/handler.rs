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

//! Business-logic hook invoked by the event loop

use std::net::SocketAddr;
use std::time::Instant;
use tickmux_stream::{InputStream, OutputStream, Packet};

use crate::registry::PeerDirectory;
use crate::{ConnectionId, ServerId, ServiceResult};

/// Command handler trait
///
/// Implement this trait to act on decoded packets. The event loop calls
/// [`process_command`](Self::process_command) once per active connection per
/// tick, after its input and output phases. All methods have default
/// implementations that do nothing.
///
/// An error returned from `process_command` tears down that connection only.
///
/// # Example
///
/// ```
/// use tickmux_service::{CommandHandler, ConnectionContext, ServiceResult};
/// use tickmux_stream::Packet;
///
/// struct Pong;
///
/// impl CommandHandler for Pong {
///     fn process_command(
///         &mut self,
///         ctx: &mut ConnectionContext<'_>,
///         packets: Vec<Packet>,
///     ) -> ServiceResult<()> {
///         for packet in packets.iter().filter(|p| p.tag() == 1) {
///             ctx.send_packet(&Packet::new(2, packet.payload().clone()))?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait CommandHandler {
    /// Called once a connection has been admitted
    fn on_connect(&mut self, _ctx: &mut ConnectionContext<'_>) {}

    /// Called every tick with up to the configured number of decoded packets
    ///
    /// `packets` may be empty.
    fn process_command(
        &mut self,
        _ctx: &mut ConnectionContext<'_>,
        _packets: Vec<Packet>,
    ) -> ServiceResult<()> {
        Ok(())
    }

    /// Check whether decoding should pause after `packet` for this tick
    ///
    /// Returning `true` for a packet that installs a key lets the key cover the
    /// bytes pipelined behind it; they are decoded on the next tick.
    fn ends_batch(&self, _packet: &Packet) -> bool {
        false
    }

    /// Called while a connection is torn down, before its slot is released
    fn on_disconnect(&mut self, _id: ConnectionId) {}
}

impl<H: CommandHandler + ?Sized> CommandHandler for Box<H> {
    fn on_connect(&mut self, ctx: &mut ConnectionContext<'_>) {
        (**self).on_connect(ctx)
    }

    fn process_command(
        &mut self,
        ctx: &mut ConnectionContext<'_>,
        packets: Vec<Packet>,
    ) -> ServiceResult<()> {
        (**self).process_command(ctx, packets)
    }

    fn ends_batch(&self, packet: &Packet) -> bool {
        (**self).ends_batch(packet)
    }

    fn on_disconnect(&mut self, id: ConnectionId) {
        (**self).on_disconnect(id)
    }
}

/// Handler that sends every received packet straight back
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl CommandHandler for EchoHandler {
    fn process_command(
        &mut self,
        ctx: &mut ConnectionContext<'_>,
        packets: Vec<Packet>,
    ) -> ServiceResult<()> {
        for packet in &packets {
            ctx.send_packet(packet)?;
        }
        Ok(())
    }
}

/// A handler's view of one connection during a callback
pub struct ConnectionContext<'a> {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    now: Instant,
    output: &'a mut OutputStream,
    input: &'a mut InputStream,
    last_heartbeat: &'a mut Option<Instant>,
    directory: &'a mut PeerDirectory,
    packets_sent: u64,
}

impl<'a> ConnectionContext<'a> {
    pub(crate) fn new(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        now: Instant,
        output: &'a mut OutputStream,
        input: &'a mut InputStream,
        last_heartbeat: &'a mut Option<Instant>,
        directory: &'a mut PeerDirectory,
    ) -> Self {
        Self {
            id,
            peer_addr,
            now,
            output,
            input,
            last_heartbeat,
            directory,
            packets_sent: 0,
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Time of the current tick
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Queue a packet for this connection
    ///
    /// Fails with an overflow if the peer is not draining its output; the
    /// loop disconnects it if the error is returned from the handler.
    pub fn send_packet(&mut self, packet: &Packet) -> ServiceResult<usize> {
        let n = self.output.write_packet(packet)?;
        self.packets_sent += 1;
        Ok(n)
    }

    /// Bytes waiting to be flushed
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// Install a key on both directions; applies to bytes not yet decoded
    pub fn set_key(&mut self, key: &[u8]) -> ServiceResult<()> {
        self.output.set_key(key)?;
        self.input.set_key(key)?;
        Ok(())
    }

    /// Mark the peer as alive
    pub fn touch_heartbeat(&mut self) {
        *self.last_heartbeat = Some(self.now);
    }

    /// Record this connection as the link to peer server `server_id`
    pub fn bind_server(&mut self, server_id: ServerId) -> ServiceResult<()> {
        self.directory.bind(server_id, self.id)?;
        Ok(())
    }

    /// Look up the connection linked to peer server `server_id`
    pub fn server_connection(&self, server_id: ServerId) -> Option<ConnectionId> {
        self.directory.server_connection(server_id)
    }

    pub(crate) fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}

impl std::fmt::Debug for ConnectionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("pending_output", &self.output.len())
            .finish()
    }
}
