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

//! Per-peer connection state

use metrics::counter;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};
use tickmux_packetcodec::PacketCodec;
use tickmux_stream::{InputStream, OutputStream, Packet, Socket};
use tracing::trace;

use crate::handler::ConnectionContext;
use crate::registry::PeerDirectory;
use crate::{ConnectionId, ConnectionStatus, ServerConfig, ServiceError, ServiceResult};

/// One pool slot: a socket with its buffered streams and liveness state.
///
/// Readiness from the multiplexer is edge-triggered, so the connection latches
/// `readable`/`writable` and only clears a latch once the socket reports it
/// would block. A latched connection is serviced every tick until then.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    generation: u64,
    status: ConnectionStatus,
    socket: Option<S>,
    peer_addr: Option<SocketAddr>,
    output: OutputStream,
    input: InputStream,
    last_heartbeat: Option<Instant>,
    connected_at: Option<Instant>,
    readable: bool,
    writable: bool,
}

impl<S: Socket> Connection<S> {
    /// Create a free slot sized by `config`
    pub fn new(id: ConnectionId, config: &ServerConfig) -> Self {
        let codec = PacketCodec::with_max_payload(config.max_payload);
        Self {
            id,
            generation: 0,
            status: ConnectionStatus::Free,
            socket: None,
            peer_addr: None,
            output: OutputStream::with_capacity(config.output_buffer_size, config.output_buffer_max)
                .with_codec(codec.clone()),
            input: InputStream::with_capacity(config.input_buffer_size, config.input_buffer_max)
                .with_codec(codec),
            last_heartbeat: None,
            connected_at: None,
            readable: false,
            writable: false,
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Number of times this slot has been handed out
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Get the lifecycle status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Get the attached socket
    pub fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    /// Get the attached socket mutably
    pub fn socket_mut(&mut self) -> Option<&mut S> {
        self.socket.as_mut()
    }

    /// Descriptor of the attached socket
    pub fn fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(Socket::raw_fd)
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Get the output stream
    pub fn output(&self) -> &OutputStream {
        &self.output
    }

    /// Get the input stream
    pub fn input(&self) -> &InputStream {
        &self.input
    }

    /// When the peer was last heard from
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    /// When the peer was admitted
    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    /// Check if the socket may have unread input
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// Check if the socket may accept output
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Check if the socket reports a pending error
    pub fn is_socket_error(&self) -> bool {
        self.socket.as_ref().is_some_and(Socket::is_error)
    }

    /// Check if output is waiting to be flushed
    pub fn has_pending_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub(crate) fn latch_readiness(&mut self, readable: bool, writable: bool) {
        self.readable |= readable;
        self.writable |= writable;
    }

    /// Attach an accepted socket and start the heartbeat
    ///
    /// Both latches start set so the first tick tries the socket directly.
    pub fn init(&mut self, socket: S, now: Instant) {
        self.peer_addr = socket.peer_addr().ok();
        self.socket = Some(socket);
        self.last_heartbeat = Some(now);
        self.connected_at = Some(now);
        self.readable = true;
        self.writable = true;
    }

    /// Close the socket and return the slot to its empty, unkeyed state
    pub fn cleanup(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.output.cleanup();
        self.input.cleanup();
        self.peer_addr = None;
        self.last_heartbeat = None;
        self.connected_at = None;
        self.readable = false;
        self.writable = false;
    }

    /// Pull available bytes from the socket into the input stream
    ///
    /// Any received data refreshes the heartbeat.
    pub fn receive(&mut self, now: Instant) -> ServiceResult<usize> {
        let socket = self
            .socket
            .as_mut()
            .ok_or(ServiceError::SocketError(self.id))?;
        let outcome = self.input.fill(socket)?;
        if outcome.drained {
            self.readable = false;
        }
        if outcome.bytes > 0 {
            self.last_heartbeat = Some(now);
            counter!("tickmux.bytes.received").increment(outcome.bytes as u64);
            trace!(connection_id = %self.id, bytes = outcome.bytes, "Received");
        }
        Ok(outcome.bytes)
    }

    /// Push buffered output to the socket
    pub fn flush(&mut self) -> ServiceResult<usize> {
        let socket = self
            .socket
            .as_mut()
            .ok_or(ServiceError::SocketError(self.id))?;
        let sent = self.output.flush(socket)?;
        if !self.output.is_empty() {
            self.writable = false;
        }
        if sent > 0 {
            counter!("tickmux.bytes.sent").increment(sent as u64);
            trace!(connection_id = %self.id, bytes = sent, "Flushed");
        }
        Ok(sent)
    }

    /// Queue a packet for sending
    pub fn send_packet(&mut self, packet: &Packet) -> ServiceResult<usize> {
        Ok(self.output.write_packet(packet)?)
    }

    /// Decode up to `max` complete packets from the input stream
    pub fn take_packets(&mut self, max: usize) -> ServiceResult<Vec<Packet>> {
        self.take_packets_until(max, |_| false)
    }

    /// Decode up to `max` packets, stopping early after one that `ends_batch` accepts
    ///
    /// Bytes behind that packet stay keyed in the buffer until the next call.
    pub fn take_packets_until(
        &mut self,
        max: usize,
        mut ends_batch: impl FnMut(&Packet) -> bool,
    ) -> ServiceResult<Vec<Packet>> {
        let mut packets = Vec::new();
        while packets.len() < max {
            match self.input.next_packet()? {
                Some(packet) => {
                    let last = ends_batch(&packet);
                    packets.push(packet);
                    if last {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(packets)
    }

    /// Install a key on both directions
    pub fn set_key(&mut self, key: &[u8]) -> ServiceResult<()> {
        self.output.set_key(key)?;
        self.input.set_key(key)?;
        Ok(())
    }

    /// Refresh the heartbeat
    pub fn touch_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = Some(now);
    }

    /// Check if the peer has been silent longer than `timeout`
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        self.last_heartbeat
            .is_some_and(|last| now.saturating_duration_since(last) > timeout)
    }

    /// Borrow the parts a command handler may touch
    pub(crate) fn context<'a>(
        &'a mut self,
        directory: &'a mut PeerDirectory,
        now: Instant,
    ) -> ConnectionContext<'a> {
        ConnectionContext::new(
            self.id,
            self.peer_addr,
            now,
            &mut self.output,
            &mut self.input,
            &mut self.last_heartbeat,
            directory,
        )
    }
}
