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

//! The event loop
//!
//! One [`ServerManager`] owns the listening endpoint, the connection pool, the
//! registry of active connections and the readiness view, and drives them
//! through a fixed phase sequence every tick:
//!
//! ```text
//! select -> exception -> input (accept, receive) -> output -> command -> heartbeat
//! ```
//!
//! Per-connection failures tear down that connection only; loop-level
//! failures are logged and the tick carries on.

use metrics::{counter, gauge, histogram};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tickmux_stream::{Packet, Socket};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::clock::{HeartbeatClock, SystemClock};
use crate::connection::Connection;
use crate::handler::CommandHandler;
use crate::multiplexer::Multiplexer;
use crate::pool::ConnectionPool;
use crate::readiness::{ReadinessView, ReadyEvents};
use crate::registry::{ConnectionRegistry, PeerDirectory, SnapshotEntry, TickSnapshot};
use crate::{
    ConnectionId, ConnectionStatus, ServerConfig, ServerId, ServerMetrics, ServiceError,
    ServiceResult,
};

/// Result of a broadcast operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    /// Number of connections attempted
    pub total: usize,
    /// Number of connections the packet was queued on
    pub succeeded: usize,
    /// Number of connections that failed (and were torn down)
    pub failed: usize,
}

impl BroadcastResult {
    /// Check if all sends succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Flag that stops [`ServerManager::run`] at the next tick boundary
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Create a handle in the running state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Single-threaded multiplexing event loop
pub struct ServerManager<M: Multiplexer, H, C = SystemClock> {
    config: ServerConfig,
    multiplexer: M,
    handler: H,
    clock: C,
    pool: ConnectionPool<M::Socket>,
    registry: ConnectionRegistry,
    readiness: ReadinessView,
    directory: PeerDirectory,
    events: ReadyEvents,
    listener_pending: bool,
    metrics: Arc<ServerMetrics>,
    shutdown: ShutdownHandle,
}

impl<M, H> ServerManager<M, H, SystemClock>
where
    M: Multiplexer,
    H: CommandHandler,
{
    /// Create a manager using the system clock
    pub fn new(config: ServerConfig, multiplexer: M, handler: H) -> ServiceResult<Self> {
        Self::with_clock(config, multiplexer, handler, SystemClock)
    }
}

impl<M, H, C> ServerManager<M, H, C>
where
    M: Multiplexer,
    H: CommandHandler,
    C: HeartbeatClock,
{
    /// Create a manager with an explicit heartbeat clock
    pub fn with_clock(
        config: ServerConfig,
        multiplexer: M,
        handler: H,
        clock: C,
    ) -> ServiceResult<Self> {
        config.validate().map_err(ServiceError::InvalidConfig)?;
        let readiness = ReadinessView::new(multiplexer.listener_fd(), config.max_fds);
        Ok(Self {
            pool: ConnectionPool::new(&config),
            registry: ConnectionRegistry::new(),
            readiness,
            directory: PeerDirectory::new(config.max_servers),
            events: ReadyEvents::new(),
            listener_pending: false,
            metrics: Arc::new(ServerMetrics::new()),
            shutdown: ShutdownHandle::new(),
            config,
            multiplexer,
            handler,
            clock,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get a handle that stops [`run`](Self::run)
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Address of the listening socket
    pub fn local_addr(&self) -> ServiceResult<SocketAddr> {
        Ok(self.multiplexer.local_addr()?)
    }

    /// Get the connection pool
    pub fn pool(&self) -> &ConnectionPool<M::Socket> {
        &self.pool
    }

    /// Get the active-connection registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Get the readiness view
    pub fn readiness(&self) -> &ReadinessView {
        &self.readiness
    }

    /// Get the peer server directory
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Get the command handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Get the command handler mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Get the multiplexer
    pub fn multiplexer(&self) -> &M {
        &self.multiplexer
    }

    /// Look up an active connection
    pub fn connection(&self, id: ConnectionId) -> ServiceResult<&Connection<M::Socket>> {
        self.pool
            .get(id)
            .ok()
            .filter(|conn| conn.status().is_active())
            .ok_or(ServiceError::ConnectionNotFound(id))
    }

    /// Number of active connections
    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    /// Connection linked to peer server `server_id`
    pub fn server_connection(&self, server_id: ServerId) -> Option<ConnectionId> {
        self.directory.server_connection(server_id)
    }

    /// Run ticks until shutdown is requested, then tear everything down
    pub fn run(&mut self) {
        info!(
            pool_capacity = self.pool.capacity(),
            listener_fd = self.readiness.listener_fd(),
            "Event loop started"
        );
        while !self.shutdown.is_shutdown() {
            self.tick();
        }
        self.remove_all_connections();
        info!(ticks = self.metrics.snapshot().ticks, "Event loop stopped");
    }

    /// Run one pass of every phase
    ///
    /// Connections admitted during this tick are first serviced on the next.
    pub fn tick(&mut self) {
        let started = Instant::now();
        let snapshot = TickSnapshot::capture(&self.registry, &self.pool);

        if let Err(e) = self.select() {
            error!(error = %e, "Readiness wait failed");
            self.metrics.select_failure();
            counter!("tickmux.select.failures").increment(1);
            // A failed wait returns at once; hold the tick to its usual pace
            std::thread::sleep(self.config.select_timeout);
        }
        self.process_exceptions();
        self.process_input(&snapshot);
        self.process_output(&snapshot);
        self.process_commands(&snapshot);
        self.heartbeat(&snapshot);

        self.metrics.tick();
        gauge!("tickmux.connections.active").set(self.registry.count() as f64);
        histogram!("tickmux.tick.duration").record(started.elapsed().as_secs_f64());
    }

    fn select(&mut self) -> ServiceResult<()> {
        let result = self
            .multiplexer
            .select(self.config.select_timeout, &mut self.events);
        if result.is_err() {
            self.events.clear();
        }
        result?;

        self.listener_pending |= self.events.listener;
        for readiness in self.events.iter() {
            if let Ok(conn) = self.pool.get_mut(readiness.id) {
                if conn.status().is_active() {
                    conn.latch_readiness(readiness.readable, readiness.writable);
                }
            }
        }
        trace!(
            events = self.events.len(),
            listener = self.events.listener,
            "Readiness collected"
        );
        Ok(())
    }

    fn process_exceptions(&mut self) {
        let exceptional: Vec<ConnectionId> = self.events.exceptional().collect();
        for id in exceptional {
            if self.connection(id).is_ok() {
                self.metrics.connection_error();
                self.teardown(id, &ServiceError::SocketError(id));
            }
        }
    }

    fn process_input(&mut self, snapshot: &TickSnapshot) {
        if self.listener_pending {
            self.accept_batch();
        }

        let now = self.clock.now();
        for entry in snapshot.iter() {
            let Some(conn) = self.live(entry) else {
                continue;
            };
            if !conn.is_readable() {
                continue;
            }
            if conn.is_socket_error() {
                self.metrics.connection_error();
                self.teardown(entry.id, &ServiceError::SocketError(entry.id));
                continue;
            }
            match conn.receive(now) {
                Ok(bytes) => self.metrics.bytes_received(bytes as u64),
                Err(e) => self.teardown(entry.id, &e),
            }
        }
    }

    fn process_output(&mut self, snapshot: &TickSnapshot) {
        for entry in snapshot.iter() {
            let Some(conn) = self.live(entry) else {
                continue;
            };
            if !conn.is_writable() || !conn.has_pending_output() {
                continue;
            }
            if conn.is_socket_error() {
                self.metrics.connection_error();
                self.teardown(entry.id, &ServiceError::SocketError(entry.id));
                continue;
            }
            match conn.flush() {
                Ok(bytes) => self.metrics.bytes_sent(bytes as u64),
                Err(e) => self.teardown(entry.id, &e),
            }
        }
    }

    fn process_commands(&mut self, snapshot: &TickSnapshot) {
        let now = self.clock.now();
        let max_packets = self.config.max_packets_per_tick;
        for entry in snapshot.iter() {
            if self.live(entry).is_none() {
                continue;
            }
            let Ok(conn) = self.pool.get_mut(entry.id) else {
                continue;
            };
            let handler = &self.handler;
            let packets = match conn.take_packets_until(max_packets, |p| handler.ends_batch(p)) {
                Ok(packets) => packets,
                Err(e) => {
                    self.teardown(entry.id, &e);
                    continue;
                }
            };
            self.metrics.packets_received(packets.len() as u64);

            let mut ctx = conn.context(&mut self.directory, now);
            let result = self.handler.process_command(&mut ctx, packets);
            let sent = ctx.packets_sent();
            for _ in 0..sent {
                self.metrics.packet_sent();
            }
            if let Err(e) = result {
                self.teardown(entry.id, &e);
            }
        }
    }

    fn heartbeat(&mut self, snapshot: &TickSnapshot) {
        let now = self.clock.now();
        let timeout = self.config.heartbeat_timeout;
        for entry in snapshot.iter() {
            let stale = self
                .live(entry)
                .is_some_and(|conn| conn.is_stale(now, timeout));
            if stale {
                self.metrics.timeout_error();
                self.teardown(entry.id, &ServiceError::HeartbeatTimeout(entry.id));
            }
        }
    }

    /// The connection for a snapshot entry, if it is still the same peer
    fn live(&mut self, entry: SnapshotEntry) -> Option<&mut Connection<M::Socket>> {
        self.pool
            .get_mut(entry.id)
            .ok()
            .filter(|conn| conn.status().is_active() && conn.generation() == entry.generation)
    }

    fn accept_batch(&mut self) {
        for _ in 0..self.config.accept_batch {
            match self.accept_new_connection() {
                Ok(Some(_)) => {}
                Ok(None) => {
                    self.listener_pending = false;
                    return;
                }
                Err(ServiceError::PoolExhausted(capacity)) => {
                    debug!(capacity, "Pool exhausted, deferring accept");
                    return;
                }
                Err(e) => {
                    self.metrics.connection_rejected();
                    counter!("tickmux.connections.rejected").increment(1);
                    warn!(error = %e, "Accept failed");
                    return;
                }
            }
        }
        trace!(batch = self.config.accept_batch, "Accept batch limit reached");
    }

    /// Admit one pending connection
    ///
    /// Returns `Ok(None)` when nothing is pending. Every failure after the slot
    /// is allocated unwinds completely: the slot returns to the pool and the
    /// socket is neither registered nor recorded in the readiness view.
    pub fn accept_new_connection(&mut self) -> ServiceResult<Option<ConnectionId>> {
        let id = self.pool.create()?;
        match self.admit(id) {
            Ok(true) => Ok(Some(id)),
            Ok(false) => {
                self.pool.remove(id);
                Ok(None)
            }
            Err(e) => {
                self.unwind(id);
                Err(e)
            }
        }
    }

    fn admit(&mut self, id: ConnectionId) -> ServiceResult<bool> {
        self.pool.get_mut(id)?.cleanup();

        let Some(socket) = self.multiplexer.accept()? else {
            return Ok(false);
        };
        let now = self.clock.now();
        let conn = self.pool.get_mut(id)?;
        conn.init(socket, now);

        let socket = conn.socket_mut().ok_or(ServiceError::SocketError(id))?;
        socket.set_nonblocking()?;
        if socket.is_error() {
            return Err(ServiceError::SocketError(id));
        }
        socket.set_linger(self.config.linger)?;
        self.add_connection(id)?;

        let conn = self.pool.get_mut(id)?;
        conn.set_status(ConnectionStatus::Active);
        let fd = conn.fd();
        let peer_addr = conn.peer_addr();
        let mut ctx = conn.context(&mut self.directory, now);
        self.handler.on_connect(&mut ctx);

        self.metrics.connection_opened();
        counter!("tickmux.connections.total").increment(1);
        info!(
            connection_id = %id,
            fd = ?fd,
            peer_addr = ?peer_addr,
            "Connection accepted"
        );
        Ok(true)
    }

    /// Record an initialised slot in the readiness view, the multiplexer and
    /// the registry, in that order
    ///
    /// On failure nothing stays registered.
    pub fn add_connection(&mut self, id: ConnectionId) -> ServiceResult<()> {
        let conn = self.pool.get_mut(id)?;
        let fd = conn.fd().ok_or(ServiceError::SocketError(id))?;
        let socket = conn.socket_mut().ok_or(ServiceError::SocketError(id))?;

        self.readiness.insert(fd, id)?;
        if let Err(e) = self.multiplexer.register(id, socket) {
            self.readiness.remove(fd);
            return Err(e.into());
        }
        self.registry.add(id);
        trace!(connection_id = %id, fd, "Connection registered");
        Ok(())
    }

    fn unwind(&mut self, id: ConnectionId) {
        if let Ok(conn) = self.pool.get_mut(id) {
            if let Some(fd) = conn.fd() {
                if self.readiness.connection(fd) == Some(id) {
                    self.readiness.remove(fd);
                }
            }
            if let Some(socket) = conn.socket_mut() {
                let _ = self.multiplexer.deregister(id, socket);
            }
        }
        self.pool.remove_registered(id, &mut self.registry);
        debug!(connection_id = %id, "Unwound partial admission");
    }

    fn teardown(&mut self, id: ConnectionId, cause: &ServiceError) {
        if cause.is_overflow() {
            self.metrics.overflow_error();
        } else if cause.is_protocol_error() {
            self.metrics.protocol_error();
        }
        warn!(connection_id = %id, cause = %cause, "Dropping connection");
        self.remove_connection(id);
    }

    /// Tear a connection down
    ///
    /// It leaves the registry and readiness view before its slot is released,
    /// so no later phase of the current tick can observe it. Removing an id
    /// that is not allocated is a no-op; returns whether anything was removed.
    #[instrument(skip(self), fields(connection_id = %id))]
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let Ok(conn) = self.pool.get_mut(id) else {
            return false;
        };
        conn.set_status(ConnectionStatus::Disconnecting);
        let duration = conn
            .connected_at()
            .map(|at| at.elapsed())
            .unwrap_or_default();

        self.registry.remove(id);
        if let Some(fd) = conn.fd() {
            self.readiness.remove(fd);
        }
        if let Some(socket) = conn.socket_mut() {
            if let Err(e) = self.multiplexer.deregister(id, socket) {
                debug!(error = %e, "Deregister failed");
            }
        }
        self.directory.release(id);
        self.handler.on_disconnect(id);
        self.pool.remove_registered(id, &mut self.registry);

        self.metrics.connection_closed(duration);
        counter!("tickmux.connections.closed").increment(1);
        debug!(
            min_fd = self.readiness.min_fd(),
            max_fd = self.readiness.max_fd(),
            "Connection removed"
        );
        true
    }

    /// Tear down every active connection
    pub fn remove_all_connections(&mut self) {
        let ids: Vec<ConnectionId> = self.registry.iter().collect();
        let count = ids.len();
        for id in ids {
            self.remove_connection(id);
        }
        info!(count, "Removed all connections");
    }

    /// Queue a packet on one connection
    ///
    /// An output overflow tears the connection down and is returned. Any
    /// other failure, such as a payload over the codec limit, leaves the
    /// connection untouched.
    pub fn send_packet(&mut self, id: ConnectionId, packet: &Packet) -> ServiceResult<usize> {
        let conn = self
            .pool
            .get_mut(id)
            .ok()
            .filter(|conn| conn.status().is_active())
            .ok_or(ServiceError::ConnectionNotFound(id))?;
        match conn.send_packet(packet) {
            Ok(n) => {
                self.metrics.packet_sent();
                Ok(n)
            }
            Err(e) => {
                if e.is_overflow() {
                    self.teardown(id, &e);
                }
                Err(e)
            }
        }
    }

    /// Queue a packet on every active connection
    ///
    /// Connections whose output overflows are torn down.
    pub fn broadcast(&mut self, packet: &Packet) -> BroadcastResult {
        let ids: Vec<ConnectionId> = self.registry.iter().collect();
        let mut result = BroadcastResult {
            total: ids.len(),
            ..Default::default()
        };
        for id in ids {
            match self.send_packet(id, packet) {
                Ok(_) => result.succeeded += 1,
                Err(_) => result.failed += 1,
            }
        }
        debug!(
            total = result.total,
            failed = result.failed,
            tag = packet.tag(),
            "Broadcast"
        );
        result
    }
}

impl<M: Multiplexer, H, C> std::fmt::Debug for ServerManager<M, H, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerManager")
            .field("connection_count", &self.registry.count())
            .field("pool_capacity", &self.pool.capacity())
            .field("min_fd", &self.readiness.min_fd())
            .field("max_fd", &self.readiness.max_fd())
            .finish()
    }
}
