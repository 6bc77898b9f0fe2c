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

//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tickmux_packetcodec::{DEFAULT_MAX_PAYLOAD, FRAME_HEADER_LEN};
use tickmux_stream::{
    DEFAULT_INPUT_BUFFER_MAX, DEFAULT_INPUT_BUFFER_SIZE, DEFAULT_OUTPUT_BUFFER_MAX,
    DEFAULT_OUTPUT_BUFFER_SIZE,
};

/// Server configuration
///
/// This structure contains every tunable of the event loop. Use the builder
/// methods to customize it and [`validate`](Self::validate) before use.
///
/// # Example
///
/// ```
/// use tickmux_service::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_pool_capacity(256)
///     .with_accept_batch(16)
///     .with_heartbeat_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listening socket to
    pub bind_address: SocketAddr,

    /// Listen backlog passed to the OS
    pub backlog: u32,

    /// Number of connection slots
    pub pool_capacity: usize,

    /// Maximum number of peer descriptors in the readiness view
    pub max_fds: usize,

    /// Size of the peer server directory
    pub max_servers: usize,

    /// Maximum accepts per tick
    ///
    /// Bounds how much an accept storm can delay service to existing peers.
    pub accept_batch: usize,

    /// Upper bound on the readiness wait of each tick
    pub select_timeout: Duration,

    /// Silence after which a peer is considered dead
    pub heartbeat_timeout: Duration,

    /// Starting capacity of each output buffer
    pub output_buffer_size: usize,

    /// Output buffer size at which a peer is disconnected
    pub output_buffer_max: usize,

    /// Starting capacity of each input buffer
    pub input_buffer_size: usize,

    /// Hard limit of each input buffer
    pub input_buffer_max: usize,

    /// Largest accepted frame payload
    pub max_payload: usize,

    /// Most packets handed to the command handler per connection per tick
    pub max_packets_per_tick: usize,

    /// `SO_LINGER` applied to accepted sockets (`Some(ZERO)` resets on close)
    pub linger: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 7777)),
            backlog: 128,
            pool_capacity: 1024,
            max_fds: 1024,
            max_servers: 64,
            accept_batch: 50,
            select_timeout: Duration::from_millis(100),
            heartbeat_timeout: Duration::from_secs(60),
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            output_buffer_max: DEFAULT_OUTPUT_BUFFER_MAX,
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            input_buffer_max: DEFAULT_INPUT_BUFFER_MAX,
            max_payload: DEFAULT_MAX_PAYLOAD,
            max_packets_per_tick: 32,
            linger: Some(Duration::ZERO),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the listen backlog
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Set the number of connection slots
    ///
    /// The descriptor limit follows the pool size unless set afterwards.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self.max_fds = capacity;
        self
    }

    /// Set the descriptor limit of the readiness view
    pub fn with_max_fds(mut self, max_fds: usize) -> Self {
        self.max_fds = max_fds;
        self
    }

    /// Set the peer server directory size
    pub fn with_max_servers(mut self, max_servers: usize) -> Self {
        self.max_servers = max_servers;
        self
    }

    /// Set the per-tick accept limit
    pub fn with_accept_batch(mut self, batch: usize) -> Self {
        self.accept_batch = batch;
        self
    }

    /// Set the readiness wait timeout
    pub fn with_select_timeout(mut self, timeout: Duration) -> Self {
        self.select_timeout = timeout;
        self
    }

    /// Set the heartbeat staleness threshold
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the output buffer starting and maximum sizes
    pub fn with_output_buffer(mut self, size: usize, max: usize) -> Self {
        self.output_buffer_size = size;
        self.output_buffer_max = max;
        self
    }

    /// Set the input buffer starting and maximum sizes
    pub fn with_input_buffer(mut self, size: usize, max: usize) -> Self {
        self.input_buffer_size = size;
        self.input_buffer_max = max;
        self
    }

    /// Set the largest accepted frame payload
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Set the per-tick packet limit per connection
    pub fn with_max_packets_per_tick(mut self, max: usize) -> Self {
        self.max_packets_per_tick = max;
        self
    }

    /// Set the linger applied to accepted sockets
    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_capacity == 0 {
            return Err("pool_capacity must be greater than 0".to_string());
        }

        if self.pool_capacity > u32::MAX as usize {
            return Err("pool_capacity must fit in a u32".to_string());
        }

        if self.max_fds == 0 {
            return Err("max_fds must be greater than 0".to_string());
        }

        if self.max_servers > usize::from(u16::MAX) + 1 {
            return Err("max_servers must fit the u16 server id space".to_string());
        }

        if self.backlog == 0 {
            return Err("backlog must be greater than 0".to_string());
        }

        if self.accept_batch == 0 {
            return Err("accept_batch must be greater than 0".to_string());
        }

        if self.select_timeout.is_zero() {
            return Err("select_timeout must be greater than 0".to_string());
        }

        if self.heartbeat_timeout.is_zero() {
            return Err("heartbeat_timeout must be greater than 0".to_string());
        }

        if self.output_buffer_size == 0 || self.input_buffer_size == 0 {
            return Err("buffer sizes must be greater than 0".to_string());
        }

        if self.output_buffer_size > self.output_buffer_max {
            return Err("output_buffer_size must not exceed output_buffer_max".to_string());
        }

        if self.input_buffer_size > self.input_buffer_max {
            return Err("input_buffer_size must not exceed input_buffer_max".to_string());
        }

        if self.max_payload == 0 {
            return Err("max_payload must be greater than 0".to_string());
        }

        if self.input_buffer_max < self.max_payload + FRAME_HEADER_LEN {
            return Err("input_buffer_max must hold one maximum-size frame".to_string());
        }

        if self.max_packets_per_tick == 0 {
            return Err("max_packets_per_tick must be greater than 0".to_string());
        }

        Ok(())
    }
}
