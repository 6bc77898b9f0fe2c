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

//! Command line options

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tickmux_service::ServerConfig;

/// Tick-driven game server connection multiplexer
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Address to listen on
    #[clap(short, long, default_value = "127.0.0.1:7777")]
    pub bind: SocketAddr,

    /// Listen backlog
    #[clap(long, default_value = "128")]
    pub backlog: u32,

    /// Number of connection slots
    #[clap(short = 'c', long, default_value = "1024")]
    pub pool_capacity: usize,

    /// Descriptor limit for the readiness view (defaults to the pool capacity)
    #[clap(long)]
    pub max_fds: Option<usize>,

    /// Size of the peer server directory
    #[clap(long, default_value = "64")]
    pub max_servers: usize,

    /// Accepts attempted per tick
    #[clap(long, default_value = "50")]
    pub accept_batch: usize,

    /// Readiness wait per tick, in milliseconds
    #[clap(short = 't', long, default_value = "100")]
    pub select_timeout_ms: u64,

    /// Silence after which a peer is dropped, in seconds
    #[clap(long, default_value = "60")]
    pub heartbeat_timeout_secs: u64,

    /// Hard limit on buffered output per connection, in bytes
    #[clap(long, default_value = "102400")]
    pub output_buffer_max: usize,

    /// Largest accepted packet payload, in bytes
    #[clap(long, default_value = "65536")]
    pub max_payload: usize,

    /// Packets handed to the command handler per connection per tick
    #[clap(long, default_value = "32")]
    pub max_packets_per_tick: usize,

    /// Interval between metrics reports, in seconds (0 disables them)
    #[clap(long, default_value = "30")]
    pub metrics_interval_secs: u64,
}

impl Args {
    /// Build the service configuration these options describe
    pub fn to_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        let input_max = defaults
            .input_buffer_max
            .max(self.max_payload + tickmux_packetcodec::FRAME_HEADER_LEN);
        let output_size = defaults.output_buffer_size.min(self.output_buffer_max);

        ServerConfig::new(self.bind)
            .with_backlog(self.backlog)
            .with_pool_capacity(self.pool_capacity)
            .with_max_fds(self.max_fds.unwrap_or(self.pool_capacity))
            .with_max_servers(self.max_servers)
            .with_accept_batch(self.accept_batch)
            .with_select_timeout(Duration::from_millis(self.select_timeout_ms))
            .with_heartbeat_timeout(Duration::from_secs(self.heartbeat_timeout_secs))
            .with_output_buffer(output_size, self.output_buffer_max)
            .with_input_buffer(defaults.input_buffer_size, input_max)
            .with_max_payload(self.max_payload)
            .with_max_packets_per_tick(self.max_packets_per_tick)
    }

    /// Interval between metrics reports, if enabled
    pub fn metrics_interval(&self) -> Option<Duration> {
        (self.metrics_interval_secs > 0).then(|| Duration::from_secs(self.metrics_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_defaults() {
        let args = Args::parse_from(["tickmux-server"]);
        let config = args.to_config();
        let defaults = ServerConfig::default();

        assert_eq!(config.bind_address, defaults.bind_address);
        assert_eq!(config.pool_capacity, defaults.pool_capacity);
        assert_eq!(config.max_fds, defaults.max_fds);
        assert_eq!(config.accept_batch, defaults.accept_batch);
        assert_eq!(config.select_timeout, defaults.select_timeout);
        assert_eq!(config.heartbeat_timeout, defaults.heartbeat_timeout);
        assert_eq!(config.output_buffer_max, defaults.output_buffer_max);
        assert_eq!(config.input_buffer_max, defaults.input_buffer_max);
        assert!(config.validate().is_ok());
        assert_eq!(args.metrics_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "tickmux-server",
            "--bind",
            "0.0.0.0:9000",
            "-c",
            "16",
            "--select-timeout-ms",
            "5",
            "--max-payload",
            "200000",
            "--output-buffer-max",
            "4096",
            "--metrics-interval-secs",
            "0",
        ]);
        let config = args.to_config();

        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.pool_capacity, 16);
        assert_eq!(config.max_fds, 16);
        assert_eq!(config.select_timeout, Duration::from_millis(5));
        assert_eq!(config.input_buffer_max, 200_006);
        assert_eq!(config.output_buffer_size, 4096);
        assert!(config.validate().is_ok());
        assert_eq!(args.metrics_interval(), None);
    }
}
