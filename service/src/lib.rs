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

//! # Tickmux Service
//!
//! The connection-multiplexing core of a game server: one control thread
//! accepts peers on a single listening socket, keeps them in a fixed-size
//! slot pool and services every active peer once per tick.
//!
//! # Architecture
//!
//! ```text
//! ServerManager
//!     ├── Multiplexer (MioMultiplexer)   readiness wait + accept
//!     ├── ReadinessView                  registered fds, min/max bounds
//!     ├── ConnectionRegistry             active ids, snapshotted per tick
//!     ├── ConnectionPool                 slots: socket + streams + heartbeat
//!     ├── PeerDirectory                  peer server id -> connection
//!     └── CommandHandler                 business logic, once per peer per tick
//! ```
//!
//! Each tick runs `select`, then the exception, input, output, command and
//! heartbeat phases in that order. A failure inside a phase tears down the
//! one connection it concerns; it never stops the loop.
//!
//! # Example
//!
//! ```no_run
//! use tickmux_service::{EchoHandler, MioMultiplexer, ServerConfig, ServerManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::new("127.0.0.1:7777".parse()?);
//! let multiplexer = MioMultiplexer::from_config(&config)?;
//! let mut manager = ServerManager::new(config, multiplexer, EchoHandler)?;
//!
//! let shutdown = manager.shutdown_handle();
//! std::thread::spawn(move || {
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     shutdown.shutdown();
//! });
//! manager.run();
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod connection;
mod error;
mod handler;
mod manager;
mod metrics;
mod multiplexer;
mod pool;
mod readiness;
mod registry;
mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use clock::{HeartbeatClock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use connection::Connection;
pub use error::{ServiceError, ServiceResult};
pub use handler::{CommandHandler, ConnectionContext, EchoHandler};
pub use manager::{BroadcastResult, ServerManager, ShutdownHandle};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use multiplexer::{MioMultiplexer, Multiplexer};
pub use pool::ConnectionPool;
pub use readiness::{Readiness, ReadinessView, ReadyEvents};
pub use registry::{ConnectionRegistry, PeerDirectory, SnapshotEntry, TickSnapshot};
pub use types::{ConnectionId, ConnectionStatus, ServerId};
