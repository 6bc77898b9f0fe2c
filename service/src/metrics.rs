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

//! Lock-free counters for the event loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Every counter the loop keeps, as an index into the counter table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Opened,
    Closed,
    Rejected,
    BytesSent,
    BytesReceived,
    PacketsSent,
    PacketsReceived,
    ConnectionErrors,
    ProtocolErrors,
    TimeoutErrors,
    OverflowErrors,
    Ticks,
    SelectFailures,
    LifetimeNanos,
}

const COUNTERS: usize = Counter::LifetimeNanos as usize + 1;

/// Lock-free server metrics
///
/// Only the control thread writes, but the table is atomic so an `Arc` can be
/// handed to a reporting task. [`snapshot`](Self::snapshot) reads it all.
#[derive(Debug)]
pub struct ServerMetrics {
    counters: [AtomicU64; COUNTERS],
    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a zeroed counter table
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    fn add(&self, counter: Counter, n: u64) {
        self.counters[counter as usize].fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    /// Record a peer being admitted
    pub fn connection_opened(&self) {
        self.add(Counter::Opened, 1);
    }

    /// Record a peer being torn down after `lifetime`
    pub fn connection_closed(&self, lifetime: Duration) {
        self.add(Counter::Closed, 1);
        let nanos = u64::try_from(lifetime.as_nanos()).unwrap_or(u64::MAX);
        self.add(Counter::LifetimeNanos, nanos);
    }

    /// Record an accept that failed for a reason other than a full pool
    pub fn connection_rejected(&self) {
        self.add(Counter::Rejected, 1);
    }

    /// Peers currently admitted
    pub fn active_connections(&self) -> u64 {
        self.get(Counter::Opened)
            .saturating_sub(self.get(Counter::Closed))
    }

    /// Peers admitted since start
    pub fn total_connections(&self) -> u64 {
        self.get(Counter::Opened)
    }

    /// Record bytes flushed to peers
    pub fn bytes_sent(&self, count: u64) {
        self.add(Counter::BytesSent, count);
    }

    /// Record bytes read from peers
    pub fn bytes_received(&self, count: u64) {
        self.add(Counter::BytesReceived, count);
    }

    /// Record a packet queued for sending
    pub fn packet_sent(&self) {
        self.add(Counter::PacketsSent, 1);
    }

    /// Record packets handed to the command handler
    pub fn packets_received(&self, count: u64) {
        self.add(Counter::PacketsReceived, count);
    }

    /// Record a socket-level teardown
    pub fn connection_error(&self) {
        self.add(Counter::ConnectionErrors, 1);
    }

    /// Record a teardown for malformed input
    pub fn protocol_error(&self) {
        self.add(Counter::ProtocolErrors, 1);
    }

    /// Record a heartbeat teardown
    pub fn timeout_error(&self) {
        self.add(Counter::TimeoutErrors, 1);
    }

    /// Record an output overflow teardown
    pub fn overflow_error(&self) {
        self.add(Counter::OverflowErrors, 1);
    }

    /// Record a completed tick
    pub fn tick(&self) {
        self.add(Counter::Ticks, 1);
    }

    /// Record a failed readiness wait
    pub fn select_failure(&self) {
        self.add(Counter::SelectFailures, 1);
    }

    /// Read every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let opened = self.get(Counter::Opened);
        let closed = self.get(Counter::Closed);
        let avg_connection_duration = match closed {
            0 => Duration::ZERO,
            n => Duration::from_nanos(self.get(Counter::LifetimeNanos) / n),
        };
        MetricsSnapshot {
            total_connections: opened,
            active_connections: opened.saturating_sub(closed),
            closed_connections: closed,
            rejected_connections: self.get(Counter::Rejected),
            bytes_sent: self.get(Counter::BytesSent),
            bytes_received: self.get(Counter::BytesReceived),
            packets_sent: self.get(Counter::PacketsSent),
            packets_received: self.get(Counter::PacketsReceived),
            connection_errors: self.get(Counter::ConnectionErrors),
            protocol_errors: self.get(Counter::ProtocolErrors),
            timeout_errors: self.get(Counter::TimeoutErrors),
            overflow_errors: self.get(Counter::OverflowErrors),
            ticks: self.get(Counter::Ticks),
            select_failures: self.get(Counter::SelectFailures),
            uptime: self.started_at.elapsed(),
            avg_connection_duration,
        }
    }
}

/// Counter values at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Peers admitted since start
    pub total_connections: u64,
    /// Peers currently admitted
    pub active_connections: u64,
    /// Peers torn down since start
    pub closed_connections: u64,
    /// Accepts that failed for a reason other than a full pool
    pub rejected_connections: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Packets queued for sending
    pub packets_sent: u64,
    /// Packets delivered to the command handler
    pub packets_received: u64,
    /// Socket-level teardowns
    pub connection_errors: u64,
    /// Malformed input teardowns
    pub protocol_errors: u64,
    /// Heartbeat teardowns
    pub timeout_errors: u64,
    /// Output overflow teardowns
    pub overflow_errors: u64,
    pub ticks: u64,
    /// Failed readiness waits
    pub select_failures: u64,
    pub uptime: Duration,
    /// Mean lifetime of a closed connection
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    fn per_sec(&self, count: u64) -> f64 {
        match self.uptime.as_secs_f64() {
            secs if secs > 0.0 => count as f64 / secs,
            _ => 0.0,
        }
    }

    /// Outbound byte rate over the uptime
    pub fn bytes_sent_per_sec(&self) -> f64 {
        self.per_sec(self.bytes_sent)
    }

    /// Inbound byte rate over the uptime
    pub fn bytes_received_per_sec(&self) -> f64 {
        self.per_sec(self.bytes_received)
    }

    /// Teardowns caused by any per-connection failure
    pub fn total_errors(&self) -> u64 {
        self.connection_errors + self.protocol_errors + self.timeout_errors + self.overflow_errors
    }
}
