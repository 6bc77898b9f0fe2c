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

//! # Tickmux Server
//!
//! Runs the connection multiplexer on a blocking worker thread and stops it
//! cleanly on Ctrl+C. Connected peers get every packet they send echoed back.

mod args;

use args::Args;
use clap::Parser;
use std::sync::Arc;
use tickmux_service::{EchoHandler, MioMultiplexer, ServerManager, ServerMetrics};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = args.to_config();
    config.validate()?;

    let multiplexer = MioMultiplexer::from_config(&config)?;
    let mut manager = ServerManager::new(config, multiplexer, EchoHandler)?;
    let local_addr = manager.local_addr()?;
    let shutdown = manager.shutdown_handle();
    let metrics = manager.metrics();
    info!(%local_addr, pool_capacity = args.pool_capacity, "Server listening");

    let reporter = args.metrics_interval().map(|interval| {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                timer.tick().await;
                report(&metrics);
            }
        })
    });

    let mut event_loop = tokio::task::spawn_blocking(move || manager.run());

    let stopped = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, shutting down");
            false
        }
        result = &mut event_loop => {
            if let Err(e) = result {
                error!(error = %e, "Event loop panicked");
            }
            true
        }
    };
    shutdown.shutdown();

    if !stopped {
        if let Err(e) = event_loop.await {
            error!(error = %e, "Event loop panicked");
        }
    }
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    report(&metrics);
    Ok(())
}

fn report(metrics: &ServerMetrics) {
    let snapshot = metrics.snapshot();
    info!(
        active = snapshot.active_connections,
        total = snapshot.total_connections,
        rejected = snapshot.rejected_connections,
        bytes_sent = snapshot.bytes_sent,
        bytes_received = snapshot.bytes_received,
        packets_received = snapshot.packets_received,
        errors = snapshot.total_errors(),
        ticks = snapshot.ticks,
        "Metrics"
    );
}
