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

//! # Tickmux Testsuite
//!
//! Loopback harness for end-to-end tests: a [`TestServer`] runs a
//! [`ServerManager`] over real TCP on its own thread, and a [`TestClient`]
//! speaks the packet framing with a blocking socket.

use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tickmux_packetcodec::{Decoder, Encoder, KeyCipher, Packet, PacketCodec};
use tickmux_service::{
    CommandHandler, ConnectionContext, EchoHandler, MetricsSnapshot, MioMultiplexer,
    ServerConfig, ServerManager, ServerMetrics, ServiceResult, ShutdownHandle,
};
use tracing::debug;

/// Tag a client uses to install a session key
pub const KEY_TAG: u16 = 0xFFFE;

/// Echo handler that also accepts a session key
///
/// A [`KEY_TAG`] packet installs its payload as the key on both directions
/// and is acknowledged, enciphered, with an empty [`KEY_TAG`] packet.
/// Frames the peer sends right behind the key packet are read with the new key.
#[derive(Debug, Default)]
pub struct KeyedEcho;

impl CommandHandler for KeyedEcho {
    fn process_command(
        &mut self,
        ctx: &mut ConnectionContext<'_>,
        packets: Vec<Packet>,
    ) -> ServiceResult<()> {
        for packet in packets {
            if packet.tag() == KEY_TAG {
                ctx.set_key(packet.payload())?;
                ctx.send_packet(&Packet::empty(KEY_TAG))?;
            } else {
                ctx.send_packet(&packet)?;
            }
        }
        Ok(())
    }

    fn ends_batch(&self, packet: &Packet) -> bool {
        packet.tag() == KEY_TAG
    }
}

/// Loopback configuration with a short tick
pub fn loopback_config() -> ServerConfig {
    ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
        .with_select_timeout(Duration::from_millis(5))
}

/// A server running on a background thread
pub struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    metrics: Arc<ServerMetrics>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start an echo server
    pub fn start(config: ServerConfig) -> ServiceResult<Self> {
        Self::start_with(config, EchoHandler)
    }

    /// Start a server with a custom handler
    pub fn start_with<H>(config: ServerConfig, handler: H) -> ServiceResult<Self>
    where
        H: CommandHandler + Send + 'static,
    {
        let multiplexer = MioMultiplexer::from_config(&config)?;
        let mut manager = ServerManager::new(config, multiplexer, handler)?;
        let addr = manager.local_addr()?;
        let shutdown = manager.shutdown_handle();
        let metrics = manager.metrics();
        let thread = std::thread::Builder::new()
            .name(format!("tickmux-{}", addr.port()))
            .spawn(move || manager.run())?;
        debug!(%addr, "Test server started");
        Ok(Self {
            addr,
            shutdown,
            metrics,
            thread: Some(thread),
        })
    }

    /// Address the server listens on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Wait until `predicate` holds for the metrics or `timeout` elapses
    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&MetricsSnapshot) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate(&self.metrics()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate(&self.metrics())
    }

    /// Stop the loop and wait for it to tear everything down
    pub fn stop(mut self) -> MetricsSnapshot {
        self.join();
        self.metrics()
    }

    fn join(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.join();
    }
}

/// Blocking client speaking the packet framing
pub struct TestClient {
    stream: TcpStream,
    codec: PacketCodec,
    inbound: BytesMut,
    send_cipher: KeyCipher,
    receive_cipher: KeyCipher,
}

impl TestClient {
    /// Connect to `addr`
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            codec: PacketCodec::new(),
            inbound: BytesMut::new(),
            send_cipher: KeyCipher::new(),
            receive_cipher: KeyCipher::new(),
        })
    }

    /// Install a key on both directions, matching the server's cipher
    pub fn set_key(&mut self, key: &[u8]) -> io::Result<()> {
        self.send_cipher.set_key(key).map_err(io::Error::other)?;
        self.receive_cipher.set_key(key).map_err(io::Error::other)?;
        Ok(())
    }

    /// Frame, encipher and send one packet
    pub fn send(&mut self, packet: &Packet) -> io::Result<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(packet, &mut frame).map_err(io::Error::other)?;
        self.send_cipher.apply(&mut frame);
        self.send_raw(&frame)
    }

    /// Send bytes exactly as given
    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Receive one packet, failing with `TimedOut` after `timeout`
    pub fn recv(&mut self, timeout: Duration) -> io::Result<Packet> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.codec.decode(&mut self.inbound).map_err(io::Error::other)? {
                return Ok(packet);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::ErrorKind::TimedOut.into());
            }
            self.stream.set_read_timeout(Some(remaining))?;

            let mut chunk = [0u8; 4096];
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => n,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Err(io::ErrorKind::TimedOut.into());
                }
                Err(e) => return Err(e),
            };
            self.receive_cipher.apply(&mut chunk[..n]);
            self.inbound.extend_from_slice(&chunk[..n]);
        }
    }

    /// Wait for the server to close the connection
    ///
    /// Returns `true` on end of stream or reset, `false` on timeout.
    pub fn wait_closed(&mut self, timeout: Duration) -> io::Result<bool> {
        loop {
            match self.recv(timeout) {
                Ok(_) => continue,
                Err(e) => {
                    return match e.kind() {
                        io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionAborted => Ok(true),
                        io::ErrorKind::TimedOut => Ok(false),
                        _ => Err(e),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_config_is_valid() {
        let config = loopback_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address.port(), 0);
    }
}
