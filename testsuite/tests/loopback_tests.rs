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

//! End-to-end behaviour over loopback TCP

use bytes::BytesMut;
use std::time::Duration;
use tickmux_packetcodec::{Encoder, KeyCipher, Packet, PacketCodec};
use tickmux_testsuite::{KEY_TAG, KeyedEcho, TestClient, TestServer, loopback_config};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_echo_round_trip() {
    let server = TestServer::start(loopback_config()).unwrap();
    let mut client = TestClient::connect(server.addr()).unwrap();

    let packet = Packet::new(7, &b"hello tick"[..]);
    client.send(&packet).unwrap();
    assert_eq!(client.recv(WAIT).unwrap(), packet);

    client.send(&Packet::empty(8)).unwrap();
    client.send(&Packet::new(9, vec![0xAB; 3000])).unwrap();
    assert_eq!(client.recv(WAIT).unwrap(), Packet::empty(8));
    assert_eq!(client.recv(WAIT).unwrap(), Packet::new(9, vec![0xAB; 3000]));

    let metrics = server.stop();
    assert_eq!(metrics.total_connections, 1);
    assert_eq!(metrics.packets_received, 3);
    assert_eq!(metrics.active_connections, 0);
}

#[test]
fn test_many_clients_are_served_independently() {
    let server = TestServer::start(loopback_config()).unwrap();
    let mut clients: Vec<TestClient> = (0..8)
        .map(|_| TestClient::connect(server.addr()).unwrap())
        .collect();

    for (n, client) in clients.iter_mut().enumerate() {
        client.send(&Packet::new(n as u16, vec![n as u8; 64])).unwrap();
    }
    for (n, client) in clients.iter_mut().enumerate() {
        let packet = client.recv(WAIT).unwrap();
        assert_eq!(packet.tag(), n as u16);
        assert_eq!(packet.payload().as_ref(), vec![n as u8; 64].as_slice());
    }
    assert!(server.wait_for(WAIT, |m| m.active_connections == 8));
}

#[test]
fn test_keyed_session_round_trip() {
    let server = TestServer::start_with(loopback_config(), KeyedEcho).unwrap();
    let mut client = TestClient::connect(server.addr()).unwrap();
    let key = b"session-key";

    client.send(&Packet::new(KEY_TAG, &key[..])).unwrap();
    client.set_key(key).unwrap();
    assert_eq!(client.recv(WAIT).unwrap(), Packet::empty(KEY_TAG));

    let packet = Packet::new(3, &b"secret"[..]);
    client.send(&packet).unwrap();
    assert_eq!(client.recv(WAIT).unwrap(), packet);
}

#[test]
fn test_keyed_frames_sent_with_the_key_in_one_write() {
    let server = TestServer::start_with(loopback_config(), KeyedEcho).unwrap();
    let mut client = TestClient::connect(server.addr()).unwrap();
    let key = b"pipelined-key";
    let first = Packet::new(3, &b"first"[..]);
    let second = Packet::new(4, vec![0x5A; 200]);

    let mut codec = PacketCodec::new();
    let mut wire = BytesMut::new();
    codec.encode(&Packet::new(KEY_TAG, &key[..]), &mut wire).unwrap();
    let mut keyed = BytesMut::new();
    codec.encode(&first, &mut keyed).unwrap();
    codec.encode(&second, &mut keyed).unwrap();
    KeyCipher::with_key(key).unwrap().apply(&mut keyed);
    wire.extend_from_slice(&keyed);
    client.send_raw(&wire).unwrap();

    client.set_key(key).unwrap();
    assert_eq!(client.recv(WAIT).unwrap(), Packet::empty(KEY_TAG));
    assert_eq!(client.recv(WAIT).unwrap(), first);
    assert_eq!(client.recv(WAIT).unwrap(), second);
    assert_eq!(server.metrics().protocol_errors, 0);
}

#[test]
fn test_full_pool_defers_admission_until_a_slot_frees() {
    let server = TestServer::start(loopback_config().with_pool_capacity(1)).unwrap();
    let mut first = TestClient::connect(server.addr()).unwrap();
    first.send(&Packet::empty(1)).unwrap();
    assert_eq!(first.recv(WAIT).unwrap(), Packet::empty(1));

    // The kernel completes the handshake, but the server leaves it in the backlog
    let mut second = TestClient::connect(server.addr()).unwrap();
    second.send(&Packet::empty(2)).unwrap();
    let err = second.recv(Duration::from_millis(200)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

    drop(first);
    assert_eq!(second.recv(WAIT).unwrap(), Packet::empty(2));
    assert_eq!(server.metrics().total_connections, 2);
    assert_eq!(server.metrics().rejected_connections, 0);
}

#[test]
fn test_silent_peer_is_dropped_after_heartbeat_timeout() {
    let config = loopback_config().with_heartbeat_timeout(Duration::from_millis(150));
    let server = TestServer::start(config).unwrap();
    let mut client = TestClient::connect(server.addr()).unwrap();

    assert!(client.wait_closed(WAIT).unwrap());
    assert!(server.wait_for(WAIT, |m| m.timeout_errors == 1 && m.active_connections == 0));
}

#[test]
fn test_oversized_frame_drops_the_peer() {
    let config = loopback_config()
        .with_max_payload(32)
        .with_input_buffer(64, 1024);
    let server = TestServer::start(config).unwrap();
    let mut client = TestClient::connect(server.addr()).unwrap();

    let mut frame = Vec::new();
    frame.extend_from_slice(&1u16.to_le_bytes());
    frame.extend_from_slice(&100u32.to_le_bytes());
    frame.extend_from_slice(&[0u8; 100]);
    client.send_raw(&frame).unwrap();

    assert!(client.wait_closed(WAIT).unwrap());
    assert!(server.wait_for(WAIT, |m| m.protocol_errors == 1));
}

#[test]
fn test_shutdown_closes_every_connection() {
    let server = TestServer::start(loopback_config()).unwrap();
    let mut clients: Vec<TestClient> = (0..3)
        .map(|_| TestClient::connect(server.addr()).unwrap())
        .collect();
    assert!(server.wait_for(WAIT, |m| m.active_connections == 3));

    let metrics = server.stop();
    assert_eq!(metrics.active_connections, 0);
    assert_eq!(metrics.closed_connections, 3);
    for client in &mut clients {
        assert!(client.wait_closed(WAIT).unwrap());
    }
}
