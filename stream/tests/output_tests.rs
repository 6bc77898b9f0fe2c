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

//! Ordering and bounding properties of the output stream

use proptest::prelude::*;
use tickmux_packetcodec::{Decoder, KeyCipher, Packet, PacketCodec};
use tickmux_stream::mock::MockSocket;
use tickmux_stream::{InputStream, OutputStream, StreamError};

proptest! {
    /// Whatever the socket accepts per flush, bytes leave in write order and none are lost
    #[test]
    fn test_flushed_bytes_match_written_bytes(
        writes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..20),
        budgets in prop::collection::vec(0usize..40, 1..50),
    ) {
        let mut output = OutputStream::with_capacity(16, 4096);
        let mut socket = MockSocket::new(3);
        let mut expected = Vec::new();

        for (i, chunk) in writes.iter().enumerate() {
            output.write(chunk).unwrap();
            expected.extend_from_slice(chunk);
            socket.set_send_budget(Some(budgets[i % budgets.len()]));
            output.flush(&mut socket).unwrap();
            prop_assert!(output.len() <= output.capacity());
        }

        socket.set_send_budget(None);
        output.flush(&mut socket).unwrap();
        prop_assert!(output.is_empty());
        prop_assert_eq!(socket.take_outbound(), expected);
    }

    /// A rejected write never changes what is buffered
    #[test]
    fn test_overflowing_write_is_all_or_nothing(
        first in 0usize..64,
        second in 0usize..128,
    ) {
        let mut output = OutputStream::with_capacity(8, 64);
        output.write(&vec![1u8; first]).unwrap();
        let before = output.peek(first).to_vec();

        match output.write(&vec![2u8; second]) {
            Ok(n) => {
                prop_assert_eq!(n, second);
                prop_assert_eq!(output.len(), first + second);
            }
            Err(StreamError::BufferOverflow { required, max }) => {
                prop_assert_eq!(required, first + second);
                prop_assert_eq!(max, 64);
                prop_assert_eq!(output.len(), first);
                prop_assert_eq!(output.peek(first), &before[..]);
            }
            Err(e) => prop_assert!(false, "unexpected error {e}"),
        }
        prop_assert!(output.len() <= output.capacity());
        prop_assert!(output.capacity() <= output.max_capacity());
    }
}

#[test]
fn test_keyed_packets_survive_a_trip_through_both_streams() {
    let key = b"0123456789";
    let mut output = OutputStream::new();
    output.set_key(key).unwrap();
    let mut input = InputStream::new();
    input.set_key(key).unwrap();

    let packets = vec![
        Packet::new(1, &b"login"[..]),
        Packet::empty(2),
        Packet::new(3, vec![0xAB; 300]),
    ];
    for packet in &packets {
        output.write_packet(packet).unwrap();
    }

    let mut wire = MockSocket::new(5);
    output.flush(&mut wire).unwrap();
    let bytes = wire.take_outbound();
    wire.push_inbound(&bytes);
    input.fill(&mut wire).unwrap();

    for packet in &packets {
        assert_eq!(input.next_packet().unwrap().as_ref(), Some(packet));
    }
    assert!(input.next_packet().unwrap().is_none());
}

#[test]
fn test_keyed_output_is_not_plain_frames() {
    let mut output = OutputStream::new();
    output.set_key(b"\x55").unwrap();
    output.write_packet(&Packet::new(1, &b"abc"[..])).unwrap();

    let mut keyed = output.peek(output.len()).to_vec();
    assert_eq!(keyed[0], 1 ^ 0x55);

    KeyCipher::with_key(b"\x55").unwrap().apply(&mut keyed);
    let mut plain = bytes::BytesMut::from(&keyed[..]);
    let packet = PacketCodec::new().decode(&mut plain).unwrap().unwrap();
    assert_eq!(packet.payload().as_ref(), b"abc");
}
