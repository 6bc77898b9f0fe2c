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

//! Benchmarks for packet framing and the key cipher

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tickmux_packetcodec::{Decoder, Encoder, KeyCipher, Packet, PacketCodec};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode");
    for size in [16usize, 256, 4096] {
        let packet = Packet::new(1, vec![0x5A; size]);
        group.throughput(Throughput::Bytes(packet.encoded_len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &packet, |b, packet| {
            let mut codec = PacketCodec::new();
            let mut dst = BytesMut::with_capacity(packet.encoded_len());
            b.iter(|| {
                dst.clear();
                codec.encode(black_box(packet), &mut dst).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut codec = PacketCodec::new();
    let mut wire = BytesMut::new();
    for i in 0..64u16 {
        codec.encode(&Packet::new(i, vec![0xA5; 128]), &mut wire).unwrap();
    }
    let wire = wire.freeze();

    c.bench_function("packet_decode_64x128", |b| {
        b.iter(|| {
            let mut codec = PacketCodec::new();
            let mut src = BytesMut::from(&wire[..]);
            let mut count = 0;
            while let Some(packet) = codec.decode(&mut src).unwrap() {
                black_box(packet);
                count += 1;
            }
            assert_eq!(count, 64);
        });
    });
}

fn bench_cipher(c: &mut Criterion) {
    let mut cipher = KeyCipher::with_key(b"benchmark-key-0123456789").unwrap();
    let mut data = vec![0u8; 8192];

    c.bench_function("key_cipher_8k", |b| {
        b.iter(|| cipher.apply(black_box(&mut data)));
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_cipher);
criterion_main!(benches);
