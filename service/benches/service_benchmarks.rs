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

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tickmux_service::mock::{MockMultiplexer, MockSocket};
use tickmux_service::{EchoHandler, ServerConfig, ServerManager};
use tickmux_stream::{OutputStream, Packet};

fn encoded(packet: &Packet) -> Vec<u8> {
    let mut output = OutputStream::new();
    let mut wire = MockSocket::new(0);
    output.write_packet(packet).unwrap();
    output.flush(&mut wire).unwrap();
    wire.take_outbound()
}

fn connected(count: usize) -> (ServerManager<MockMultiplexer, EchoHandler>, Vec<MockSocket>) {
    let config = ServerConfig::default()
        .with_pool_capacity(count)
        .with_accept_batch(count);
    let mux = MockMultiplexer::default();
    let mut manager = ServerManager::new(config, mux.clone(), EchoHandler).unwrap();
    let peers: Vec<MockSocket> = (0..count)
        .map(|n| mux.push_connection(10 + n as i32))
        .collect();
    manager.tick();
    manager.tick();
    (manager, peers)
}

fn bench_echo_tick(c: &mut Criterion) {
    let frame = encoded(&Packet::new(7, vec![0x5A; 128]));
    let mut group = c.benchmark_group("echo_tick");

    for count in [16usize, 256, 1024] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let (mut manager, peers) = connected(count);
            b.iter(|| {
                for peer in &peers {
                    peer.push_inbound(&frame);
                }
                manager.tick();
                manager.tick();
                for peer in &peers {
                    black_box(peer.take_outbound());
                }
            })
        });
    }
    group.finish();
}

fn bench_idle_tick(c: &mut Criterion) {
    let (mut manager, _peers) = connected(1024);
    c.bench_function("idle_tick_1024", |b| b.iter(|| manager.tick()));
}

criterion_group!(benches, bench_echo_tick, bench_idle_tick);
criterion_main!(benches);
