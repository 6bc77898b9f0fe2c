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

//! Membership consistency across arbitrary admit/teardown sequences

use proptest::prelude::*;
use std::io;
use tickmux_service::mock::{MockMultiplexer, MockSocket};
use tickmux_service::{EchoHandler, Readiness, ServerConfig, ServerManager};
use tickmux_stream::Socket;

#[derive(Debug, Clone)]
enum Op {
    Connect,
    Tick,
    Remove(usize),
    Exceptional(usize),
    PeerClose(usize),
    RegisterFails,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Connect),
        3 => Just(Op::Tick),
        2 => (0usize..8).prop_map(Op::Remove),
        1 => (0usize..8).prop_map(Op::Exceptional),
        1 => (0usize..8).prop_map(Op::PeerClose),
        1 => Just(Op::RegisterFails),
    ]
}

proptest! {
    /// Pool, registry, readiness view and multiplexer always agree on who is connected
    #[test]
    fn test_membership_views_stay_consistent(ops in prop::collection::vec(op(), 1..60)) {
        let config = ServerConfig::default().with_pool_capacity(4);
        let mux = MockMultiplexer::new(3);
        let mut manager = ServerManager::new(config, mux.clone(), EchoHandler).unwrap();
        let mut peers: Vec<MockSocket> = Vec::new();
        let mut next_fd = 10;

        for op in ops {
            match op {
                Op::Connect => {
                    peers.push(mux.push_connection(next_fd));
                    next_fd += 1;
                }
                Op::Tick => manager.tick(),
                Op::Remove(n) => {
                    let ids: Vec<_> = manager.registry().iter().collect();
                    if let Some(&id) = ids.get(n % ids.len().max(1)) {
                        prop_assert!(manager.remove_connection(id));
                        prop_assert!(!manager.remove_connection(id));
                    }
                }
                Op::Exceptional(n) => {
                    let ids: Vec<_> = manager.registry().iter().collect();
                    if let Some(&id) = ids.get(n % ids.len().max(1)) {
                        mux.push_ready(Readiness::exceptional(id));
                    }
                }
                Op::PeerClose(n) => {
                    if let Some(peer) = peers.get(n % peers.len().max(1)) {
                        peer.close_read();
                    }
                }
                Op::RegisterFails => {
                    mux.set_register_error(Some(io::ErrorKind::Other));
                    let _ = manager.accept_new_connection();
                    mux.set_register_error(None);
                }
            }

            let active = manager.registry().count();
            prop_assert_eq!(manager.pool().active_count(), active);
            prop_assert_eq!(manager.pool().allocated_count(), active);
            prop_assert_eq!(manager.readiness().len(), active);
            prop_assert_eq!(mux.registered_count(), active);
            prop_assert!(active <= manager.pool().capacity());
            for id in manager.registry().iter() {
                let conn = manager.connection(id).unwrap();
                let fd = conn.socket().unwrap().raw_fd();
                prop_assert_eq!(manager.readiness().connection(fd), Some(id));
                prop_assert!(fd <= manager.readiness().max_fd());
                prop_assert!(fd >= manager.readiness().min_fd());
            }
        }

        manager.remove_all_connections();
        prop_assert_eq!(manager.pool().free_count(), manager.pool().capacity());
    }
}
