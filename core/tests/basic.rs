// Copyright 2026 bgpr Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session establishment: FSM sequencing on the wire for active and
//! passive peers, hold-time behavior, graceful shutdown.

mod common;

use common::*;
use bgpr::config::PeerConfig;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpListener;

const ROUTER_ID: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const PEER_A: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);

#[tokio::test]
async fn test_active_establishment_message_sequence() {
    // The speaker dials us: Idle -> Connect -> OpenSent (its OPEN) ->
    // OpenConfirm (its KEEPALIVE after ours) -> Established (initial
    // UPDATE with its configured network).
    let remote = TcpListener::bind((PEER_A, 0)).await.unwrap();
    let remote_port = remote.local_addr().unwrap().port();

    let mut peer_config = PeerConfig::new(PEER_A, 65001);
    peer_config.port = remote_port;

    let server = start_test_server(65000, ROUTER_ID, &["10.1.0.0/24"], vec![peer_config]).await;

    let (stream, _) = tokio::time::timeout(READ_TIMEOUT, remote.accept())
        .await
        .expect("speaker did not dial out")
        .unwrap();
    let mut peer = RawPeer { stream };

    // OpenSent: the speaker's OPEN comes first
    let (asn, hold_time, bgp_id) = peer.expect_open().await;
    assert_eq!(asn, 65000);
    assert_eq!(hold_time, 90);
    assert_eq!(bgp_id, u32::from(ROUTER_ID));

    // Our OPEN is answered with a KEEPALIVE (OpenSent -> OpenConfirm)
    peer.send(&open_message(65001, 90, PEER_A)).await;
    peer.expect_keepalive().await;

    // Our KEEPALIVE completes establishment; the initial UPDATE carries
    // the locally originated network with the speaker's ASN prepended
    peer.send(&keepalive_message()).await;
    let body = peer.expect_update().await;

    // withdrawn(2) | attrs_len(2) | ORIGIN | AS_PATH [65000] | NEXT_HOP | NLRI
    assert_eq!(&body[0..2], &[0x00, 0x00]);
    let attrs_len = u16::from_be_bytes([body[2], body[3]]) as usize;
    let attrs = &body[4..4 + attrs_len];
    assert!(attrs
        .windows(7)
        .any(|w| w == [0x40, 0x02, 0x04, 0x02, 0x01, 0xfd, 0xe8])); // AS_PATH: SEQUENCE [65000]
    let nlri = &body[4 + attrs_len..];
    assert_eq!(nlri, &[0x18, 0x0a, 0x01, 0x00]); // 10.1.0.0/24
}

#[tokio::test]
async fn test_passive_establishment() {
    // Passive peer: the speaker waits in Active; our inbound connection
    // triggers its OPEN.
    let server = start_test_server(
        65000,
        ROUTER_ID,
        &["10.1.0.0/24"],
        vec![passive_peer(PEER_A, 65001)],
    )
    .await;

    let mut peer = RawPeer::connect_from(PEER_A, server.bgp_port).await;
    peer.establish(65001, PEER_A, &server).await;

    let body = peer.expect_update().await;
    let attrs_len = u16::from_be_bytes([body[2], body[3]]) as usize;
    assert_eq!(&body[4 + attrs_len..], &[0x18, 0x0a, 0x01, 0x00]);
}

#[tokio::test]
async fn test_keepalives_respect_negotiated_hold_time() {
    // We offer hold 30: effective 30, so the speaker must keepalive at
    // most every 10 seconds; with our silence its hold timer (ours is
    // never refreshed) eventually fires a HOLD_TIME notification. Use a
    // short hold to keep the test fast.
    let server = start_test_server(65000, ROUTER_ID, &[], vec![passive_peer(PEER_A, 65001)]).await;

    let mut peer = RawPeer::connect_from(PEER_A, server.bgp_port).await;
    let _ = peer.expect_open().await;
    peer.send(&open_message(65001, 3, PEER_A)).await; // effective hold 3
    peer.expect_keepalive().await;
    peer.send(&keepalive_message()).await;

    // The speaker keepalives every second; after ~3s of our silence it
    // declares us dead with (HOLD_TIME, 0)
    let mut keepalives = 0;
    loop {
        let (kind, body) = peer.read_message().await;
        match kind {
            2 => {} // initial UPDATE would be empty here; none configured
            4 => keepalives += 1,
            3 => {
                assert_eq!(body[0], 4); // Hold Timer Expired
                assert_eq!(body[1], 0);
                break;
            }
            other => panic!("unexpected message type {}", other),
        }
        assert!(keepalives < 10, "hold timer never fired");
    }
    peer.expect_close().await;
}

#[tokio::test]
async fn test_zero_hold_time_disables_keepalives() {
    let server = start_test_server(65000, ROUTER_ID, &[], vec![passive_peer(PEER_A, 65001)]).await;

    let mut peer = RawPeer::connect_from(PEER_A, server.bgp_port).await;
    let _ = peer.expect_open().await;
    peer.send(&open_message(65001, 0, PEER_A)).await; // effective hold 0
    peer.expect_keepalive().await;
    peer.send(&keepalive_message()).await;

    // Both timers disabled: no keepalives, no hold expiry
    let mut buf = [0u8; 19];
    let silent = tokio::time::timeout(
        Duration::from_secs(2),
        tokio::io::AsyncReadExt::read_exact(&mut peer.stream, &mut buf),
    )
    .await;
    assert!(silent.is_err(), "expected silence with hold time 0");
}

#[tokio::test]
async fn test_graceful_shutdown_sends_cease() {
    let server = start_test_server(65000, ROUTER_ID, &[], vec![passive_peer(PEER_A, 65001)]).await;

    let mut peer = RawPeer::connect_from(PEER_A, server.bgp_port).await;
    peer.establish(65001, PEER_A, &server).await;

    server.shutdown.shutdown();

    let (code, subcode, _) = peer.expect_notification().await;
    assert_eq!(code, 6); // Cease
    assert_eq!(subcode, 0);
}

#[tokio::test]
async fn test_unconfigured_source_is_closed() {
    // 127.0.0.5 is not a configured peer
    let server = start_test_server(65000, ROUTER_ID, &[], vec![passive_peer(PEER_A, 65001)]).await;

    let mut stranger = RawPeer::connect_from(Ipv4Addr::new(127, 0, 0, 5), server.bgp_port).await;
    stranger.expect_close().await;
}
