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

//! OPEN validation against the configured peer (RFC 4271 Section 6.2):
//! version, ASN, hold time, BGP identifier, optional parameters.

mod common;

use common::*;
use std::net::Ipv4Addr;

const ROUTER_ID: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
const PEER_A: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);

async fn connect_peer() -> (TestServer, RawPeer) {
    let server = start_test_server(65000, ROUTER_ID, &[], vec![passive_peer(PEER_A, 65001)]).await;
    let mut peer = RawPeer::connect_from(PEER_A, server.bgp_port).await;
    let _ = peer.expect_open().await;
    (server, peer)
}

#[tokio::test]
async fn test_valid_open_is_accepted() {
    let (_server, mut peer) = connect_peer().await;
    peer.send(&open_message(65001, 90, PEER_A)).await;
    peer.expect_keepalive().await;
}

#[tokio::test]
async fn test_unsupported_version() {
    let (_server, mut peer) = connect_peer().await;

    let mut message = open_message(65001, 90, PEER_A);
    message[19] = 3; // version field
    peer.send(&message).await;

    let (code, subcode, data) = peer.expect_notification().await;
    assert_eq!(code, 2);
    assert_eq!(subcode, 1); // Unsupported Version Number
    assert_eq!(data, vec![0x00, 0x04]); // largest supported version
    peer.expect_close().await;
}

#[tokio::test]
async fn test_bad_peer_asn() {
    let (_server, mut peer) = connect_peer().await;

    // ASN 65002 does not match the configured 65001
    peer.send(&open_message(65002, 90, PEER_A)).await;

    let (code, subcode, data) = peer.expect_notification().await;
    assert_eq!(code, 2);
    assert_eq!(subcode, 2); // Bad Peer AS
    assert_eq!(data, 65002u16.to_be_bytes().to_vec());
    peer.expect_close().await;
}

#[tokio::test]
async fn test_unacceptable_hold_time() {
    for hold_time in [1u16, 2] {
        let (_server, mut peer) = connect_peer().await;
        peer.send(&open_message(65001, hold_time, PEER_A)).await;

        let (code, subcode, _) = peer.expect_notification().await;
        assert_eq!(code, 2);
        assert_eq!(subcode, 6); // Unacceptable Hold Time
        peer.expect_close().await;
    }
}

#[tokio::test]
async fn test_bad_bgp_identifier() {
    let (_server, mut peer) = connect_peer().await;

    // Identifier does not match the configured peer address
    peer.send(&open_message(65001, 90, Ipv4Addr::new(9, 9, 9, 9)))
        .await;

    let (code, subcode, _) = peer.expect_notification().await;
    assert_eq!(code, 2);
    assert_eq!(subcode, 3); // Bad BGP Identifier
    peer.expect_close().await;
}

#[tokio::test]
async fn test_unsupported_optional_parameter() {
    let (_server, mut peer) = connect_peer().await;

    // Capabilities (type 2) are not negotiated by this speaker
    let mut message = open_message(65001, 90, PEER_A);
    let param: &[u8] = &[0x02, 0x02, 0x01, 0x04];
    message[28] = param.len() as u8; // optional parameters length
    message.extend_from_slice(param);
    let new_len = (message.len()) as u16;
    message[16..18].copy_from_slice(&new_len.to_be_bytes());
    peer.send(&message).await;

    let (code, subcode, _) = peer.expect_notification().await;
    assert_eq!(code, 2);
    assert_eq!(subcode, 4); // Unsupported Optional Parameter
    peer.expect_close().await;
}

#[tokio::test]
async fn test_deprecated_auth_parameter_accepted() {
    let (_server, mut peer) = connect_peer().await;

    // Authentication (type 1) passes through unverified
    let mut message = open_message(65001, 90, PEER_A);
    let param: &[u8] = &[0x01, 0x03, 0xaa, 0xbb, 0xcc];
    message[28] = param.len() as u8;
    message.extend_from_slice(param);
    let new_len = (message.len()) as u16;
    message[16..18].copy_from_slice(&new_len.to_be_bytes());
    peer.send(&message).await;

    peer.expect_keepalive().await;
}
