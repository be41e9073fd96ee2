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

//! Common test utilities: a speaker under test plus raw-socket peers that
//! speak hand-built BGP messages.

#![allow(dead_code)]

use bgpr::config::{Config, PeerConfig};
use bgpr::kernel::frame::RouteCommand;
use bgpr::kernel::KernelHandle;
use bgpr::rib::manager::{RibOp, RibQuery};
use bgpr::rib::Route;
use bgpr::server::{BgpServer, ShutdownHandle};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, oneshot};

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub bgp_port: u16,
    pub asn: u16,
    pub router_id: Ipv4Addr,
    pub rib: mpsc::UnboundedSender<RibOp>,
    pub kernel_rx: mpsc::UnboundedReceiver<RouteCommand>,
    pub shutdown: ShutdownHandle,
}

/// Start a speaker on an ephemeral loopback port with the given networks
/// and peers. Kernel commands are captured on a channel instead of
/// touching netlink.
pub async fn start_test_server(
    asn: u16,
    router_id: Ipv4Addr,
    networks: &[&str],
    peers: Vec<PeerConfig>,
) -> TestServer {
    // Reserve a free port, then hand it to the server
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bgp_port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut config = Config::default();
    config.asn = asn;
    config.router_id = router_id;
    config.listen_addr = format!("127.0.0.1:{}", bgp_port);
    config.networks = networks.iter().map(|n| n.parse().unwrap()).collect();
    config.peers = peers;

    let (kernel_tx, kernel_rx) = mpsc::unbounded_channel();
    let (_event_tx, event_rx) = mpsc::unbounded_channel();
    let server =
        BgpServer::with_kernel(config, KernelHandle::from_channel(kernel_tx), event_rx).unwrap();
    let rib = server.rib_handle();
    let shutdown = server.shutdown_handle();
    tokio::spawn(server.run());

    // Wait for the listener to come up
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", bgp_port)).await.is_ok() {
            return TestServer {
                bgp_port,
                asn,
                router_id,
                rib,
                kernel_rx,
                shutdown,
            };
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("test server did not start listening");
}

/// Passive peer config: the speaker waits for us to connect.
pub fn passive_peer(address: Ipv4Addr, asn: u16) -> PeerConfig {
    let mut config = PeerConfig::new(address, asn);
    config.establishment = bgpr::config::Establishment::Passive;
    config
}

/// A raw TCP endpoint acting as the remote BGP speaker.
pub struct RawPeer {
    pub stream: TcpStream,
}

impl RawPeer {
    /// Connect to the speaker from a specific loopback source address so
    /// the acceptor maps us onto the matching configured peer.
    pub async fn connect_from(source: Ipv4Addr, bgp_port: u16) -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind(format!("{}:0", source).parse().unwrap()).unwrap();
        let stream = socket
            .connect(format!("127.0.0.1:{}", bgp_port).parse().unwrap())
            .await
            .unwrap();
        RawPeer { stream }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Read one message; returns (type, body).
    pub async fn read_message(&mut self) -> (u8, Vec<u8>) {
        let mut header = [0u8; 19];
        tokio::time::timeout(READ_TIMEOUT, self.stream.read_exact(&mut header))
            .await
            .expect("timed out waiting for a message")
            .unwrap();
        assert_eq!(&header[0..16], &[0xff; 16], "bad marker");
        let length = u16::from_be_bytes([header[16], header[17]]) as usize;
        let mut body = vec![0u8; length - 19];
        if !body.is_empty() {
            tokio::time::timeout(READ_TIMEOUT, self.stream.read_exact(&mut body))
                .await
                .expect("timed out waiting for a message body")
                .unwrap();
        }
        (header[18], body)
    }

    pub async fn expect_open(&mut self) -> (u16, u16, u32) {
        let (kind, body) = self.read_message().await;
        assert_eq!(kind, 1, "expected OPEN");
        let asn = u16::from_be_bytes([body[1], body[2]]);
        let hold_time = u16::from_be_bytes([body[3], body[4]]);
        let bgp_id = u32::from_be_bytes([body[5], body[6], body[7], body[8]]);
        (asn, hold_time, bgp_id)
    }

    pub async fn expect_keepalive(&mut self) {
        let (kind, body) = self.read_message().await;
        assert_eq!(kind, 4, "expected KEEPALIVE");
        assert!(body.is_empty());
    }

    /// Returns (code, subcode, data).
    pub async fn expect_notification(&mut self) -> (u8, u8, Vec<u8>) {
        let (kind, body) = self.read_message().await;
        assert_eq!(kind, 3, "expected NOTIFICATION");
        (body[0], body[1], body[2..].to_vec())
    }

    /// Returns the raw UPDATE body.
    pub async fn expect_update(&mut self) -> Vec<u8> {
        let (kind, body) = self.read_message().await;
        assert_eq!(kind, 2, "expected UPDATE");
        body
    }

    /// The remote closed the connection.
    pub async fn expect_close(&mut self) {
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(READ_TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap();
        assert_eq!(n, 0, "expected the connection to close");
    }

    /// Run the OPEN/KEEPALIVE handshake to Established from our side, and
    /// wait until the speaker's RIB has registered the session.
    pub async fn establish(&mut self, my_asn: u16, my_addr: Ipv4Addr, server: &TestServer) {
        let (asn, _hold, bgp_id) = self.expect_open().await;
        assert_eq!(asn, server.asn);
        assert_eq!(bgp_id, u32::from(server.router_id));
        self.send(&open_message(my_asn, 90, my_addr)).await;
        self.expect_keepalive().await;
        self.send(&keepalive_message()).await;
        wait_for_peer_registered(&server.rib, my_addr).await;
    }
}

/// Poll until the RIB task has the peer registered for fan-out.
pub async fn wait_for_peer_registered(
    rib: &mpsc::UnboundedSender<RibOp>,
    address: Ipv4Addr,
) {
    for _ in 0..250 {
        let (tx, rx) = oneshot::channel();
        rib.send(RibOp::QueryPeers { reply: tx }).unwrap();
        let peers = rx.await.unwrap();
        if peers.contains(&address.into()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("peer {} never registered with the RIB", address);
}

fn header(length: u16, kind: u8) -> Vec<u8> {
    let mut bytes = vec![0xff; 16];
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.push(kind);
    bytes
}

pub fn open_message(asn: u16, hold_time: u16, bgp_id: Ipv4Addr) -> Vec<u8> {
    let mut bytes = header(29, 1);
    bytes.push(4); // version
    bytes.extend_from_slice(&asn.to_be_bytes());
    bytes.extend_from_slice(&hold_time.to_be_bytes());
    bytes.extend_from_slice(&u32::from(bgp_id).to_be_bytes());
    bytes.push(0); // optional parameters length
    bytes
}

pub fn keepalive_message() -> Vec<u8> {
    header(19, 4)
}

/// Announcement with ORIGIN IGP, an AS_SEQUENCE path, and one prefix per
/// entry of `nlri` (encoded length-prefixed).
pub fn update_message(as_path: &[u16], next_hop: Ipv4Addr, nlri: &[(u8, &[u8])]) -> Vec<u8> {
    let mut attrs: Vec<u8> = Vec::new();
    // ORIGIN
    attrs.extend_from_slice(&[0x40, 0x01, 0x01, 0x00]);
    // AS_PATH
    let mut path_val = vec![0x02, as_path.len() as u8];
    for asn in as_path {
        path_val.extend_from_slice(&asn.to_be_bytes());
    }
    attrs.extend_from_slice(&[0x40, 0x02, path_val.len() as u8]);
    attrs.extend_from_slice(&path_val);
    // NEXT_HOP
    attrs.extend_from_slice(&[0x40, 0x03, 0x04]);
    attrs.extend_from_slice(&next_hop.octets());

    update_message_with_attrs(&attrs, nlri)
}

/// UPDATE from a raw attribute block and NLRI entries.
pub fn update_message_with_attrs(attrs: &[u8], nlri: &[(u8, &[u8])]) -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();
    body.extend_from_slice(&0u16.to_be_bytes()); // withdrawn routes length
    body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    body.extend_from_slice(attrs);
    for (len, addr) in nlri {
        body.push(*len);
        body.extend_from_slice(addr);
    }

    let mut bytes = header(19 + body.len() as u16, 2);
    bytes.extend_from_slice(&body);
    bytes
}

pub fn withdraw_message(nlri: &[(u8, &[u8])]) -> Vec<u8> {
    let mut withdrawn: Vec<u8> = Vec::new();
    for (len, addr) in nlri {
        withdrawn.push(*len);
        withdrawn.extend_from_slice(addr);
    }
    let mut body: Vec<u8> = Vec::new();
    body.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
    body.extend_from_slice(&withdrawn);
    body.extend_from_slice(&0u16.to_be_bytes()); // no path attributes

    let mut bytes = header(19 + body.len() as u16, 2);
    bytes.extend_from_slice(&body);
    bytes
}

pub async fn query_rib(rib: &mpsc::UnboundedSender<RibOp>, query: RibQuery) -> Vec<Route> {
    let (tx, rx) = oneshot::channel();
    rib.send(RibOp::Query { query, reply: tx }).unwrap();
    rx.await.unwrap()
}

/// Poll the Loc-RIB until the predicate holds or a timeout elapses.
pub async fn wait_for_loc_rib<F>(rib: &mpsc::UnboundedSender<RibOp>, predicate: F) -> Vec<Route>
where
    F: Fn(&[Route]) -> bool,
{
    for _ in 0..250 {
        let routes = query_rib(rib, RibQuery::LocRib).await;
        if predicate(&routes) {
            return routes;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Loc-RIB did not reach the expected state");
}
