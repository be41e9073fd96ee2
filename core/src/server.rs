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

//! The speaker: owns the listening socket and the peer registry, spawns
//! the RIB task, the kernel monitor and one task per configured peer, and
//! demultiplexes inbound connections to the matching peer by remote
//! address.

use crate::config::Config;
use crate::kernel::frame::RouteEvent;
use crate::kernel::{self, KernelHandle};
use crate::peer::{Peer, PeerOp};
use crate::rib::manager::{RibManager, RibOp};
use crate::{debug, error, info};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Errors that can occur during server initialization or operation.
#[derive(Debug)]
pub enum ServerError {
    InvalidListenAddr(String),
    BindError(io::Error),
    IoError(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidListenAddr(addr) => write!(f, "invalid listen address: {}", addr),
            ServerError::BindError(e) => write!(f, "failed to bind listener: {}", e),
            ServerError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

/// Requests a clean shutdown of a running server.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

pub struct BgpServer {
    config: Config,
    local_ip: Ipv4Addr,

    rib_tx: mpsc::UnboundedSender<RibOp>,
    rib_rx: Option<mpsc::UnboundedReceiver<RibOp>>,

    /// Test hook: a pre-built kernel channel instead of the real monitor.
    kernel_override: Option<(KernelHandle, mpsc::UnboundedReceiver<RouteEvent>)>,

    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Established and establishing peers, by configured address.
    peers: HashMap<Ipv4Addr, mpsc::UnboundedSender<PeerOp>>,
}

impl BgpServer {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let local_ip = config
            .local_ip()
            .map_err(|_| ServerError::InvalidListenAddr(config.listen_addr.clone()))?;
        let (rib_tx, rib_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        Ok(BgpServer {
            config,
            local_ip,
            rib_tx,
            rib_rx: Some(rib_rx),
            kernel_override: None,
            shutdown_tx,
            shutdown_rx,
            peers: HashMap::new(),
        })
    }

    /// Build a server with an externally supplied kernel channel (used by
    /// tests to observe route commands without touching netlink).
    pub fn with_kernel(
        config: Config,
        kernel: KernelHandle,
        events: mpsc::UnboundedReceiver<RouteEvent>,
    ) -> Result<Self, ServerError> {
        let mut server = Self::new(config)?;
        server.kernel_override = Some((kernel, events));
        Ok(server)
    }

    /// Queue handle for RIB operations and queries.
    pub fn rib_handle(&self) -> mpsc::UnboundedSender<RibOp> {
        self.rib_tx.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run until shutdown. Startup failures (bad address, bind failure)
    /// are fatal; a kernel monitor failure is logged and routing continues
    /// without FIB sync.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(ServerError::BindError)?;
        info!("listening",
            "addr" => &self.config.listen_addr,
            "asn" => self.config.asn,
            "router_id" => self.config.router_id.to_string());

        let (kernel, mut kernel_events) = self.start_kernel_monitor();

        let manager = RibManager::new(
            self.config.asn,
            self.local_ip,
            &self.config.networks,
            self.config.route_priority,
            kernel,
        );
        let rib_rx = self.rib_rx.take().expect("server can only run once");
        tokio::spawn(manager.run(rib_rx));

        // Pump monitor events into the RIB queue so they share the same
        // total order as peer updates
        let event_rib_tx = self.rib_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = kernel_events.recv().await {
                if event_rib_tx.send(RibOp::KernelEvent(event)).is_err() {
                    break;
                }
            }
        });

        for peer_config in self.config.peers.clone() {
            self.spawn_peer(peer_config);
        }

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote)) => self.accept_connection(stream, remote),
                    Err(e) => {
                        error!("accept failed", "error" => e.to_string());
                    }
                },
                _ = self.shutdown_rx.recv() => {
                    info!("shutting down", "peers" => self.peers.len());
                    for peer_tx in self.peers.values() {
                        let _ = peer_tx.send(PeerOp::Shutdown);
                    }
                    // Listener closes on drop
                    return Ok(());
                }
            }
        }
    }

    fn start_kernel_monitor(&mut self) -> (KernelHandle, mpsc::UnboundedReceiver<RouteEvent>) {
        if let Some(prebuilt) = self.kernel_override.take() {
            return prebuilt;
        }
        match &self.config.route_monitor {
            Some(path) => match kernel::spawn_helper(path) {
                Ok(spawned) => spawned,
                Err(e) => {
                    error!("failed to start kernel route helper",
                        "path" => path,
                        "error" => e.to_string());
                    let (_tx, rx) = mpsc::unbounded_channel();
                    (KernelHandle::disabled(), rx)
                }
            },
            None => kernel::spawn_embedded(),
        }
    }

    fn spawn_peer(&mut self, peer_config: crate::config::PeerConfig) {
        let address = peer_config.address;
        info!("configuring peer",
            "peer_ip" => address.to_string(),
            "peer_asn" => peer_config.asn,
            "establishment" => format!("{:?}", peer_config.establishment));

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peer = Peer::new(
            peer_config,
            &self.config,
            peer_rx,
            peer_tx.clone(),
            self.rib_tx.clone(),
        );
        self.peers.insert(address, peer_tx);
        tokio::spawn(peer.run());
    }

    /// Hand an accepted socket to the matching peer task. Connections from
    /// unconfigured sources are closed by dropping them; a peer that
    /// already has a live transport drops the duplicate itself.
    fn accept_connection(&mut self, stream: TcpStream, remote: SocketAddr) {
        let IpAddr::V4(remote_ip) = remote.ip() else {
            debug!("rejecting non-IPv4 connection", "remote" => remote.to_string());
            return;
        };
        match self.peers.get(&remote_ip) {
            Some(peer_tx) => {
                debug!("inbound connection", "peer_ip" => remote_ip.to_string());
                let (tcp_rx, tcp_tx) = stream.into_split();
                if peer_tx.send(PeerOp::Accepted { tcp_rx, tcp_tx }).is_err() {
                    error!("peer task gone, dropping connection",
                        "peer_ip" => remote_ip.to_string());
                }
            }
            None => {
                debug!("rejecting connection from unconfigured source",
                    "remote" => remote.to_string());
            }
        }
    }
}
