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

//! The RIB task. Owns all three table families and serializes the decision
//! process: operations arrive over one queue and each UPDATE is fully
//! applied (Adj-RIB-In write, re-selection, fan-out, kernel sync) before
//! the next is processed, so convergence is deterministic given an arrival
//! order. Peers are addressed through registered op senders, never held
//! directly.

use crate::bgp::msg_update::UpdateMessage;
use crate::bgp::utils::IpNetwork;
use crate::kernel::frame::RouteEvent;
use crate::kernel::KernelHandle;
use crate::peer::outgoing::{build_update, export_path};
use crate::peer::PeerOp;
use crate::rib::rib_in::AdjRibIn;
use crate::rib::rib_loc::LocRib;
use crate::rib::rib_out::AdjRibOut;
use crate::rib::{Path, Route, RouteSource};
use crate::{debug, info, warn};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Table snapshots for introspection.
#[derive(Debug, Clone, Copy)]
pub enum RibQuery {
    LocRib,
    AdjRibIn(IpAddr),
    AdjRibOut(IpAddr),
}

/// Operations accepted by the RIB task.
pub enum RibOp {
    /// Session reached Established: register the peer and publish its
    /// Adj-RIB-Out (the initial UPDATE)
    PeerUp {
        peer_ip: IpAddr,
        peer_asn: u16,
        bgp_id: Ipv4Addr,
        peer_tx: mpsc::UnboundedSender<PeerOp>,
    },
    /// Session stopped: withdraw everything learned from the peer
    PeerDown { peer_ip: IpAddr },
    /// Validated UPDATE from an established peer
    Update {
        peer_ip: IpAddr,
        message: UpdateMessage,
    },
    /// Externally-introduced kernel route change (advisory only)
    KernelEvent(RouteEvent),
    Query {
        query: RibQuery,
        reply: oneshot::Sender<Vec<Route>>,
    },
    /// Registered (established) peers.
    QueryPeers {
        reply: oneshot::Sender<Vec<IpAddr>>,
    },
}

struct PeerToken {
    asn: u16,
    bgp_id: Ipv4Addr,
    tx: mpsc::UnboundedSender<PeerOp>,
}

pub struct RibManager {
    local_asn: u16,
    /// Local address, rewritten as NEXT_HOP toward eBGP peers.
    local_addr: Ipv4Addr,
    route_priority: u32,

    adj_rib_in: HashMap<IpAddr, AdjRibIn>,
    loc_rib: LocRib,
    adj_rib_out: HashMap<IpAddr, AdjRibOut>,

    /// Established peers, addressed by identity token.
    peers: HashMap<IpAddr, PeerToken>,

    /// What we have told the kernel, per prefix.
    installed: HashMap<IpNetwork, Arc<Path>>,
    kernel: KernelHandle,
}

impl RibManager {
    pub fn new(
        local_asn: u16,
        local_addr: Ipv4Addr,
        networks: &[IpNetwork],
        route_priority: u32,
        kernel: KernelHandle,
    ) -> Self {
        let mut loc_rib = LocRib::new();
        for network in networks {
            loc_rib.add_local_route(*network, local_addr);
        }
        RibManager {
            local_asn,
            local_addr,
            route_priority,
            adj_rib_in: HashMap::new(),
            loc_rib,
            adj_rib_out: HashMap::new(),
            peers: HashMap::new(),
            installed: HashMap::new(),
            kernel,
        }
    }

    /// Spawn the RIB task and return its op queue.
    pub fn spawn(self) -> mpsc::UnboundedSender<RibOp> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        tx
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RibOp>) {
        info!("RIB task started", "local_asn" => self.local_asn);

        while let Some(op) = rx.recv().await {
            match op {
                RibOp::PeerUp {
                    peer_ip,
                    peer_asn,
                    bgp_id,
                    peer_tx,
                } => self.handle_peer_up(peer_ip, peer_asn, bgp_id, peer_tx),
                RibOp::PeerDown { peer_ip } => self.handle_peer_down(peer_ip),
                RibOp::Update { peer_ip, message } => self.handle_update(peer_ip, message),
                RibOp::KernelEvent(event) => self.handle_kernel_event(event),
                RibOp::Query { query, reply } => {
                    let _ = reply.send(self.handle_query(query));
                }
                RibOp::QueryPeers { reply } => {
                    let mut peers: Vec<IpAddr> = self.peers.keys().copied().collect();
                    peers.sort();
                    let _ = reply.send(peers);
                }
            }
        }

        info!("RIB task stopped");
    }

    fn handle_peer_up(
        &mut self,
        peer_ip: IpAddr,
        peer_asn: u16,
        bgp_id: Ipv4Addr,
        peer_tx: mpsc::UnboundedSender<PeerOp>,
    ) {
        info!("peer up", "peer_ip" => peer_ip.to_string(), "peer_asn" => peer_asn);
        self.adj_rib_in.entry(peer_ip).or_default();
        let mut rib_out = AdjRibOut::new();

        // Publish the current Loc-RIB heads, batching prefixes that share
        // an exported path into one UPDATE. Locally originated networks
        // ride along here: this is the initial UPDATE of a fresh session.
        let mut batches: Vec<(Arc<Path>, Vec<IpNetwork>)> = Vec::new();
        let mut prefixes = self.loc_rib.prefixes();
        prefixes.sort();
        for prefix in prefixes {
            let Some(best) = self.loc_rib.best_path(&prefix) else {
                continue;
            };
            if best.source.is_from_peer(peer_ip) {
                continue;
            }
            let exported = Arc::new(export_path(best, self.local_asn, self.local_addr, peer_asn));
            rib_out.insert(prefix, Arc::clone(&exported));
            match batches.iter_mut().find(|(path, _)| **path == *exported) {
                Some((_, list)) => list.push(prefix),
                None => batches.push((exported, vec![prefix])),
            }
        }
        for (path, prefixes) in batches {
            let _ = peer_tx.send(PeerOp::SendUpdate(build_update(&path, prefixes)));
        }

        self.adj_rib_out.insert(peer_ip, rib_out);
        self.peers.insert(
            peer_ip,
            PeerToken {
                asn: peer_asn,
                bgp_id,
                tx: peer_tx,
            },
        );
    }

    fn handle_peer_down(&mut self, peer_ip: IpAddr) {
        // Idempotent: teardown fires for sessions that never came up
        let was_registered = self.peers.remove(&peer_ip).is_some();
        self.adj_rib_in.remove(&peer_ip);
        self.adj_rib_out.remove(&peer_ip);

        let mut affected = self.loc_rib.remove_routes_from_peer(peer_ip);
        if !was_registered && affected.is_empty() {
            return;
        }
        info!("peer down", "peer_ip" => peer_ip.to_string(), "affected_prefixes" => affected.len());

        affected.sort();
        for prefix in affected {
            self.sync_kernel(prefix);
            self.fanout(prefix, Some(peer_ip));
        }
    }

    /// The decision process for one UPDATE from peer P: withdraw, insert,
    /// then re-select every dirty prefix.
    fn handle_update(&mut self, peer_ip: IpAddr, message: UpdateMessage) {
        let Some(token) = self.peers.get(&peer_ip) else {
            warn!("UPDATE from unregistered peer", "peer_ip" => peer_ip.to_string());
            return;
        };
        let source = if token.asn == self.local_asn {
            RouteSource::Ibgp {
                peer_ip,
                bgp_id: token.bgp_id,
            }
        } else {
            RouteSource::Ebgp {
                peer_ip,
                bgp_id: token.bgp_id,
            }
        };

        let rib_in = self.adj_rib_in.entry(peer_ip).or_default();
        let mut dirty: Vec<IpNetwork> = Vec::new();

        for prefix in &message.withdrawn_routes {
            rib_in.remove(prefix);
            dirty.push(*prefix);
        }

        if !message.nlri.is_empty() {
            if let Some(path) = Path::from_update(&message, source) {
                let path = Arc::new(path);
                for prefix in &message.nlri {
                    rib_in.insert(*prefix, Arc::clone(&path));
                    dirty.push(*prefix);
                }
            }
        }

        // Mirror the Adj-RIB-In delta into the Loc-RIB candidates
        for prefix in &message.withdrawn_routes {
            self.loc_rib.remove_peer_path(prefix, peer_ip);
        }
        for prefix in &message.nlri {
            let path = self
                .adj_rib_in
                .get(&peer_ip)
                .and_then(|rib| rib.get(prefix))
                .map(Arc::clone);
            if let Some(path) = path {
                self.loc_rib.add_path(*prefix, path);
            }
        }

        dirty.sort();
        dirty.dedup();
        for prefix in dirty {
            self.sync_kernel(prefix);
            self.fanout(prefix, Some(peer_ip));
        }
    }

    /// Reconcile the kernel FIB with the Loc-RIB head for one prefix. Only
    /// peer-learned paths are installed; a replacement deletes the old
    /// route before adding the new one.
    fn sync_kernel(&mut self, prefix: IpNetwork) {
        let new_best = self
            .loc_rib
            .best_path(&prefix)
            .filter(|path| path.source.peer_ip().is_some())
            .map(Arc::clone);

        let old = self.installed.get(&prefix).map(Arc::clone);
        match (old, new_best) {
            (Some(old), Some(new)) if old == new => {}
            (Some(_), Some(new)) => {
                self.kernel.remove(prefix);
                self.kernel
                    .install(prefix, IpAddr::V4(new.next_hop), self.route_priority);
                self.installed.insert(prefix, new);
            }
            (Some(_), None) => {
                self.kernel.remove(prefix);
                self.installed.remove(&prefix);
            }
            (None, Some(new)) => {
                self.kernel
                    .install(prefix, IpAddr::V4(new.next_hop), self.route_priority);
                self.installed.insert(prefix, new);
            }
            (None, None) => {}
        }
    }

    /// Advertise the new best (or a withdrawal) to every established peer
    /// except the one the triggering UPDATE came from and the best path's
    /// originator. Adj-RIB-Out suppresses duplicate advertisements.
    fn fanout(&mut self, prefix: IpNetwork, from: Option<IpAddr>) {
        let best = self.loc_rib.best_path(&prefix).map(Arc::clone);
        let originator = best.as_ref().and_then(|path| path.source.peer_ip());

        let mut targets: Vec<IpAddr> = self.peers.keys().copied().collect();
        targets.sort();

        for target in targets {
            if Some(target) == from || Some(target) == originator {
                continue;
            }
            let token = &self.peers[&target];
            let rib_out = self.adj_rib_out.entry(target).or_default();

            match &best {
                Some(best) => {
                    let exported =
                        Arc::new(export_path(best, self.local_asn, self.local_addr, token.asn));
                    let duplicate = rib_out
                        .get(&prefix)
                        .is_some_and(|advertised| *advertised == exported);
                    if duplicate {
                        continue;
                    }
                    rib_out.insert(prefix, Arc::clone(&exported));
                    let update = build_update(&exported, vec![prefix]);
                    let _ = token.tx.send(PeerOp::SendUpdate(update));
                }
                None => {
                    if rib_out.remove(&prefix) {
                        let update = UpdateMessage::new_withdraw(vec![prefix]);
                        let _ = token.tx.send(PeerOp::SendUpdate(update));
                    }
                }
            }
        }
    }

    /// Kernel notifications do not alter BGP state; they are logged for
    /// the operator.
    fn handle_kernel_event(&mut self, event: RouteEvent) {
        match event {
            RouteEvent::Add(route) => {
                debug!("kernel route added externally",
                    "prefix" => route.prefix.to_string(),
                    "gateway" => route.gateway.to_string());
            }
            RouteEvent::Del(route) => {
                debug!("kernel route deleted externally",
                    "prefix" => route.prefix.to_string());
            }
            RouteEvent::Err(message) => {
                warn!("kernel route monitor error", "error" => message);
            }
        }
    }

    fn handle_query(&self, query: RibQuery) -> Vec<Route> {
        match query {
            RibQuery::LocRib => self.loc_rib.get_all_routes(),
            RibQuery::AdjRibIn(peer_ip) => self
                .adj_rib_in
                .get(&peer_ip)
                .map(|rib| rib.get_all_routes())
                .unwrap_or_default(),
            RibQuery::AdjRibOut(peer_ip) => self
                .adj_rib_out
                .get(&peer_ip)
                .map(|rib| rib.get_all_routes())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::msg_update_types::{AsPathSegment, Origin};
    use crate::kernel::frame::RouteCommand;

    const LOCAL_ASN: u16 = 65000;
    const LOCAL_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    struct Harness {
        manager: RibManager,
        kernel_rx: mpsc::UnboundedReceiver<RouteCommand>,
    }

    fn harness(networks: &[IpNetwork]) -> Harness {
        let (kernel_tx, kernel_rx) = mpsc::unbounded_channel();
        let manager = RibManager::new(
            LOCAL_ASN,
            LOCAL_ADDR,
            networks,
            100,
            KernelHandle::from_channel(kernel_tx),
        );
        Harness { manager, kernel_rx }
    }

    fn peer(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn register_peer(
        manager: &mut RibManager,
        last: u8,
        asn: u16,
    ) -> mpsc::UnboundedReceiver<PeerOp> {
        let (tx, rx) = mpsc::unbounded_channel();
        manager.handle_peer_up(peer(last), asn, Ipv4Addr::new(192, 0, 2, last), tx);
        rx
    }

    fn announce(nlri: &str, as_path: Vec<u16>, local_pref: Option<u32>, next_hop: u8) -> UpdateMessage {
        UpdateMessage::new(
            Origin::Igp,
            vec![AsPathSegment::sequence(as_path)],
            Ipv4Addr::new(192, 0, 2, next_hop),
            vec![nlri.parse().unwrap()],
            local_pref,
            None,
            false,
            vec![],
        )
    }

    fn recv_update(rx: &mut mpsc::UnboundedReceiver<PeerOp>) -> UpdateMessage {
        match rx.try_recv() {
            Ok(PeerOp::SendUpdate(update)) => update,
            _ => panic!("expected a queued SendUpdate"),
        }
    }

    #[tokio::test]
    async fn test_peer_up_publishes_local_networks() {
        let networks: Vec<IpNetwork> = vec!["10.1.0.0/24".parse().unwrap()];
        let mut h = harness(&networks);

        let mut rx = register_peer(&mut h.manager, 2, 65001);

        let update = recv_update(&mut rx);
        assert_eq!(update.nlri, networks);
        // eBGP export: our ASN prepended onto the empty local path, our
        // address as NEXT_HOP
        assert_eq!(
            update.get_as_path(),
            Some(&vec![AsPathSegment::sequence(vec![LOCAL_ASN])])
        );
        assert_eq!(update.get_next_hop(), Some(LOCAL_ADDR));
    }

    #[tokio::test]
    async fn test_update_propagates_with_ebgp_transform() {
        let mut h = harness(&[]);
        let mut rx_a = register_peer(&mut h.manager, 2, 65001);
        let mut rx_b = register_peer(&mut h.manager, 3, 65002);

        h.manager
            .handle_update(peer(2), announce("10.9.0.0/24", vec![65001], None, 2));

        // Sender gets nothing back
        assert!(rx_a.try_recv().is_err());

        let update = recv_update(&mut rx_b);
        assert_eq!(update.nlri, vec!["10.9.0.0/24".parse::<IpNetwork>().unwrap()]);
        assert_eq!(
            update.get_as_path(),
            Some(&vec![AsPathSegment::sequence(vec![LOCAL_ASN, 65001])])
        );
        assert_eq!(update.get_next_hop(), Some(LOCAL_ADDR));
        assert_eq!(update.get_local_pref(), None);
    }

    #[tokio::test]
    async fn test_kernel_install_on_best_path() {
        let mut h = harness(&[]);
        let _rx = register_peer(&mut h.manager, 2, 65001);

        h.manager
            .handle_update(peer(2), announce("10.9.0.0/24", vec![65001], None, 2));

        match h.kernel_rx.try_recv().unwrap() {
            RouteCommand::Add {
                prefix,
                gateway,
                priority,
            } => {
                assert_eq!(prefix, "10.9.0.0/24".parse::<IpNetwork>().unwrap());
                assert_eq!(gateway, "192.0.2.2".parse::<IpAddr>().unwrap());
                assert_eq!(priority, 100);
            }
            other => panic!("expected Add, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_better_path_emits_del_then_add() {
        let mut h = harness(&[]);
        let _rx_a = register_peer(&mut h.manager, 2, 65001);
        let _rx_b = register_peer(&mut h.manager, 3, 65001);

        // Peer A first with the short path
        h.manager.handle_update(
            peer(2),
            announce("10.9.0.0/24", vec![65001, 65010], Some(100), 2),
        );
        assert!(matches!(
            h.kernel_rx.try_recv().unwrap(),
            RouteCommand::Add { .. }
        ));

        // Peer B with a longer AS_PATH: loses, no kernel churn
        h.manager.handle_update(
            peer(3),
            announce(
                "10.9.0.0/24",
                vec![65001, 65011, 65012, 65013],
                Some(100),
                3,
            ),
        );
        assert!(h.kernel_rx.try_recv().is_err());

        // B raises LOCAL_PREF: now best; replacement is DEL then ADD
        h.manager.handle_update(
            peer(3),
            announce(
                "10.9.0.0/24",
                vec![65001, 65011, 65012, 65013],
                Some(200),
                3,
            ),
        );
        match h.kernel_rx.try_recv().unwrap() {
            RouteCommand::Del { prefix } => {
                assert_eq!(prefix, "10.9.0.0/24".parse::<IpNetwork>().unwrap());
            }
            other => panic!("expected Del first, got {:?}", other),
        }
        match h.kernel_rx.try_recv().unwrap() {
            RouteCommand::Add { gateway, .. } => {
                assert_eq!(gateway, "192.0.2.3".parse::<IpAddr>().unwrap());
            }
            other => panic!("expected Add second, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_withdraw_falls_back_to_next_best() {
        let mut h = harness(&[]);
        let _rx_a = register_peer(&mut h.manager, 2, 65001);
        let _rx_b = register_peer(&mut h.manager, 3, 65001);

        h.manager
            .handle_update(peer(2), announce("10.9.0.0/24", vec![65001], Some(200), 2));
        h.manager
            .handle_update(peer(3), announce("10.9.0.0/24", vec![65001], Some(100), 3));
        // Drain the initial install
        let _ = h.kernel_rx.try_recv();

        // Withdraw the winning path: B's takes over
        h.manager
            .handle_update(peer(2), UpdateMessage::new_withdraw(vec!["10.9.0.0/24".parse().unwrap()]));

        assert!(matches!(
            h.kernel_rx.try_recv().unwrap(),
            RouteCommand::Del { .. }
        ));
        match h.kernel_rx.try_recv().unwrap() {
            RouteCommand::Add { gateway, .. } => {
                assert_eq!(gateway, "192.0.2.3".parse::<IpAddr>().unwrap());
            }
            other => panic!("expected Add, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_down_withdraws_everywhere() {
        let mut h = harness(&[]);
        let _rx_a = register_peer(&mut h.manager, 2, 65001);
        let mut rx_b = register_peer(&mut h.manager, 3, 65002);

        h.manager
            .handle_update(peer(2), announce("10.9.0.0/24", vec![65001], None, 2));
        let _ = recv_update(&mut rx_b); // the announcement
        let _ = h.kernel_rx.try_recv(); // the install

        h.manager.handle_peer_down(peer(2));

        // Loc-RIB no longer references the peer
        assert!(h.manager.handle_query(RibQuery::LocRib).is_empty());
        assert!(h
            .manager
            .handle_query(RibQuery::AdjRibIn(peer(2)))
            .is_empty());

        // Kernel route removed, withdrawal propagated
        assert!(matches!(
            h.kernel_rx.try_recv().unwrap(),
            RouteCommand::Del { .. }
        ));
        let withdraw = recv_update(&mut rx_b);
        assert_eq!(
            withdraw.withdrawn_routes,
            vec!["10.9.0.0/24".parse::<IpNetwork>().unwrap()]
        );
        assert!(withdraw.nlri.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_advertisement_suppressed() {
        let mut h = harness(&[]);
        let _rx_a = register_peer(&mut h.manager, 2, 65001);
        let mut rx_b = register_peer(&mut h.manager, 3, 65002);

        let update = announce("10.9.0.0/24", vec![65001], None, 2);
        h.manager.handle_update(peer(2), update.clone());
        let _ = recv_update(&mut rx_b);

        // Re-announcing the same path produces no second advertisement
        h.manager.handle_update(peer(2), update);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ibgp_transform_preserves_attributes() {
        let mut h = harness(&[]);
        let _rx_a = register_peer(&mut h.manager, 2, 65001);
        // iBGP peer shares our ASN
        let mut rx_b = register_peer(&mut h.manager, 3, LOCAL_ASN);

        h.manager
            .handle_update(peer(2), announce("10.9.0.0/24", vec![65001], None, 2));

        let update = recv_update(&mut rx_b);
        assert_eq!(
            update.get_as_path(),
            Some(&vec![AsPathSegment::sequence(vec![65001])])
        );
        // NEXT_HOP preserved toward iBGP
        assert_eq!(
            update.get_next_hop(),
            Some(Ipv4Addr::new(192, 0, 2, 2))
        );
    }

    #[tokio::test]
    async fn test_update_from_unregistered_peer_ignored() {
        let mut h = harness(&[]);
        h.manager
            .handle_update(peer(9), announce("10.9.0.0/24", vec![65001], None, 9));
        assert!(h.manager.handle_query(RibQuery::LocRib).is_empty());
        assert!(h.kernel_rx.try_recv().is_err());
    }
}
