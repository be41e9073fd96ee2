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

use super::fsm::{BgpState, FsmEvent};
use super::{Peer, PeerOp};
use crate::bgp::msg::{read_bgp_message, BgpMessage};
use crate::bgp::msg_update::UpdateMessage;
use crate::rib::manager::RibOp;
use crate::{debug, error};
use std::time::Duration;

impl Peer {
    /// Established: exchanging UPDATEs. Every inbound message restarts the
    /// hold timer; validated UPDATEs are handed to the RIB task with our
    /// identity attached. Returns true on shutdown.
    pub(super) async fn handle_established_state(&mut self) -> bool {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            let Some(conn) = self.conn.as_mut() else {
                self.fsm.handle_event(FsmEvent::TcpFatal);
                self.session_teardown();
                return false;
            };

            tokio::select! {
                result = read_bgp_message(&mut conn.rx) => match result {
                    Ok(BgpMessage::Update(update)) => {
                        self.statistics.update_received += 1;
                        self.fsm.timers.restart_hold_timer();
                        self.update_received(update).await;
                    }
                    Ok(BgpMessage::KeepAlive(_)) => {
                        self.statistics.keepalive_received += 1;
                        self.fsm.timers.restart_hold_timer();
                        self.fsm.handle_event(FsmEvent::KeepaliveReceived);
                    }
                    Ok(BgpMessage::Notification(notif)) => {
                        self.statistics.notification_received += 1;
                        error!("NOTIFICATION received",
                            "peer_ip" => self.addr.to_string(),
                            "notification" => notif.to_string());
                        self.fsm.handle_event(FsmEvent::NotificationReceived);
                        self.session_teardown();
                    }
                    Ok(BgpMessage::Open(_)) => {
                        self.statistics.open_received += 1;
                        self.fsm_error_stop(FsmEvent::OpenReceived).await;
                    }
                    Err(e) => self.read_failed(e).await,
                },
                op = self.peer_rx.recv() => match op {
                    None | Some(PeerOp::Shutdown) => {
                        self.cease_stop().await;
                        return true;
                    }
                    Some(PeerOp::SendUpdate(update)) => {
                        if let Err(e) = self.send_update(&update).await {
                            error!("failed to send UPDATE",
                                "peer_ip" => self.addr.to_string(),
                                "error" => e.to_string());
                            self.fsm.handle_event(FsmEvent::TcpFatal);
                            self.session_teardown();
                        }
                    }
                    Some(PeerOp::Accepted { .. }) => {
                        debug!("rejecting duplicate connection",
                            "peer_ip" => self.addr.to_string());
                    }
                },
                _ = tick.tick() => {
                    if self.fsm.timers.keepalive_timer_expired() {
                        self.fsm.timers.restart_keepalive_timer();
                        if self.send_keepalive().await.is_err() {
                            self.fsm.handle_event(FsmEvent::TcpFatal);
                            self.session_teardown();
                        }
                    }
                    if self.fsm.timers.hold_timer_expired() {
                        self.hold_expired_stop().await;
                    }
                }
            }

            if self.fsm.state() != BgpState::Established {
                return false;
            }
        }
    }

    /// Validated UPDATEs go to the RIB with the advertising-peer identity;
    /// validation failures produce the NOTIFICATION and stop the session.
    pub(super) async fn update_received(&mut self, update: UpdateMessage) {
        match update.validate(self.local_asn) {
            Ok(()) => {
                debug!("UPDATE received",
                    "peer_ip" => self.addr.to_string(),
                    "announced" => update.nlri.len(),
                    "withdrawn" => update.withdrawn_routes.len());
                let _ = self.rib_tx.send(RibOp::Update {
                    peer_ip: self.addr.into(),
                    message: update,
                });
                self.fsm.handle_event(FsmEvent::UpdateReceived);
            }
            Err(e) => self.handle_protocol_error(&e).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::create_test_peer_in_state;
    use super::*;
    use crate::bgp::msg_update_types::{AsPathSegment, Origin};
    use std::net::Ipv4Addr;

    fn valid_update() -> UpdateMessage {
        UpdateMessage::new(
            Origin::Igp,
            vec![AsPathSegment::sequence(vec![65001])],
            Ipv4Addr::new(192, 0, 2, 9),
            vec!["10.9.0.0/24".parse().unwrap()],
            None,
            None,
            false,
            vec![],
        )
    }

    #[tokio::test]
    async fn test_update_received_forwards_to_rib() {
        let (mut peer, _tx, mut rib_rx) = create_test_peer_in_state(BgpState::Established);
        peer.update_received(valid_update()).await;

        assert_eq!(peer.state(), BgpState::Established);
        match rib_rx.recv().await {
            Some(RibOp::Update { peer_ip, message }) => {
                assert_eq!(peer_ip, std::net::IpAddr::from(peer.addr));
                assert_eq!(message.nlri.len(), 1);
            }
            _ => panic!("expected RibOp::Update"),
        }
    }

    #[tokio::test]
    async fn test_update_with_own_asn_stops_session() {
        let (mut peer, _tx, mut rib_rx) = create_test_peer_in_state(BgpState::Established);
        // AS_PATH contains the local ASN: routing loop
        let update = UpdateMessage::new(
            Origin::Igp,
            vec![AsPathSegment::sequence(vec![65001, 65000])],
            Ipv4Addr::new(192, 0, 2, 9),
            vec!["10.9.0.0/24".parse().unwrap()],
            None,
            None,
            false,
            vec![],
        );
        peer.update_received(update).await;

        assert_eq!(peer.state(), BgpState::Idle);
        // The only RIB message is the teardown withdraw
        match rib_rx.recv().await {
            Some(RibOp::PeerDown { peer_ip }) => {
                assert_eq!(peer_ip, std::net::IpAddr::from(peer.addr));
            }
            _ => panic!("expected PeerDown"),
        }
    }
}
