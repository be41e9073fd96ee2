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
use crate::rib::manager::RibOp;
use crate::{debug, error, info};
use std::time::Duration;

impl Peer {
    /// OpenConfirm: both OPENs exchanged, waiting for the peer's
    /// KEEPALIVE. Returns true on shutdown.
    pub(super) async fn handle_openconfirm_state(&mut self) -> bool {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            let Some(conn) = self.conn.as_mut() else {
                self.fsm.handle_event(FsmEvent::TcpFatal);
                self.session_teardown();
                return false;
            };

            tokio::select! {
                result = read_bgp_message(&mut conn.rx) => match result {
                    Ok(BgpMessage::KeepAlive(_)) => {
                        self.statistics.keepalive_received += 1;
                        self.fsm.handle_event(FsmEvent::KeepaliveReceived);
                        self.session_established();
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
                    Ok(BgpMessage::Update(_)) => {
                        self.statistics.update_received += 1;
                        self.fsm_error_stop(FsmEvent::UpdateReceived).await;
                    }
                    Err(e) => self.read_failed(e).await,
                },
                op = self.peer_rx.recv() => match op {
                    None | Some(PeerOp::Shutdown) => {
                        self.cease_stop().await;
                        return true;
                    }
                    Some(PeerOp::Accepted { .. }) => {
                        debug!("rejecting duplicate connection",
                            "peer_ip" => self.addr.to_string());
                    }
                    Some(PeerOp::SendUpdate(_)) => {}
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

            if self.fsm.state() != BgpState::OpenConfirm {
                return false;
            }
        }
    }

    /// The session is up. Register with the RIB task; its PeerUp handling
    /// publishes our Adj-RIB-Out, which arrives back as the initial UPDATE
    /// (locally originated networks included).
    pub(super) fn session_established(&mut self) {
        info!("session established",
            "peer_ip" => self.addr.to_string(),
            "peer_asn" => self.config.asn);
        self.fsm.timers.restart_hold_timer();
        let _ = self.rib_tx.send(RibOp::PeerUp {
            peer_ip: self.addr.into(),
            peer_asn: self.config.asn,
            bgp_id: self.addr,
            peer_tx: self.peer_tx.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::create_test_peer_in_state;
    use super::*;

    #[tokio::test]
    async fn test_session_established_registers_with_rib() {
        let (mut peer, _tx, mut rib_rx) = create_test_peer_in_state(BgpState::OpenConfirm);
        peer.fsm.handle_event(FsmEvent::KeepaliveReceived);
        peer.session_established();

        assert_eq!(peer.state(), BgpState::Established);
        match rib_rx.recv().await {
            Some(RibOp::PeerUp {
                peer_ip, peer_asn, ..
            }) => {
                assert_eq!(peer_ip, std::net::IpAddr::from(peer.addr));
                assert_eq!(peer_asn, 65001);
            }
            _ => panic!("expected PeerUp"),
        }
    }
}
