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
use crate::bgp::msg_open::OpenMessage;
use crate::{debug, error};
use std::time::Duration;

impl Peer {
    /// OpenSent: our OPEN is on the wire, waiting for the peer's. Returns
    /// true on shutdown.
    pub(super) async fn handle_opensent_state(&mut self) -> bool {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            let Some(conn) = self.conn.as_mut() else {
                self.fsm.handle_event(FsmEvent::TcpFatal);
                self.session_teardown();
                return false;
            };

            tokio::select! {
                result = read_bgp_message(&mut conn.rx) => match result {
                    Ok(BgpMessage::Open(open)) => {
                        self.statistics.open_received += 1;
                        self.open_received(open).await;
                    }
                    Ok(BgpMessage::Notification(notif)) => {
                        self.statistics.notification_received += 1;
                        error!("NOTIFICATION received",
                            "peer_ip" => self.addr.to_string(),
                            "notification" => notif.to_string());
                        self.fsm.handle_event(FsmEvent::NotificationReceived);
                        self.session_teardown();
                    }
                    Ok(BgpMessage::KeepAlive(_)) => {
                        self.statistics.keepalive_received += 1;
                        self.fsm_error_stop(FsmEvent::KeepaliveReceived).await;
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
                        // At most one live transport per peer
                        debug!("rejecting duplicate connection",
                            "peer_ip" => self.addr.to_string());
                    }
                    Some(PeerOp::SendUpdate(_)) => {}
                },
                _ = tick.tick() => {
                    if self.fsm.timers.hold_timer_expired() {
                        self.hold_expired_stop().await;
                    }
                }
            }

            if self.fsm.state() != BgpState::OpenSent {
                return false;
            }
        }
    }

    /// Peer's OPEN arrived: validate against the configured identity, send
    /// our KEEPALIVE, negotiate timers, move to OpenConfirm.
    pub(super) async fn open_received(&mut self, open: OpenMessage) {
        match open.validate(self.config.asn, self.expected_bgp_id()) {
            Ok(()) => {
                let effective = self
                    .fsm
                    .timers
                    .negotiate_hold_time(self.local_hold_time, open.hold_time);
                self.fsm.handle_event(FsmEvent::OpenReceived);
                if self.send_keepalive().await.is_err() {
                    self.fsm.handle_event(FsmEvent::TcpFatal);
                    self.session_teardown();
                    return;
                }
                self.fsm.timers.start_hold_timer();
                self.fsm.timers.start_keepalive_timer();
                debug!("OPEN accepted",
                    "peer_ip" => self.addr.to_string(),
                    "peer_asn" => open.asn,
                    "effective_hold_time" => effective);
            }
            Err(e) => self.handle_protocol_error(&e).await,
        }
    }
}
