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

use super::fsm::{FsmEvent, TimerKind};
use super::{Peer, PeerOp};
use crate::debug;
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpStream;

impl Peer {
    /// Connect: one outbound connection attempt, bounded by the
    /// ConnectRetry timer. Returns true on shutdown.
    pub(super) async fn handle_connect_state(&mut self) -> bool {
        let remote = SocketAddr::new(IpAddr::V4(self.addr), self.port);
        let connect = TcpStream::connect(remote);
        tokio::pin!(connect);
        let retry = tokio::time::sleep(self.fsm.timers.connect_retry_time);
        tokio::pin!(retry);

        loop {
            tokio::select! {
                // Operator commands take priority over a racing dial result
                biased;
                op = self.peer_rx.recv() => match op {
                    None | Some(PeerOp::Shutdown) => return true,
                    Some(PeerOp::Accepted { tcp_rx, tcp_tx }) => {
                        // The inbound connection won the race; adopt it
                        self.transport_up(tcp_rx, tcp_tx).await;
                        return false;
                    }
                    Some(PeerOp::SendUpdate(_)) => {}
                },
                result = &mut connect => {
                    match result {
                        Ok(stream) => {
                            // tcp_open: cancel ConnectRetry, send OPEN
                            let (tcp_rx, tcp_tx) = stream.into_split();
                            self.transport_up(tcp_rx, tcp_tx).await;
                        }
                        Err(e) => {
                            // tcp_open_failed: restart ConnectRetry, wait
                            // for an inbound attempt instead
                            debug!("connect failed",
                                "peer_ip" => self.addr.to_string(),
                                "error" => e.to_string());
                            self.fsm.timers.start_connect_retry();
                            self.fsm.handle_event(FsmEvent::TcpOpenFailed);
                        }
                    }
                    return false;
                }
                _ = &mut retry => {
                    // ConnectRetry expiry: restart the timer and redial
                    self.fsm.timers.start_connect_retry();
                    self.fsm.handle_event(FsmEvent::Timeout(TimerKind::ConnectRetry));
                    return false;
                }
            }
        }
    }
}
