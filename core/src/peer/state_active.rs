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
use std::time::Duration;

impl Peer {
    /// Active: waiting for an inbound connection. The acceptor has already
    /// matched the remote address against the configured peer before
    /// handing the socket over. Active-mode peers fall back to dialing
    /// when the ConnectRetry timer fires; passive peers keep waiting.
    /// Returns true on shutdown.
    pub(super) async fn handle_active_state(&mut self) -> bool {
        let mut tick = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                op = self.peer_rx.recv() => match op {
                    None | Some(PeerOp::Shutdown) => return true,
                    Some(PeerOp::Accepted { tcp_rx, tcp_tx }) => {
                        // tcp_open: cancel ConnectRetry, send OPEN, arm hold
                        self.transport_up(tcp_rx, tcp_tx).await;
                        return false;
                    }
                    Some(PeerOp::SendUpdate(_)) => {}
                },
                _ = tick.tick() => {
                    if self.fsm.timers.connect_retry_expired() {
                        self.fsm.timers.start_connect_retry();
                        if !self.fsm.passive() {
                            self.fsm.handle_event(FsmEvent::Timeout(TimerKind::ConnectRetry));
                            return false;
                        }
                    }
                }
            }
        }
    }
}
