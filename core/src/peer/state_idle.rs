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

use super::fsm::FsmEvent;
use super::{Peer, PeerOp};
use crate::debug;

impl Peer {
    /// Idle: the resting state between sessions. The first entry starts
    /// immediately; re-entries wait `idle_time` before the next connect
    /// cycle (linear retry, no backoff). Returns true on shutdown.
    pub(super) async fn handle_idle_state(&mut self) -> bool {
        if self.started_once {
            let delay = tokio::time::sleep(self.idle_time);
            tokio::pin!(delay);
            loop {
                tokio::select! {
                    _ = &mut delay => break,
                    op = self.peer_rx.recv() => match op {
                        None | Some(PeerOp::Shutdown) => return true,
                        Some(PeerOp::Accepted { .. }) => {
                            // No session yet; dropping the halves closes it
                            debug!("dropping connection while idle",
                                "peer_ip" => self.addr.to_string());
                        }
                        Some(PeerOp::SendUpdate(_)) => {}
                    }
                }
            }
        }
        self.started_once = true;

        // start: schedule ConnectRetry; establishment mode selects Connect
        // (we dial) or Active (we wait)
        self.fsm.timers.start_connect_retry();
        self.fsm.handle_event(FsmEvent::Start);
        debug!("peer started",
            "peer_ip" => self.addr.to_string(),
            "state" => format!("{:?}", self.fsm.state()));
        false
    }
}
