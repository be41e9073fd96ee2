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

use crate::bgp::msg_update::UpdateMessage;
use crate::bgp::utils::ParserError;
use crate::config::{Config, Establishment, PeerConfig};
use crate::rib::manager::RibOp;
use crate::{debug, error};
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

mod fsm;
pub mod outgoing;
mod state_active;
mod state_connect;
mod state_established;
mod state_idle;
mod state_openconfirm;
mod state_opensent;

pub use fsm::{BgpState, Fsm, FsmEvent, FsmTimers, TimerKind};

/// Operations delivered to a peer task.
pub enum PeerOp {
    /// Outbound UPDATE generated by the RIB fan-out
    SendUpdate(UpdateMessage),
    /// Inbound TCP connection accepted by the listener for this peer
    Accepted {
        tcp_rx: OwnedReadHalf,
        tcp_tx: OwnedWriteHalf,
    },
    /// Graceful shutdown: CEASE NOTIFICATION if a session is up, then stop
    Shutdown,
}

/// Type of BGP session based on AS relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// External BGP session (different AS)
    Ebgp,
    /// Internal BGP session (same AS)
    Ibgp,
}

/// Per-peer message counters
#[derive(Debug, Clone, Default)]
pub struct PeerStatistics {
    pub open_sent: u64,
    pub keepalive_sent: u64,
    pub update_sent: u64,
    pub notification_sent: u64,
    pub open_received: u64,
    pub keepalive_received: u64,
    pub update_received: u64,
    pub notification_received: u64,
}

/// TCP transport, present only while connected.
pub(super) struct TcpConnection {
    pub(super) tx: OwnedWriteHalf,
    pub(super) rx: OwnedReadHalf,
}

pub struct Peer {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub config: PeerConfig,
    pub fsm: Fsm,
    pub statistics: PeerStatistics,
    pub session_type: SessionType,

    pub(super) local_asn: u16,
    pub(super) local_bgp_id: Ipv4Addr,
    pub(super) local_hold_time: u16,
    pub(super) idle_time: Duration,

    pub(super) conn: Option<TcpConnection>,
    pub(super) peer_rx: mpsc::UnboundedReceiver<PeerOp>,
    /// Our own op sender; registered with the RIB task on reaching
    /// Established so fan-out can address us.
    pub(super) peer_tx: mpsc::UnboundedSender<PeerOp>,
    pub(super) rib_tx: mpsc::UnboundedSender<RibOp>,

    /// False until the first Start; the first connect cycle begins without
    /// the idle-time delay.
    pub(super) started_once: bool,
}

impl Peer {
    pub fn new(
        config: PeerConfig,
        global: &Config,
        peer_rx: mpsc::UnboundedReceiver<PeerOp>,
        peer_tx: mpsc::UnboundedSender<PeerOp>,
        rib_tx: mpsc::UnboundedSender<RibOp>,
    ) -> Self {
        let hold_time = config.hold_time_secs.unwrap_or(global.hold_time_secs);
        let keepalive_time = config
            .keepalive_time_secs
            .unwrap_or(global.keepalive_time_secs);
        let connect_retry = config.connect_retry_secs.unwrap_or(global.connect_retry_secs);
        let idle_time = config.idle_time_secs.unwrap_or(global.idle_time_secs);

        let timers = FsmTimers::new(
            Duration::from_secs(connect_retry),
            Duration::from_secs(hold_time as u64),
            Duration::from_secs(keepalive_time as u64),
        );
        let passive = config.establishment == Establishment::Passive;
        let session_type = if config.asn == global.asn {
            SessionType::Ibgp
        } else {
            SessionType::Ebgp
        };

        Peer {
            addr: config.address,
            port: config.port,
            fsm: Fsm::new(timers, passive),
            statistics: PeerStatistics::default(),
            session_type,
            local_asn: global.asn,
            local_bgp_id: global.router_id,
            local_hold_time: hold_time,
            idle_time: Duration::from_secs(idle_time),
            conn: None,
            peer_rx,
            peer_tx,
            rib_tx,
            config,
            started_once: false,
        }
    }

    /// Main peer task: drives the FSM through its states until shutdown.
    pub async fn run(mut self) {
        debug!("starting peer task", "peer_ip" => self.addr.to_string());

        loop {
            let shutdown = match self.fsm.state() {
                BgpState::Idle => self.handle_idle_state().await,
                BgpState::Connect => self.handle_connect_state().await,
                BgpState::Active => self.handle_active_state().await,
                BgpState::OpenSent => self.handle_opensent_state().await,
                BgpState::OpenConfirm => self.handle_openconfirm_state().await,
                BgpState::Established => self.handle_established_state().await,
            };
            if shutdown {
                self.session_teardown();
                debug!("peer task stopped",
                    "peer_ip" => self.addr.to_string(),
                    "updates_received" => self.statistics.update_received,
                    "updates_sent" => self.statistics.update_sent);
                return;
            }
        }
    }

    pub fn state(&self) -> BgpState {
        self.fsm.state()
    }

    /// Terminal stop for the current session: cancel every timer, close the
    /// transport, withdraw this peer's routes from the RIB, and fall back
    /// to Idle for the restart cycle.
    pub(super) fn session_teardown(&mut self) {
        self.fsm.timers.stop_all();
        self.conn = None;
        let _ = self.rib_tx.send(RibOp::PeerDown {
            peer_ip: self.addr.into(),
        });
        self.fsm.reset();
    }

    /// The expected BGP identifier of this peer is its configured address.
    pub(super) fn expected_bgp_id(&self) -> u32 {
        u32::from(self.addr)
    }

    /// Parse/validate failure on the receive side: log, send the
    /// NOTIFICATION when the error maps to one, tear the session down.
    pub(super) async fn handle_protocol_error(&mut self, err: &ParserError) {
        error!("session error",
            "peer_ip" => self.addr.to_string(),
            "error" => err.to_string());
        if let Some(notif) = crate::bgp::msg_notification::NotificationMessage::from_parser_error(err)
        {
            let _ = self.send_notification(&notif).await;
        }
        self.session_teardown();
    }

    /// A TCP connection came up (outbound connect or inbound accept):
    /// adopt the transport, send our OPEN, arm the hold timer.
    pub(super) async fn transport_up(&mut self, tcp_rx: OwnedReadHalf, tcp_tx: OwnedWriteHalf) {
        self.conn = Some(TcpConnection {
            tx: tcp_tx,
            rx: tcp_rx,
        });
        self.fsm.timers.stop_connect_retry();
        self.fsm.handle_event(FsmEvent::TcpOpen);
        if let Err(e) = self.send_open().await {
            error!("failed to send OPEN",
                "peer_ip" => self.addr.to_string(),
                "error" => e.to_string());
            self.fsm.handle_event(FsmEvent::TcpFatal);
            self.session_teardown();
        } else {
            self.fsm.timers.start_hold_timer();
        }
    }

    /// Transport read failed: clean close falls back per the FSM table
    /// (Active from OpenSent, Idle elsewhere), everything else is fatal.
    pub(super) async fn read_failed(&mut self, err: ParserError) {
        match &err {
            ParserError::BgpError { .. } => self.handle_protocol_error(&err).await,
            ParserError::IoError { .. } if err.is_clean_close() => {
                debug!("connection closed by peer", "peer_ip" => self.addr.to_string());
                self.fsm.handle_event(FsmEvent::TcpClosed);
                if self.fsm.state() == BgpState::Active {
                    // OpenSent fallback: keep waiting for a retry
                    self.conn = None;
                    self.fsm.timers.stop_hold_timer();
                    self.fsm.timers.stop_keepalive_timer();
                    self.fsm.timers.start_connect_retry();
                } else {
                    self.session_teardown();
                }
            }
            ParserError::IoError { .. } => {
                error!("connection error",
                    "peer_ip" => self.addr.to_string(),
                    "error" => err.to_string());
                self.fsm.handle_event(FsmEvent::TcpFatal);
                self.session_teardown();
            }
        }
    }

    /// Event with no legal row in the current session state: FSM error
    /// NOTIFICATION and stop.
    pub(super) async fn fsm_error_stop(&mut self, event: FsmEvent) {
        use crate::bgp::msg_notification::{BgpError, NotificationMessage};
        error!("unexpected event for state",
            "peer_ip" => self.addr.to_string(),
            "state" => format!("{:?}", self.fsm.state()),
            "event" => format!("{:?}", event));
        let notif = NotificationMessage::new(BgpError::FiniteStateMachineError, Vec::new());
        let _ = self.send_notification(&notif).await;
        self.fsm.handle_event(event);
        self.session_teardown();
    }

    /// Hold timer expiry: NOTIFICATION and stop.
    pub(super) async fn hold_expired_stop(&mut self) {
        use crate::bgp::msg_notification::{BgpError, NotificationMessage};
        use crate::peer::fsm::TimerKind;
        error!("hold timer expired", "peer_ip" => self.addr.to_string());
        let notif = NotificationMessage::new(BgpError::HoldTimerExpired, Vec::new());
        let _ = self.send_notification(&notif).await;
        self.fsm.handle_event(FsmEvent::Timeout(TimerKind::Hold));
        self.session_teardown();
    }

    /// Graceful stop requested: CEASE if we still have a transport.
    pub(super) async fn cease_stop(&mut self) {
        use crate::bgp::msg_notification::{BgpError, NotificationMessage};
        if self.conn.is_some() {
            let notif = NotificationMessage::new(BgpError::Cease, Vec::new());
            let _ = self.send_notification(&notif).await;
        }
    }
}
