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

//! The per-peer BGP finite state machine: six states, three timers, and the
//! pure transition table. Actions attached to transitions (sending
//! messages, touching the RIB) live in the per-state handlers on `Peer`.

use std::time::{Duration, Instant};

/// BGP FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgpState {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    ConnectRetry,
    Hold,
    Keepalive,
}

/// FSM input events. Message payloads are handed to the state handlers
/// directly; the transition table only needs the event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmEvent {
    Start,
    Stop,
    TcpOpen,
    TcpOpenFailed,
    TcpClosed,
    TcpFatal,
    OpenReceived,
    KeepaliveReceived,
    UpdateReceived,
    NotificationReceived,
    Timeout(TimerKind),
}

/// FSM timers. A timer is a cancellable handle: `Some(started)` is armed,
/// `None` is stopped, and restarting replaces the handle so a stale expiry
/// can never fire.
#[derive(Debug, Clone)]
pub struct FsmTimers {
    pub connect_retry_time: Duration,

    /// Effective hold time. Starts from configuration, replaced by the
    /// negotiated value when the peer's OPEN arrives. Zero disables both
    /// the hold and keepalive timers.
    pub hold_time: Duration,

    /// Effective keepalive interval: the configured value capped at a third
    /// of the effective hold time.
    pub keepalive_time: Duration,

    configured_keepalive: Duration,

    pub connect_retry_started: Option<Instant>,
    pub hold_timer_started: Option<Instant>,
    pub keepalive_timer_started: Option<Instant>,
}

impl FsmTimers {
    pub fn new(connect_retry_time: Duration, hold_time: Duration, keepalive_time: Duration) -> Self {
        FsmTimers {
            connect_retry_time,
            hold_time,
            keepalive_time,
            configured_keepalive: keepalive_time,
            connect_retry_started: None,
            hold_timer_started: None,
            keepalive_timer_started: None,
        }
    }

    /// Negotiate the effective hold time from the peer's OPEN:
    /// `min(local, peer)`, floored to zero below three seconds. Returns the
    /// effective value.
    pub fn negotiate_hold_time(&mut self, local_hold: u16, peer_hold: u16) -> u16 {
        let mut effective = local_hold.min(peer_hold);
        if effective < 3 {
            effective = 0;
        }
        self.hold_time = Duration::from_secs(effective as u64);
        self.keepalive_time = self
            .configured_keepalive
            .min(Duration::from_secs(effective as u64 / 3));
        effective
    }

    pub fn start_connect_retry(&mut self) {
        self.connect_retry_started = Some(Instant::now());
    }

    pub fn stop_connect_retry(&mut self) {
        self.connect_retry_started = None;
    }

    pub fn connect_retry_expired(&self) -> bool {
        self.connect_retry_started
            .is_some_and(|started| started.elapsed() >= self.connect_retry_time)
    }

    pub fn start_hold_timer(&mut self) {
        if self.hold_time.is_zero() {
            self.hold_timer_started = None;
        } else {
            self.hold_timer_started = Some(Instant::now());
        }
    }

    pub fn restart_hold_timer(&mut self) {
        self.start_hold_timer();
    }

    pub fn stop_hold_timer(&mut self) {
        self.hold_timer_started = None;
    }

    pub fn hold_timer_expired(&self) -> bool {
        self.hold_timer_started
            .is_some_and(|started| started.elapsed() >= self.hold_time)
    }

    pub fn start_keepalive_timer(&mut self) {
        if self.keepalive_time.is_zero() {
            self.keepalive_timer_started = None;
        } else {
            self.keepalive_timer_started = Some(Instant::now());
        }
    }

    pub fn restart_keepalive_timer(&mut self) {
        self.start_keepalive_timer();
    }

    pub fn stop_keepalive_timer(&mut self) {
        self.keepalive_timer_started = None;
    }

    pub fn keepalive_timer_expired(&self) -> bool {
        self.keepalive_timer_started
            .is_some_and(|started| started.elapsed() >= self.keepalive_time)
    }

    pub fn stop_all(&mut self) {
        self.stop_connect_retry();
        self.stop_hold_timer();
        self.stop_keepalive_timer();
    }
}

/// BGP finite state machine
pub struct Fsm {
    state: BgpState,
    pub timers: FsmTimers,

    /// Passive establishment waits for an inbound connection (Active
    /// state); active establishment initiates one (Connect state).
    passive: bool,
}

impl Fsm {
    pub fn new(timers: FsmTimers, passive: bool) -> Self {
        Fsm {
            state: BgpState::Idle,
            timers,
            passive,
        }
    }

    #[cfg(test)]
    pub fn with_state(state: BgpState, timers: FsmTimers, passive: bool) -> Self {
        Fsm {
            state,
            timers,
            passive,
        }
    }

    pub fn state(&self) -> BgpState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == BgpState::Established
    }

    pub fn passive(&self) -> bool {
        self.passive
    }

    /// Drop back to Idle, e.g. after session teardown.
    pub fn reset(&mut self) {
        self.state = BgpState::Idle;
    }

    /// Apply one event and return the new state. Events with no row for the
    /// current state drop the session back to Idle (except in Idle itself,
    /// which absorbs them); the caller is responsible for any FSM-error
    /// NOTIFICATION the transition calls for.
    pub fn handle_event(&mut self, event: FsmEvent) -> BgpState {
        let new_state = match (self.state, event) {
            // ===== Idle =====
            (BgpState::Idle, FsmEvent::Start) => {
                if self.passive {
                    BgpState::Active
                } else {
                    BgpState::Connect
                }
            }
            (BgpState::Idle, _) => BgpState::Idle,

            // ===== Connect =====
            (BgpState::Connect, FsmEvent::TcpOpen) => BgpState::OpenSent,
            (BgpState::Connect, FsmEvent::TcpOpenFailed) => BgpState::Active,
            (BgpState::Connect, FsmEvent::Timeout(TimerKind::ConnectRetry)) => BgpState::Connect,
            (BgpState::Connect, _) => BgpState::Idle,

            // ===== Active =====
            (BgpState::Active, FsmEvent::TcpOpen) => BgpState::OpenSent,
            (BgpState::Active, FsmEvent::OpenReceived) => BgpState::OpenConfirm,
            (BgpState::Active, FsmEvent::Timeout(TimerKind::ConnectRetry)) => BgpState::Connect,
            (BgpState::Active, _) => BgpState::Idle,

            // ===== OpenSent =====
            (BgpState::OpenSent, FsmEvent::OpenReceived) => BgpState::OpenConfirm,
            (BgpState::OpenSent, FsmEvent::TcpClosed) => BgpState::Active,
            (BgpState::OpenSent, _) => BgpState::Idle,

            // ===== OpenConfirm =====
            (BgpState::OpenConfirm, FsmEvent::KeepaliveReceived) => BgpState::Established,
            (BgpState::OpenConfirm, FsmEvent::Timeout(TimerKind::Keepalive)) => {
                BgpState::OpenConfirm
            }
            (BgpState::OpenConfirm, _) => BgpState::Idle,

            // ===== Established =====
            (BgpState::Established, FsmEvent::UpdateReceived) => BgpState::Established,
            (BgpState::Established, FsmEvent::KeepaliveReceived) => BgpState::Established,
            (BgpState::Established, FsmEvent::Timeout(TimerKind::Keepalive)) => {
                BgpState::Established
            }
            (BgpState::Established, _) => BgpState::Idle,
        };

        self.state = new_state;
        new_state
    }
}
