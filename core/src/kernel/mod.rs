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

//! Kernel FIB synchronization. The RIB talks to the route monitor through
//! [`KernelHandle`]; the monitor runs either embedded (a task bridged over
//! an in-memory duplex) or as the external `bgpr-rtmon` helper subprocess.
//! Both speak the byte protocol in [`frame`].

pub mod frame;
pub mod monitor;

use crate::bgp::utils::IpNetwork;
use crate::{debug, error, warn};
use frame::{RouteCommand, RouteEvent};
use std::io;
use std::net::IpAddr;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Command side of the kernel channel, owned by the RIB task.
#[derive(Clone)]
pub struct KernelHandle {
    cmd_tx: Option<mpsc::UnboundedSender<RouteCommand>>,
}

impl KernelHandle {
    /// A handle that drops all commands. Used when the monitor could not be
    /// started; the RIB stays consistent, the kernel is just not synced.
    pub fn disabled() -> Self {
        KernelHandle { cmd_tx: None }
    }

    pub fn from_channel(cmd_tx: mpsc::UnboundedSender<RouteCommand>) -> Self {
        KernelHandle {
            cmd_tx: Some(cmd_tx),
        }
    }

    fn send(&self, command: RouteCommand) {
        match &self.cmd_tx {
            Some(tx) => {
                if tx.send(command).is_err() {
                    warn!("kernel monitor channel closed, dropping route command");
                }
            }
            None => debug!("kernel sync disabled, dropping route command"),
        }
    }

    pub fn install(&self, prefix: IpNetwork, gateway: IpAddr, priority: u32) {
        debug!("kernel route install",
            "prefix" => prefix.to_string(),
            "gateway" => gateway.to_string());
        self.send(RouteCommand::Add {
            prefix,
            gateway,
            priority,
        });
    }

    pub fn remove(&self, prefix: IpNetwork) {
        debug!("kernel route delete", "prefix" => prefix.to_string());
        self.send(RouteCommand::Del { prefix });
    }
}

/// Bridge structured commands/events onto a byte channel speaking the frame
/// protocol. Returns once either side closes.
async fn bridge<R, W>(
    mut reader: R,
    mut writer: W,
    mut cmd_rx: mpsc::UnboundedReceiver<RouteCommand>,
    event_tx: mpsc::UnboundedSender<RouteEvent>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            command = cmd_rx.recv() => match command {
                // RIB side dropped the handle: closing the writer delivers
                // EOF, the monitor's shutdown signal
                None => return,
                Some(command) => {
                    if let Err(e) = frame::write_command(&mut writer, &command).await {
                        error!("failed to write kernel route command", "error" => e.to_string());
                        return;
                    }
                }
            },
            event = frame::read_event(&mut reader) => match event {
                Ok(event) => {
                    if event_tx.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::UnexpectedEof {
                        error!("failed to read kernel route event", "error" => e.to_string());
                    }
                    return;
                }
            },
        }
    }
}

/// Start the monitor as an in-process task connected by an in-memory
/// duplex.
pub fn spawn_embedded() -> (KernelHandle, mpsc::UnboundedReceiver<RouteEvent>) {
    let (speaker_io, monitor_io) = tokio::io::duplex(64 * 1024);
    let (monitor_rx, monitor_tx) = tokio::io::split(monitor_io);
    let (speaker_rx, speaker_tx) = tokio::io::split(speaker_io);

    tokio::spawn(async move {
        if let Err(e) = monitor::run(monitor_rx, monitor_tx).await {
            error!("kernel route monitor exited", "error" => e.to_string());
        }
    });

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(bridge(speaker_rx, speaker_tx, cmd_rx, event_tx));

    (KernelHandle::from_channel(cmd_tx), event_rx)
}

/// Start the external helper subprocess connected by stdin/stdout pipes.
pub fn spawn_helper(
    path: &str,
) -> io::Result<(KernelHandle, mpsc::UnboundedReceiver<RouteEvent>)> {
    let mut child = tokio::process::Command::new(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("helper stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("helper stdout unavailable"))?;

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                debug!("kernel route helper exited cleanly");
            }
            Ok(status) => {
                error!("kernel route helper exited", "status" => status.to_string());
            }
            Err(e) => {
                error!("failed to wait for kernel route helper", "error" => e.to_string());
            }
        }
    });

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(bridge(stdout, stdin, cmd_rx, event_tx));

    Ok((KernelHandle::from_channel(cmd_tx), event_rx))
}
