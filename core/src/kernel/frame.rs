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

//! Byte protocol spoken between the speaker and the kernel route monitor.
//!
//! Event frames (monitor -> speaker), one per external route change:
//!
//! | field | width |
//! |-------|-------|
//! | cmd   | 1 byte: 0=ADD, 1=DEL, 255=ERR |
//! | mask  | 1 byte |
//! | dst   | ceil(mask/8) bytes |
//! | gw    | 4 (IPv4) or 16 (IPv6) bytes |
//! | prio  | 4 bytes big-endian |
//!
//! Error frames are `cmd(1) | msglen(1) | msg(msglen)`. The event layout
//! carries no family field, so a mask above 32 decodes as IPv6 and anything
//! else as IPv4.
//!
//! Command frames (speaker -> monitor) carry an explicit family byte
//! (4 or 6): `cmd(1) | family(1) | mask(1) | dst | gw | prio` for ADD and
//! `cmd(1) | family(1) | mask(1) | dst` for DEL.

use crate::bgp::utils::{IpNetwork, Ipv4Net, Ipv6Net};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const CMD_ROUTE_ADD: u8 = 0;
pub const CMD_ROUTE_DEL: u8 = 1;
pub const CMD_ROUTE_ERR: u8 = 255;

const FAMILY_V4: u8 = 4;
const FAMILY_V6: u8 = 6;

/// A route as seen by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelRoute {
    pub prefix: IpNetwork,
    pub gateway: IpAddr,
    pub priority: u32,
}

/// A change reported by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    Add(KernelRoute),
    Del(KernelRoute),
    Err(String),
}

/// An install/withdraw command for the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCommand {
    Add {
        prefix: IpNetwork,
        gateway: IpAddr,
        priority: u32,
    },
    Del {
        prefix: IpNetwork,
    },
}

fn gateway_bytes(prefix: &IpNetwork, gateway: &IpAddr) -> Vec<u8> {
    match (prefix, gateway) {
        (IpNetwork::V4(_), IpAddr::V4(gw)) => gw.octets().to_vec(),
        (IpNetwork::V6(_), IpAddr::V6(gw)) => gw.octets().to_vec(),
        // Family mismatch encodes as the unspecified gateway
        (IpNetwork::V4(_), _) => vec![0u8; 4],
        (IpNetwork::V6(_), _) => vec![0u8; 16],
    }
}

fn encode_dst(prefix: &IpNetwork) -> Vec<u8> {
    let mut bytes = vec![prefix.prefix_length()];
    bytes.extend_from_slice(&prefix.packed_address());
    bytes
}

fn prefix_from_parts(family_v6: bool, mask: u8, dst: &[u8]) -> io::Result<IpNetwork> {
    if family_v6 {
        if mask > 128 {
            return Err(bad_frame("prefix length out of range"));
        }
        let mut octets = [0u8; 16];
        octets[..dst.len()].copy_from_slice(dst);
        Ok(IpNetwork::V6(Ipv6Net {
            address: Ipv6Addr::from(octets),
            prefix_length: mask,
        }))
    } else {
        let mut octets = [0u8; 4];
        octets[..dst.len()].copy_from_slice(dst);
        Ok(IpNetwork::V4(Ipv4Net {
            address: Ipv4Addr::from(octets),
            prefix_length: mask,
        }))
    }
}

fn bad_frame(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

pub fn encode_event(event: &RouteEvent) -> Vec<u8> {
    match event {
        RouteEvent::Add(route) | RouteEvent::Del(route) => {
            let cmd = match event {
                RouteEvent::Add(_) => CMD_ROUTE_ADD,
                _ => CMD_ROUTE_DEL,
            };
            let mut bytes = vec![cmd];
            bytes.extend_from_slice(&encode_dst(&route.prefix));
            bytes.extend_from_slice(&gateway_bytes(&route.prefix, &route.gateway));
            bytes.extend_from_slice(&route.priority.to_be_bytes());
            bytes
        }
        RouteEvent::Err(msg) => {
            let msg = msg.as_bytes();
            let len = msg.len().min(u8::MAX as usize);
            let mut bytes = vec![CMD_ROUTE_ERR, len as u8];
            bytes.extend_from_slice(&msg[..len]);
            bytes
        }
    }
}

/// Read one event frame. EOF before the first byte surfaces as
/// UnexpectedEof.
pub async fn read_event<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<RouteEvent> {
    let cmd = reader.read_u8().await?;

    if cmd == CMD_ROUTE_ERR {
        let len = reader.read_u8().await? as usize;
        let mut msg = vec![0u8; len];
        reader.read_exact(&mut msg).await?;
        return Ok(RouteEvent::Err(String::from_utf8_lossy(&msg).into_owned()));
    }
    if cmd != CMD_ROUTE_ADD && cmd != CMD_ROUTE_DEL {
        return Err(bad_frame("unknown event command"));
    }

    let mask = reader.read_u8().await?;
    let family_v6 = mask > 32;
    let dst_len = (mask as usize + 7) / 8;
    let mut dst = vec![0u8; dst_len];
    reader.read_exact(&mut dst).await?;
    let prefix = prefix_from_parts(family_v6, mask, &dst)?;

    let gateway = if family_v6 {
        let mut gw = [0u8; 16];
        reader.read_exact(&mut gw).await?;
        IpAddr::V6(Ipv6Addr::from(gw))
    } else {
        let mut gw = [0u8; 4];
        reader.read_exact(&mut gw).await?;
        IpAddr::V4(Ipv4Addr::from(gw))
    };

    let priority = reader.read_u32().await?;

    let route = KernelRoute {
        prefix,
        gateway,
        priority,
    };
    Ok(match cmd {
        CMD_ROUTE_ADD => RouteEvent::Add(route),
        _ => RouteEvent::Del(route),
    })
}

pub fn encode_command(command: &RouteCommand) -> Vec<u8> {
    match command {
        RouteCommand::Add {
            prefix,
            gateway,
            priority,
        } => {
            let family = match prefix {
                IpNetwork::V4(_) => FAMILY_V4,
                IpNetwork::V6(_) => FAMILY_V6,
            };
            let mut bytes = vec![CMD_ROUTE_ADD, family];
            bytes.extend_from_slice(&encode_dst(prefix));
            bytes.extend_from_slice(&gateway_bytes(prefix, gateway));
            bytes.extend_from_slice(&priority.to_be_bytes());
            bytes
        }
        RouteCommand::Del { prefix } => {
            let family = match prefix {
                IpNetwork::V4(_) => FAMILY_V4,
                IpNetwork::V6(_) => FAMILY_V6,
            };
            let mut bytes = vec![CMD_ROUTE_DEL, family];
            bytes.extend_from_slice(&encode_dst(prefix));
            bytes
        }
    }
}

/// Read one command frame. Returns Ok(None) on EOF before the first byte,
/// which is the shutdown signal.
pub async fn read_command<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> io::Result<Option<RouteCommand>> {
    let cmd = match reader.read_u8().await {
        Ok(cmd) => cmd,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    if cmd != CMD_ROUTE_ADD && cmd != CMD_ROUTE_DEL {
        return Err(bad_frame("unknown route command"));
    }

    let family = reader.read_u8().await?;
    let family_v6 = match family {
        FAMILY_V4 => false,
        FAMILY_V6 => true,
        _ => return Err(bad_frame("unknown address family")),
    };

    let mask = reader.read_u8().await?;
    if (family_v6 && mask > 128) || (!family_v6 && mask > 32) {
        return Err(bad_frame("prefix length out of range"));
    }
    let mut dst = vec![0u8; (mask as usize + 7) / 8];
    reader.read_exact(&mut dst).await?;
    let prefix = prefix_from_parts(family_v6, mask, &dst)?;

    if cmd == CMD_ROUTE_DEL {
        return Ok(Some(RouteCommand::Del { prefix }));
    }

    let gateway = if family_v6 {
        let mut gw = [0u8; 16];
        reader.read_exact(&mut gw).await?;
        IpAddr::V6(Ipv6Addr::from(gw))
    } else {
        let mut gw = [0u8; 4];
        reader.read_exact(&mut gw).await?;
        IpAddr::V4(Ipv4Addr::from(gw))
    };
    let priority = reader.read_u32().await?;

    Ok(Some(RouteCommand::Add {
        prefix,
        gateway,
        priority,
    }))
}

/// Write and flush one event frame.
pub async fn write_event<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    event: &RouteEvent,
) -> io::Result<()> {
    writer.write_all(&encode_event(event)).await?;
    writer.flush().await
}

/// Write and flush one command frame.
pub async fn write_command<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    command: &RouteCommand,
) -> io::Result<()> {
    writer.write_all(&encode_command(command)).await?;
    writer.flush().await
}
