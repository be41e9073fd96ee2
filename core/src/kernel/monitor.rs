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

//! Kernel route monitor. Subscribes to the rtnetlink multicast groups for
//! links, addresses and IPv4/IPv6 routes, reports main-table route changes
//! not originated by this speaker as event frames, and executes
//! install/withdraw command frames received on its input. On input EOF the
//! netlink socket is dropped and the monitor exits cleanly; an
//! unrecoverable netlink error produces an ERR frame and a non-zero exit.

use super::frame::{self, KernelRoute, RouteCommand, RouteEvent};
use crate::bgp::utils::{IpNetwork, Ipv4Net, Ipv6Net};
use futures::StreamExt;
use futures::TryStreamExt;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::constants::{
    AF_INET, AF_INET6, RTNLGRP_IPV4_IFADDR, RTNLGRP_IPV4_ROUTE, RTNLGRP_IPV6_IFADDR,
    RTNLGRP_IPV6_ROUTE, RTNLGRP_LINK, RT_TABLE_MAIN,
};
use netlink_packet_route::route::Nla;
use netlink_packet_route::rtnl::RtnlMessage;
use netlink_packet_route::RouteMessage;
use netlink_sys::{AsyncSocket, SocketAddr};
use rtnetlink::{new_connection, Handle, IpVersion};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Route protocol number stamped on routes we install, as defined for BGP
/// in the rtnetlink.h kernel header. Changes carrying it are our own and
/// are not reported.
pub const NETLINK_PROTO_BGP: u8 = 186;

/// Run the monitor over the given byte channels until input EOF.
pub async fn run<R, W>(input: R, mut output: W) -> io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    match run_inner(input, &mut output).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Best effort: the peer may already be gone
            let _ = frame::write_event(&mut output, &RouteEvent::Err(e.to_string())).await;
            Err(e)
        }
    }
}

async fn run_inner<R, W>(input: R, output: &mut W) -> io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    // One connection serves requests (dump, install), a second is bound to
    // the multicast groups for change notifications.
    let (conn, handle, _) = new_connection()?;
    tokio::spawn(conn);

    let (mut monitor_conn, _, mut messages) = new_connection()?;
    let groups = [
        RTNLGRP_LINK,
        RTNLGRP_IPV4_IFADDR,
        RTNLGRP_IPV4_ROUTE,
        RTNLGRP_IPV6_IFADDR,
        RTNLGRP_IPV6_ROUTE,
    ]
    .iter()
    .map(|group| 1 << (group - 1))
    .fold(0, std::ops::BitOr::bitor);
    let addr = SocketAddr::new(0, groups);
    monitor_conn.socket_mut().socket_mut().bind(&addr)?;
    tokio::spawn(monitor_conn);

    // Report the pre-existing routing table before streaming changes
    dump_routes(&handle, output).await?;

    // Commands are pulled off the input by a dedicated reader so the main
    // loop can select between them and netlink messages.
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_commands(input, cmd_tx));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                // Input EOF: parent is gone, shut down cleanly
                None => return Ok(()),
                Some(command) => {
                    if let Err(e) = apply_command(&handle, &command).await {
                        frame::write_event(output, &RouteEvent::Err(e.to_string())).await?;
                    }
                }
            },
            message = messages.next() => match message {
                Some((message, _addr)) => {
                    if let Some(event) = event_from_message(message) {
                        frame::write_event(output, &event).await?;
                    }
                }
                None => {
                    return Err(io::Error::other("netlink monitor socket closed"));
                }
            },
        }
    }
}

async fn read_commands<R: AsyncRead + Unpin>(
    mut input: R,
    tx: mpsc::UnboundedSender<RouteCommand>,
) {
    loop {
        match frame::read_command(&mut input).await {
            Ok(Some(command)) => {
                if tx.send(command).is_err() {
                    return;
                }
            }
            // EOF or unreadable input: dropping the sender ends the monitor
            Ok(None) | Err(_) => return,
        }
    }
}

async fn dump_routes<W: AsyncWrite + Unpin>(handle: &Handle, output: &mut W) -> io::Result<()> {
    for version in [IpVersion::V4, IpVersion::V6] {
        let mut routes = handle.route().get(version).execute();
        loop {
            match routes.try_next().await {
                Ok(Some(message)) => {
                    if let Some(route) = route_from_message(&message) {
                        frame::write_event(output, &RouteEvent::Add(route)).await?;
                    }
                }
                Ok(None) => break,
                Err(e) => return Err(io::Error::other(e.to_string())),
            }
        }
    }
    Ok(())
}

async fn apply_command(handle: &Handle, command: &RouteCommand) -> Result<(), rtnetlink::Error> {
    match command {
        RouteCommand::Add {
            prefix,
            gateway,
            priority,
        } => {
            let request = handle.route().add().protocol(NETLINK_PROTO_BGP);
            match (prefix, gateway) {
                (IpNetwork::V4(net), IpAddr::V4(gw)) => {
                    let mut request = request
                        .v4()
                        .replace()
                        .destination_prefix(net.address, net.prefix_length)
                        .gateway(*gw);
                    request.message_mut().nlas.push(Nla::Priority(*priority));
                    request.execute().await
                }
                (IpNetwork::V6(net), IpAddr::V6(gw)) => {
                    let mut request = request
                        .v6()
                        .replace()
                        .destination_prefix(net.address, net.prefix_length)
                        .gateway(*gw);
                    request.message_mut().nlas.push(Nla::Priority(*priority));
                    request.execute().await
                }
                // Family mismatch between prefix and gateway
                _ => Err(rtnetlink::Error::RequestFailed),
            }
        }
        RouteCommand::Del { prefix } => {
            // Build the message through an add request, then issue a delete
            // for it.
            let request = handle.route().add().protocol(NETLINK_PROTO_BGP);
            let message = match prefix {
                IpNetwork::V4(net) => {
                    let mut request = request
                        .v4()
                        .destination_prefix(net.address, net.prefix_length);
                    request.message_mut().clone()
                }
                IpNetwork::V6(net) => {
                    let mut request = request
                        .v6()
                        .destination_prefix(net.address, net.prefix_length);
                    request.message_mut().clone()
                }
            };
            handle.route().del(message).execute().await
        }
    }
}

/// Convert a monitored netlink message into an event frame. Non-route
/// messages and routes that fail the filters return None.
fn event_from_message(message: NetlinkMessage<RtnlMessage>) -> Option<RouteEvent> {
    match message.payload {
        NetlinkPayload::InnerMessage(RtnlMessage::NewRoute(route)) => {
            route_from_message(&route).map(RouteEvent::Add)
        }
        NetlinkPayload::InnerMessage(RtnlMessage::DelRoute(route)) => {
            route_from_message(&route).map(RouteEvent::Del)
        }
        _ => None,
    }
}

/// Apply the route filters and extract the frame fields. Routes we
/// installed ourselves and routes outside the main table are dropped.
fn route_from_message(message: &RouteMessage) -> Option<KernelRoute> {
    if message.header.protocol == NETLINK_PROTO_BGP {
        return None;
    }
    if message.header.table != RT_TABLE_MAIN {
        return None;
    }

    let mask = message.header.destination_prefix_length;
    let mut dst: Option<Vec<u8>> = None;
    let mut gw: Option<Vec<u8>> = None;
    let mut priority = 0u32;
    for nla in &message.nlas {
        match nla {
            Nla::Destination(bytes) => dst = Some(bytes.clone()),
            Nla::Gateway(bytes) => gw = Some(bytes.clone()),
            Nla::Priority(prio) => priority = *prio,
            _ => {}
        }
    }

    let (prefix, gateway) = match message.header.address_family as u16 {
        AF_INET => {
            let mut octets = [0u8; 4];
            if let Some(dst) = dst {
                let len = dst.len().min(4);
                octets[..len].copy_from_slice(&dst[..len]);
            }
            let prefix = IpNetwork::V4(Ipv4Net {
                address: Ipv4Addr::from(octets),
                prefix_length: mask,
            });
            let mut gw_octets = [0u8; 4];
            if let Some(gw) = gw {
                let len = gw.len().min(4);
                gw_octets[..len].copy_from_slice(&gw[..len]);
            }
            (prefix, IpAddr::V4(Ipv4Addr::from(gw_octets)))
        }
        AF_INET6 => {
            let mut octets = [0u8; 16];
            if let Some(dst) = dst {
                let len = dst.len().min(16);
                octets[..len].copy_from_slice(&dst[..len]);
            }
            let prefix = IpNetwork::V6(Ipv6Net {
                address: Ipv6Addr::from(octets),
                prefix_length: mask,
            });
            let mut gw_octets = [0u8; 16];
            if let Some(gw) = gw {
                let len = gw.len().min(16);
                gw_octets[..len].copy_from_slice(&gw[..len]);
            }
            (prefix, IpAddr::V6(Ipv6Addr::from(gw_octets)))
        }
        _ => return None,
    };

    Some(KernelRoute {
        prefix,
        gateway,
        priority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_message(family: u16, protocol: u8, table: u8) -> RouteMessage {
        let mut message = RouteMessage::default();
        message.header.address_family = family as u8;
        message.header.protocol = protocol;
        message.header.table = table;
        message.header.destination_prefix_length = 24;
        message.nlas.push(Nla::Destination(vec![10, 0, 0]));
        message.nlas.push(Nla::Gateway(vec![192, 0, 2, 1]));
        message.nlas.push(Nla::Priority(100));
        message
    }

    #[test]
    fn test_route_from_message() {
        let message = route_message(AF_INET, 0, RT_TABLE_MAIN);
        let route = route_from_message(&message).unwrap();
        assert_eq!(route.prefix, "10.0.0.0/24".parse().unwrap());
        assert_eq!(route.gateway, "192.0.2.1".parse::<IpAddr>().unwrap());
        assert_eq!(route.priority, 100);
    }

    #[test]
    fn test_own_routes_filtered() {
        let message = route_message(AF_INET, NETLINK_PROTO_BGP, RT_TABLE_MAIN);
        assert!(route_from_message(&message).is_none());
    }

    #[test]
    fn test_non_main_table_filtered() {
        let message = route_message(AF_INET, 0, 42);
        assert!(route_from_message(&message).is_none());
    }

    #[test]
    fn test_missing_dst_is_default_route() {
        let mut message = RouteMessage::default();
        message.header.address_family = AF_INET as u8;
        message.header.table = RT_TABLE_MAIN;
        message.nlas.push(Nla::Gateway(vec![192, 0, 2, 1]));
        let route = route_from_message(&message).unwrap();
        assert_eq!(route.prefix, "0.0.0.0/0".parse().unwrap());
        assert_eq!(route.priority, 0);
    }

    #[test]
    fn test_unknown_family_filtered() {
        let mut message = RouteMessage::default();
        message.header.address_family = 0;
        message.header.table = RT_TABLE_MAIN;
        assert!(route_from_message(&message).is_none());
    }
}
