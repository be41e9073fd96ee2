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

//! Write side of the peer transport, plus the pure outbound attribute
//! transforms applied when exporting Loc-RIB paths to a peer.

use super::Peer;
use crate::bgp::msg::Message;
use crate::bgp::msg_keepalive::KeepAliveMessage;
use crate::bgp::msg_notification::NotificationMessage;
use crate::bgp::msg_open::OpenMessage;
use crate::bgp::msg_update::UpdateMessage;
use crate::bgp::msg_update_types::{prepend_asn, AsPathSegment};
use crate::bgp::utils::IpNetwork;
use crate::debug;
use crate::rib::Path;
use std::io;
use std::net::Ipv4Addr;
use tokio::io::AsyncWriteExt;

impl Peer {
    /// Write a serialized message and flush. A send is complete only once
    /// flushed; failures surface as I/O errors handled as tcp_fatal.
    async fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no transport"))?;
        conn.tx.write_all(bytes).await?;
        conn.tx.flush().await
    }

    pub(super) async fn send_open(&mut self) -> io::Result<()> {
        let open = OpenMessage::new(
            self.local_asn,
            self.local_hold_time,
            u32::from(self.local_bgp_id),
        );
        self.send_bytes(&open.serialize()).await?;
        self.statistics.open_sent += 1;
        debug!("sent OPEN", "peer_ip" => self.addr.to_string());
        Ok(())
    }

    pub(super) async fn send_keepalive(&mut self) -> io::Result<()> {
        self.send_bytes(&KeepAliveMessage {}.serialize()).await?;
        self.statistics.keepalive_sent += 1;
        Ok(())
    }

    pub(super) async fn send_update(&mut self, update: &UpdateMessage) -> io::Result<()> {
        self.send_bytes(&update.serialize()).await?;
        self.statistics.update_sent += 1;
        Ok(())
    }

    pub(super) async fn send_notification(
        &mut self,
        notification: &NotificationMessage,
    ) -> io::Result<()> {
        debug!("sending NOTIFICATION",
            "peer_ip" => self.addr.to_string(),
            "notification" => notification.to_string());
        self.send_bytes(&notification.serialize()).await?;
        self.statistics.notification_sent += 1;
        Ok(())
    }
}

/// AS_PATH for export (RFC 4271 Section 5.1.2): prepend the local ASN when
/// crossing an AS boundary, hand it through unchanged inside the AS.
pub fn build_export_as_path(path: &Path, local_asn: u16, peer_asn: u16) -> Vec<AsPathSegment> {
    if peer_asn != local_asn {
        prepend_asn(local_asn, &path.as_path)
    } else {
        path.as_path.clone()
    }
}

/// NEXT_HOP for export: rewritten to our address toward eBGP peers,
/// preserved toward iBGP peers.
pub fn build_export_next_hop(
    path: &Path,
    local_addr: Ipv4Addr,
    local_asn: u16,
    peer_asn: u16,
) -> Ipv4Addr {
    if peer_asn != local_asn {
        local_addr
    } else {
        path.next_hop
    }
}

/// LOCAL_PREF is interior-only (RFC 4271 Section 5.1.5).
pub fn build_export_local_pref(path: &Path, local_asn: u16, peer_asn: u16) -> Option<u32> {
    if peer_asn == local_asn {
        path.local_pref
    } else {
        None
    }
}

/// MED is not propagated across AS boundaries (RFC 4271 Section 5.1.4).
pub fn build_export_med(path: &Path, local_asn: u16, peer_asn: u16) -> Option<u32> {
    if peer_asn == local_asn {
        path.med
    } else {
        None
    }
}

/// Apply all outbound transforms, yielding the path as the peer will see
/// it. The source is kept so Adj-RIB-Out entries remain attributable.
pub fn export_path(path: &Path, local_asn: u16, local_addr: Ipv4Addr, peer_asn: u16) -> Path {
    Path {
        origin: path.origin,
        as_path: build_export_as_path(path, local_asn, peer_asn),
        next_hop: build_export_next_hop(path, local_addr, local_asn, peer_asn),
        source: path.source,
        local_pref: build_export_local_pref(path, local_asn, peer_asn),
        med: build_export_med(path, local_asn, peer_asn),
        atomic_aggregate: path.atomic_aggregate,
        unknown_attrs: path
            .unknown_attrs
            .iter()
            .filter(|attr| attr.flags.0 & crate::bgp::msg_update_types::PathAttrFlag::TRANSITIVE != 0)
            .cloned()
            .collect(),
    }
}

/// Build the UPDATE announcing `prefixes` with an already-exported path.
pub fn build_update(path: &Path, prefixes: Vec<IpNetwork>) -> UpdateMessage {
    UpdateMessage::new(
        path.origin,
        path.as_path.clone(),
        path.next_hop,
        prefixes,
        path.local_pref,
        path.med,
        path.atomic_aggregate,
        path.unknown_attrs.clone(),
    )
}
