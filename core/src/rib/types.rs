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

use crate::bgp::utils::IpNetwork;
use crate::rib::Path;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

/// Where a path was learned from. Carries the advertising peer's BGP
/// identifier for the final best-path tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteSource {
    /// Locally originated (configured network)
    Local,
    /// Learned over an external session (peer ASN differs from ours)
    Ebgp { peer_ip: IpAddr, bgp_id: Ipv4Addr },
    /// Learned over an internal session (peer ASN equals ours)
    Ibgp { peer_ip: IpAddr, bgp_id: Ipv4Addr },
}

impl RouteSource {
    pub fn peer_ip(&self) -> Option<IpAddr> {
        match self {
            RouteSource::Local => None,
            RouteSource::Ebgp { peer_ip, .. } | RouteSource::Ibgp { peer_ip, .. } => Some(*peer_ip),
        }
    }

    pub fn bgp_id(&self) -> Option<Ipv4Addr> {
        match self {
            RouteSource::Local => None,
            RouteSource::Ebgp { bgp_id, .. } | RouteSource::Ibgp { bgp_id, .. } => Some(*bgp_id),
        }
    }

    pub fn is_ebgp(&self) -> bool {
        matches!(self, RouteSource::Ebgp { .. })
    }

    pub fn is_from_peer(&self, peer: IpAddr) -> bool {
        self.peer_ip() == Some(peer)
    }
}

/// A prefix with its candidate paths, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: IpNetwork,
    pub paths: Vec<Arc<Path>>,
}
