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
use crate::bgp::msg_update_types::{as_path_length, leftmost_asn, AsPathSegment, Origin, PathAttribute};
use crate::rib::types::RouteSource;
use std::cmp::Ordering;
use std::net::Ipv4Addr;

/// Default degree of preference when LOCAL_PREF is absent.
pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// A BGP path with the attributes the decision process consumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub origin: Origin,
    pub as_path: Vec<AsPathSegment>,
    pub next_hop: Ipv4Addr,
    pub source: RouteSource,
    pub local_pref: Option<u32>,
    pub med: Option<u32>,
    pub atomic_aggregate: bool,
    pub unknown_attrs: Vec<PathAttribute>,
}

impl Path {
    /// Build a Path from a validated UPDATE. Returns None when the mandatory
    /// attributes are absent (pure withdrawals).
    pub fn from_update(update: &UpdateMessage, source: RouteSource) -> Option<Self> {
        let origin = update.get_origin()?;
        let as_path = update.get_as_path()?.clone();
        let next_hop = update.get_next_hop()?;
        Some(Path {
            origin,
            as_path,
            next_hop,
            source,
            local_pref: update.get_local_pref(),
            med: update.get_med(),
            atomic_aggregate: update.get_atomic_aggregate(),
            unknown_attrs: update.get_unknown_attrs(),
        })
    }

    pub fn local_pref_or_default(&self) -> u32 {
        self.local_pref.unwrap_or(DEFAULT_LOCAL_PREF)
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    /// Best-path comparison (RFC 4271 Section 9.1.2.2); Greater means self
    /// is preferred. The tie-break order: LOCAL_PREF, AS_PATH length,
    /// ORIGIN, MED (same neighboring AS only), eBGP over iBGP, lowest
    /// router-id of the advertising peer.
    fn cmp(&self, other: &Self) -> Ordering {
        match self
            .local_pref_or_default()
            .cmp(&other.local_pref_or_default())
        {
            Ordering::Equal => {}
            ord => return ord,
        }

        match as_path_length(&other.as_path).cmp(&as_path_length(&self.as_path)) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (other.origin as u8).cmp(&(self.origin as u8)) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // MED is only comparable between paths from the same neighboring AS
        if leftmost_asn(&self.as_path) == leftmost_asn(&other.as_path) {
            match other.med.unwrap_or(0).cmp(&self.med.unwrap_or(0)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        match (&self.source, &other.source) {
            (RouteSource::Ebgp { .. }, RouteSource::Ibgp { .. }) => return Ordering::Greater,
            (RouteSource::Ibgp { .. }, RouteSource::Ebgp { .. }) => return Ordering::Less,
            (RouteSource::Local, RouteSource::Ebgp { .. } | RouteSource::Ibgp { .. }) => {
                return Ordering::Greater
            }
            (RouteSource::Ebgp { .. } | RouteSource::Ibgp { .. }, RouteSource::Local) => {
                return Ordering::Less
            }
            _ => {}
        }

        // Lowest router-id wins; fall back to peer address so the order is
        // total even for misconfigured identical identifiers.
        match (self.source.bgp_id(), other.source.bgp_id()) {
            (Some(a), Some(b)) => match b.cmp(&a) {
                Ordering::Equal => other.source.peer_ip().cmp(&self.source.peer_ip()),
                ord => ord,
            },
            _ => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::msg_update_types::AsPathSegment;
    use std::net::IpAddr;

    fn ebgp_source(last: u8) -> RouteSource {
        RouteSource::Ebgp {
            peer_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
            bgp_id: Ipv4Addr::new(192, 0, 2, last),
        }
    }

    fn ibgp_source(last: u8) -> RouteSource {
        RouteSource::Ibgp {
            peer_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
            bgp_id: Ipv4Addr::new(192, 0, 2, last),
        }
    }

    fn make_base_path() -> Path {
        Path {
            origin: Origin::Igp,
            as_path: vec![AsPathSegment::sequence(vec![65001])],
            next_hop: Ipv4Addr::new(192, 168, 1, 1),
            source: ebgp_source(1),
            local_pref: Some(100),
            med: None,
            atomic_aggregate: false,
            unknown_attrs: vec![],
        }
    }

    #[test]
    fn test_local_pref_ordering() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.local_pref = Some(200);
        path2.local_pref = Some(100);

        assert!(path1 > path2);
    }

    #[test]
    fn test_local_pref_default_is_100() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.local_pref = None; // defaults to 100
        path2.local_pref = Some(99);

        assert!(path1 > path2);
    }

    #[test]
    fn test_as_path_length_ordering() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.as_path = vec![AsPathSegment::sequence(vec![65001])];
        path2.as_path = vec![AsPathSegment::sequence(vec![65001, 65002])];

        assert!(path1 > path2);
    }

    #[test]
    fn test_as_set_counts_as_one() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        // AS_SET with 3 ASNs counts as length 1
        path1.as_path = vec![AsPathSegment::set(vec![65001, 65002, 65003])];
        // AS_SEQUENCE with 2 ASNs counts as length 2
        path2.as_path = vec![AsPathSegment::sequence(vec![65001, 65002])];

        assert!(path1 > path2);
    }

    #[test]
    fn test_origin_ordering() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.origin = Origin::Igp;
        path2.origin = Origin::Incomplete;

        assert!(path1 > path2);

        path1.origin = Origin::Egp;
        assert!(path1 > path2);
        path2.origin = Origin::Igp;
        assert!(path2 > path1);
    }

    #[test]
    fn test_med_same_neighbor_as() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.med = Some(50);
        path2.med = Some(100);

        assert!(path1 > path2);
    }

    #[test]
    fn test_med_skipped_for_different_neighbor_as() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.as_path = vec![AsPathSegment::sequence(vec![65001])];
        path1.med = Some(100);
        path1.source = ebgp_source(1);
        path2.as_path = vec![AsPathSegment::sequence(vec![65002])];
        path2.med = Some(10);
        path2.source = ebgp_source(1);

        // Different neighboring AS: MED skipped, sources identical
        assert_eq!(path1.cmp(&path2), Ordering::Equal);
    }

    #[test]
    fn test_ebgp_preferred_over_ibgp() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.source = ebgp_source(2);
        path2.source = ibgp_source(1);

        assert!(path1 > path2);
    }

    #[test]
    fn test_local_preferred_over_learned() {
        let mut path1 = make_base_path();
        path1.source = RouteSource::Local;
        path1.as_path = vec![];

        for source in [ebgp_source(1), ibgp_source(1)] {
            let mut path2 = make_base_path();
            path2.source = source;
            path2.as_path = vec![];
            assert!(path1 > path2);
        }
    }

    #[test]
    fn test_lowest_router_id_wins() {
        let mut path1 = make_base_path();
        let mut path2 = make_base_path();
        path1.source = ebgp_source(1);
        path2.source = ebgp_source(2);

        assert!(path1 > path2);
    }

    #[test]
    fn test_order_independence() {
        // The comparison is a strict weak order: sorting any permutation of
        // candidates yields the same best.
        let mut a = make_base_path();
        a.local_pref = Some(200);
        let mut b = make_base_path();
        b.as_path = vec![AsPathSegment::sequence(vec![65001, 65002])];
        let mut c = make_base_path();
        c.source = ibgp_source(3);

        let mut forward = vec![a.clone(), b.clone(), c.clone()];
        let mut reverse = vec![c, b, a.clone()];
        forward.sort_by(|x, y| y.cmp(x));
        reverse.sort_by(|x, y| y.cmp(x));
        assert_eq!(forward.first(), reverse.first());
        assert_eq!(forward.first(), Some(&a));
    }

    #[test]
    fn test_from_update() {
        let source = ebgp_source(1);

        let update = UpdateMessage::new(
            Origin::Igp,
            vec![AsPathSegment::sequence(vec![65001])],
            Ipv4Addr::new(10, 0, 0, 1),
            vec![],
            Some(100),
            Some(50),
            true,
            vec![],
        );
        let path = Path::from_update(&update, source).unwrap();
        assert_eq!(path.origin, Origin::Igp);
        assert_eq!(path.next_hop, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(path.local_pref, Some(100));
        assert_eq!(path.med, Some(50));
        assert!(path.atomic_aggregate);

        // Pure withdrawal carries no attributes
        let withdraw = UpdateMessage::new_withdraw(vec![]);
        assert!(Path::from_update(&withdraw, source).is_none());
    }
}
