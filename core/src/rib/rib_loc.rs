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

use crate::bgp::msg_update_types::Origin;
use crate::bgp::utils::IpNetwork;
use crate::rib::{Path, Route, RouteSource};
use crate::{debug, info};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

/// Loc-RIB: the local routing table. For each prefix the candidate paths
/// are kept ordered best-first; the head backs what is installed in the
/// kernel and advertised outbound.
pub struct LocRib {
    routes: HashMap<IpNetwork, Route>,
}

impl LocRib {
    pub fn new() -> Self {
        LocRib {
            routes: HashMap::new(),
        }
    }

    pub fn add_path(&mut self, prefix: IpNetwork, path: Arc<Path>) {
        match self.routes.entry(prefix) {
            Entry::Occupied(mut entry) => {
                let route = entry.get_mut();
                // One path per source: a re-announcement replaces it
                if let Some(existing) = route
                    .paths
                    .iter_mut()
                    .find(|p| p.source == path.source)
                {
                    *existing = path;
                } else {
                    route.paths.push(path);
                }
                route.paths.sort_by(|a, b| b.cmp(a));
            }
            Entry::Vacant(entry) => {
                entry.insert(Route {
                    prefix,
                    paths: vec![path],
                });
            }
        }
    }

    /// Remove the path learned from `peer` for a given prefix.
    /// Returns true if a path was actually removed.
    pub fn remove_peer_path(&mut self, prefix: &IpNetwork, peer_ip: IpAddr) -> bool {
        let Some(route) = self.routes.get_mut(prefix) else {
            return false;
        };
        let before = route.paths.len();
        route.paths.retain(|p| !p.source.is_from_peer(peer_ip));
        let removed = route.paths.len() != before;

        if route.paths.is_empty() {
            self.routes.remove(prefix);
        }
        removed
    }

    /// Remove every path learned from `peer`. Returns the affected prefixes.
    pub fn remove_routes_from_peer(&mut self, peer_ip: IpAddr) -> Vec<IpNetwork> {
        let mut affected = Vec::new();
        for (prefix, route) in self.routes.iter_mut() {
            let before = route.paths.len();
            route.paths.retain(|p| !p.source.is_from_peer(peer_ip));
            if route.paths.len() != before {
                affected.push(*prefix);
            }
        }
        self.routes.retain(|_, route| !route.paths.is_empty());
        debug!("removed peer paths from Loc-RIB",
            "peer_ip" => peer_ip.to_string(),
            "affected" => affected.len());
        affected
    }

    /// Add a locally originated route for a configured network.
    pub fn add_local_route(&mut self, prefix: IpNetwork, next_hop: Ipv4Addr) {
        let path = Arc::new(Path {
            origin: Origin::Igp,
            // Empty AS_PATH; the local ASN is prepended at export to eBGP
            as_path: vec![],
            next_hop,
            source: RouteSource::Local,
            local_pref: None,
            med: None,
            atomic_aggregate: false,
            unknown_attrs: vec![],
        });
        info!("adding local route to Loc-RIB", "prefix" => prefix.to_string());
        self.add_path(prefix, path);
    }

    /// Best path for a prefix, if any.
    pub fn best_path(&self, prefix: &IpNetwork) -> Option<&Arc<Path>> {
        self.routes.get(prefix).and_then(|route| route.paths.first())
    }

    pub fn prefixes(&self) -> Vec<IpNetwork> {
        self.routes.keys().copied().collect()
    }

    pub fn get_all_routes(&self) -> Vec<Route> {
        self.routes.values().cloned().collect()
    }

    pub fn routes_len(&self) -> usize {
        self.routes.len()
    }
}

impl Default for LocRib {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::test_helpers::*;

    #[test]
    fn test_new_loc_rib() {
        let loc_rib = LocRib::new();
        assert_eq!(loc_rib.routes_len(), 0);
        assert_eq!(loc_rib.get_all_routes(), vec![]);
    }

    #[test]
    fn test_add_path_and_best() {
        let mut loc_rib = LocRib::new();
        let prefix = test_prefix();
        let path = test_path(2);

        loc_rib.add_path(prefix, Arc::clone(&path));

        assert_eq!(loc_rib.best_path(&prefix), Some(&path));
        assert_eq!(loc_rib.routes_len(), 1);
    }

    #[test]
    fn test_best_path_ordering_across_peers() {
        let mut loc_rib = LocRib::new();
        let prefix = test_prefix();

        let worse = test_path_with(2, |p| p.local_pref = Some(100));
        let better = test_path_with(3, |p| p.local_pref = Some(200));

        loc_rib.add_path(prefix, Arc::clone(&worse));
        loc_rib.add_path(prefix, Arc::clone(&better));

        assert_eq!(loc_rib.best_path(&prefix), Some(&better));
    }

    #[test]
    fn test_same_source_replaces_path() {
        let mut loc_rib = LocRib::new();
        let prefix = test_prefix();

        loc_rib.add_path(prefix, test_path(2));
        let replacement = test_path_with(2, |p| p.local_pref = Some(300));
        loc_rib.add_path(prefix, Arc::clone(&replacement));

        let routes = loc_rib.get_all_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].paths, vec![replacement]);
    }

    #[test]
    fn test_remove_peer_path() {
        let mut loc_rib = LocRib::new();
        let prefix = test_prefix();

        loc_rib.add_path(prefix, test_path(2));
        let remaining = test_path(3);
        loc_rib.add_path(prefix, Arc::clone(&remaining));

        assert!(loc_rib.remove_peer_path(&prefix, test_peer_ip(2)));
        assert_eq!(loc_rib.best_path(&prefix), Some(&remaining));

        // Removing the last path drops the prefix entirely
        assert!(loc_rib.remove_peer_path(&prefix, test_peer_ip(3)));
        assert_eq!(loc_rib.routes_len(), 0);
        assert!(!loc_rib.remove_peer_path(&prefix, test_peer_ip(3)));
    }

    #[test]
    fn test_remove_routes_from_peer() {
        let mut loc_rib = LocRib::new();
        loc_rib.add_path(test_prefix_n(0), test_path(2));
        loc_rib.add_path(test_prefix_n(1), test_path(2));
        loc_rib.add_path(test_prefix_n(1), test_path(3));

        let mut affected = loc_rib.remove_routes_from_peer(test_peer_ip(2));
        affected.sort();
        assert_eq!(affected, vec![test_prefix_n(0), test_prefix_n(1)]);

        // Prefix 0 gone entirely, prefix 1 still has the other peer's path
        assert_eq!(loc_rib.routes_len(), 1);
        assert!(loc_rib.best_path(&test_prefix_n(1)).is_some());
    }

    #[test]
    fn test_local_route_beats_learned() {
        let mut loc_rib = LocRib::new();
        let prefix = test_prefix();

        loc_rib.add_path(prefix, test_path(2));
        loc_rib.add_local_route(prefix, Ipv4Addr::new(10, 0, 0, 1));

        let best = loc_rib.best_path(&prefix).unwrap();
        assert_eq!(best.source, RouteSource::Local);
    }
}
