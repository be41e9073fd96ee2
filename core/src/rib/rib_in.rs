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
use crate::rib::{Path, Route};
use std::collections::HashMap;
use std::sync::Arc;

/// Adj-RIB-In: routes received from one BGP peer, before best-path
/// selection. One path per prefix; a re-announcement replaces the previous
/// one.
pub struct AdjRibIn {
    routes: HashMap<IpNetwork, Arc<Path>>,
}

impl AdjRibIn {
    pub fn new() -> Self {
        AdjRibIn {
            routes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, prefix: IpNetwork, path: Arc<Path>) {
        self.routes.insert(prefix, path);
    }

    /// Returns true if the prefix was present.
    pub fn remove(&mut self, prefix: &IpNetwork) -> bool {
        self.routes.remove(prefix).is_some()
    }

    pub fn get(&self, prefix: &IpNetwork) -> Option<&Arc<Path>> {
        self.routes.get(prefix)
    }

    pub fn prefixes(&self) -> Vec<IpNetwork> {
        self.routes.keys().copied().collect()
    }

    pub fn prefix_count(&self) -> usize {
        self.routes.len()
    }

    pub fn get_all_routes(&self) -> Vec<Route> {
        self.routes
            .iter()
            .map(|(prefix, path)| Route {
                prefix: *prefix,
                paths: vec![Arc::clone(path)],
            })
            .collect()
    }
}

impl Default for AdjRibIn {
    fn default() -> Self {
        Self::new()
    }
}
