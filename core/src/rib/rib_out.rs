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

/// Adj-RIB-Out: the route most recently advertised to one peer, after
/// export transforms. Used to suppress duplicate advertisements and to
/// generate withdrawals.
pub struct AdjRibOut {
    routes: HashMap<IpNetwork, Arc<Path>>,
}

impl AdjRibOut {
    pub fn new() -> Self {
        AdjRibOut {
            routes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, prefix: IpNetwork, path: Arc<Path>) {
        self.routes.insert(prefix, path);
    }

    /// Returns true if the prefix had been advertised.
    pub fn remove(&mut self, prefix: &IpNetwork) -> bool {
        self.routes.remove(prefix).is_some()
    }

    pub fn get(&self, prefix: &IpNetwork) -> Option<&Arc<Path>> {
        self.routes.get(prefix)
    }

    pub fn has_prefix(&self, prefix: &IpNetwork) -> bool {
        self.routes.contains_key(prefix)
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

impl Default for AdjRibOut {
    fn default() -> Self {
        Self::new()
    }
}
