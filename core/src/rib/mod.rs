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

//! Routing Information Base (RIB) module
//!
//! - Adj-RIB-In: per-peer input tables of routes received from each peer
//! - Loc-RIB: the local table containing selected best paths
//! - Adj-RIB-Out: per-peer output tables of routes advertised to each peer
//!
//! All three families are owned by the single [`manager::RibManager`] task,
//! which serializes the decision process across peers.

pub mod manager;
mod path;
pub mod rib_in;
pub mod rib_loc;
pub mod rib_out;
mod types;

pub use path::{Path, DEFAULT_LOCAL_PREF};
pub use types::{Route, RouteSource};
