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
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;

pub const DEFAULT_BGP_PORT: u16 = 179;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub asn: u16,
    pub router_id: Ipv4Addr,
    /// Listen address for inbound sessions. The local IP doubles as the
    /// NEXT_HOP rewritten onto routes exported to eBGP peers.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Locally originated prefixes, announced to every established peer.
    #[serde(default)]
    pub networks: Vec<IpNetwork>,
    #[serde(default = "default_hold_time")]
    pub hold_time_secs: u16,
    #[serde(default = "default_keepalive_time")]
    pub keepalive_time_secs: u16,
    #[serde(default = "default_connect_retry_time")]
    pub connect_retry_secs: u64,
    /// Delay before re-entering the connect cycle after session teardown.
    #[serde(default = "default_idle_time")]
    pub idle_time_secs: u64,
    /// Metric stamped on routes installed into the kernel FIB.
    #[serde(default = "default_route_priority")]
    pub route_priority: u32,
    /// Path to the external route-monitor helper. Unset runs the monitor
    /// embedded in-process.
    #[serde(default)]
    pub route_monitor: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Establishment {
    /// We initiate the TCP connection.
    #[default]
    Active,
    /// We wait for the peer to connect.
    Passive,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerConfig {
    pub address: Ipv4Addr,
    pub asn: u16,
    #[serde(default = "default_bgp_port")]
    pub port: u16,
    pub hold_time_secs: Option<u16>,
    pub keepalive_time_secs: Option<u16>,
    pub connect_retry_secs: Option<u64>,
    pub idle_time_secs: Option<u64>,
    #[serde(default)]
    pub establishment: Establishment,
}

fn default_listen_addr() -> String {
    // Unprivileged default; the IANA port is 179
    "0.0.0.0:1179".to_string()
}

fn default_bgp_port() -> u16 {
    DEFAULT_BGP_PORT
}

fn default_hold_time() -> u16 {
    90
}

fn default_keepalive_time() -> u16 {
    30
}

fn default_connect_retry_time() -> u64 {
    30 // RFC suggests 120s, but 30s is more practical
}

fn default_idle_time() -> u64 {
    5
}

fn default_route_priority() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Local IP portion of the listen address.
    pub fn local_ip(&self) -> Result<Ipv4Addr, String> {
        self.listen_addr
            .split(':')
            .next()
            .ok_or_else(|| "invalid listen_addr format".to_string())?
            .parse()
            .map_err(|e| format!("failed to parse listen address: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            asn: 65000,
            router_id: Ipv4Addr::new(1, 1, 1, 1),
            listen_addr: default_listen_addr(),
            networks: vec![],
            hold_time_secs: default_hold_time(),
            keepalive_time_secs: default_keepalive_time(),
            connect_retry_secs: default_connect_retry_time(),
            idle_time_secs: default_idle_time(),
            route_priority: default_route_priority(),
            route_monitor: None,
            log_level: default_log_level(),
            peers: vec![],
        }
    }
}

impl PeerConfig {
    pub fn new(address: Ipv4Addr, asn: u16) -> Self {
        PeerConfig {
            address,
            asn,
            port: DEFAULT_BGP_PORT,
            hold_time_secs: None,
            keepalive_time_secs: None,
            connect_retry_secs: None,
            idle_time_secs: None,
            establishment: Establishment::Active,
        }
    }
}
