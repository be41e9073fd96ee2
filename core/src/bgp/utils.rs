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

use super::msg_notification::{BgpError, UpdateMessageError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(Debug, PartialEq)]
pub enum ParserError {
    IoError {
        kind: io::ErrorKind,
        message: String,
    },
    BgpError {
        error: BgpError,
        data: Vec<u8>,
    },
}

impl ParserError {
    pub fn from_io(err: io::Error) -> Self {
        ParserError::IoError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// True when the underlying transport closed cleanly (EOF mid-header).
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            ParserError::IoError {
                kind: io::ErrorKind::UnexpectedEof,
                ..
            }
        )
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ParserError::IoError { message, .. } => write!(f, "IO error: {}", message),
            ParserError::BgpError { error, data } => {
                write!(f, "{}/{:02x?}", error, data)
            }
        }
    }
}

impl Error for ParserError {}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum IpNetwork {
    V4(Ipv4Net),
    V6(Ipv6Net),
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Ipv4Net {
    pub address: Ipv4Addr,
    pub prefix_length: u8,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Ipv6Net {
    pub address: Ipv6Addr,
    pub prefix_length: u8,
}

impl IpNetwork {
    pub fn prefix_length(&self) -> u8 {
        match self {
            IpNetwork::V4(net) => net.prefix_length,
            IpNetwork::V6(net) => net.prefix_length,
        }
    }

    /// Packed address bytes, truncated to ceil(prefix_length / 8).
    pub fn packed_address(&self) -> Vec<u8> {
        let byte_len = (self.prefix_length() as usize + 7) / 8;
        match self {
            IpNetwork::V4(net) => net.address.octets()[..byte_len].to_vec(),
            IpNetwork::V6(net) => net.address.octets()[..byte_len].to_vec(),
        }
    }
}

impl Display for IpNetwork {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            IpNetwork::V4(net) => write!(f, "{}/{}", net.address, net.prefix_length),
            IpNetwork::V6(net) => write!(f, "{}/{}", net.address, net.prefix_length),
        }
    }
}

impl FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid prefix (missing /): {}", s))?;
        let prefix_length: u8 = len
            .parse()
            .map_err(|_| format!("invalid prefix length: {}", len))?;
        if let Ok(address) = addr.parse::<Ipv4Addr>() {
            if prefix_length > 32 {
                return Err(format!("IPv4 prefix length out of range: {}", s));
            }
            return Ok(IpNetwork::V4(Ipv4Net {
                address,
                prefix_length,
            }));
        }
        if let Ok(address) = addr.parse::<Ipv6Addr>() {
            if prefix_length > 128 {
                return Err(format!("IPv6 prefix length out of range: {}", s));
            }
            return Ok(IpNetwork::V6(Ipv6Net {
                address,
                prefix_length,
            }));
        }
        Err(format!("invalid prefix address: {}", addr))
    }
}

impl serde::Serialize for IpNetwork {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for IpNetwork {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Encode a prefix as one length byte followed by ceil(len/8) address bytes,
/// right-padded with zero bits in the final byte (RFC 4271 Section 4.3).
pub fn encode_prefix(prefix: &IpNetwork) -> Vec<u8> {
    let mut bytes = vec![prefix.prefix_length()];
    bytes.extend_from_slice(&prefix.packed_address());
    bytes
}

/// Parse a run of length-prefixed IPv4 NLRI entries.
pub fn parse_nlri_list(bytes: &[u8]) -> Result<Vec<IpNetwork>, ParserError> {
    let mut cursor = 0;
    let mut nlri_list: Vec<IpNetwork> = Vec::new();

    while cursor < bytes.len() {
        let prefix_length = bytes[cursor];
        cursor += 1;

        if prefix_length > 32 {
            return Err(ParserError::BgpError {
                error: BgpError::UpdateMessageError(UpdateMessageError::InvalidNetworkField),
                data: vec![prefix_length],
            });
        }

        let byte_len = (prefix_length as usize + 7) / 8;
        if cursor + byte_len > bytes.len() {
            return Err(ParserError::BgpError {
                error: BgpError::UpdateMessageError(UpdateMessageError::InvalidNetworkField),
                data: Vec::new(),
            });
        }

        let mut ip_buffer = [0u8; 4];
        ip_buffer[..byte_len].copy_from_slice(&bytes[cursor..cursor + byte_len]);
        cursor += byte_len;

        nlri_list.push(IpNetwork::V4(Ipv4Net {
            address: Ipv4Addr::from(ip_buffer),
            prefix_length,
        }));
    }

    Ok(nlri_list)
}

pub fn read_u32(bytes: &[u8]) -> Result<u32, ParserError> {
    match bytes.len() {
        4 => Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => Err(ParserError::BgpError {
            error: BgpError::UpdateMessageError(UpdateMessageError::AttributeLengthError),
            data: Vec::new(),
        }),
    }
}

/// Validates if an IPv4 address is a valid unicast host address.
/// Returns false for 0.0.0.0, 255.255.255.255, or multicast (224.0.0.0/4).
pub fn is_valid_unicast_ipv4(ip: u32) -> bool {
    !(ip == 0 || ip == 0xFFFFFFFF || (ip & 0xF0000000) == 0xE0000000)
}
