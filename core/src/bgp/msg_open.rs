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

use super::msg::{Message, MessageType};
use super::msg_notification::{BgpError, OpenMessageError};
use super::utils::{is_valid_unicast_ipv4, ParserError};

pub const BGP_VERSION: u8 = 4;

/// OPEN optional parameter type 1: Authentication Information (deprecated by
/// RFC 4271). Accepted without verification; everything else is rejected.
const OPT_PARAM_AUTHENTICATION: u8 = 1;

#[derive(Debug, PartialEq)]
pub struct OpenMessage {
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub bgp_identifier: u32,
    pub optional_params: Vec<OptionalParam>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct OptionalParam {
    pub param_type: u8,
    pub value: Vec<u8>,
}

impl OptionalParam {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.value.len());
        bytes.push(self.param_type);
        bytes.push(self.value.len() as u8);
        bytes.extend_from_slice(&self.value);
        bytes
    }
}

fn read_optional_parameters(bytes: &[u8]) -> Result<Vec<OptionalParam>, ParserError> {
    let mut cursor = 0;
    let mut params: Vec<OptionalParam> = Vec::new();

    while cursor < bytes.len() {
        if cursor + 2 > bytes.len() {
            return Err(malformed_open());
        }
        let param_type = bytes[cursor];
        let param_len = bytes[cursor + 1] as usize;
        cursor += 2;

        if cursor + param_len > bytes.len() {
            return Err(malformed_open());
        }
        let value = bytes[cursor..cursor + param_len].to_vec();
        cursor += param_len;

        params.push(OptionalParam { param_type, value });
    }

    Ok(params)
}

// Structurally malformed OPEN: Unspecific subcode (0)
fn malformed_open() -> ParserError {
    ParserError::BgpError {
        error: BgpError::OpenMessageError(OpenMessageError::Unknown(0)),
        data: Vec::new(),
    }
}

impl OpenMessage {
    pub fn new(asn: u16, hold_time: u16, bgp_identifier: u32) -> Self {
        OpenMessage {
            version: BGP_VERSION,
            asn,
            hold_time,
            bgp_identifier,
            optional_params: vec![],
        }
    }

    /// Structural decode only. Semantic checks live in `validate`, which
    /// needs the configured peer identity.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ParserError> {
        if bytes.len() < 10 {
            return Err(malformed_open());
        }

        let version = bytes[0];
        let asn = u16::from_be_bytes([bytes[1], bytes[2]]);
        let hold_time = u16::from_be_bytes([bytes[3], bytes[4]]);
        let bgp_identifier = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        let optional_params_len = bytes[9] as usize;
        if optional_params_len != bytes.len() - 10 {
            return Err(malformed_open());
        }

        let optional_params = read_optional_parameters(&bytes[10..])?;

        Ok(OpenMessage {
            version,
            asn,
            hold_time,
            bgp_identifier,
            optional_params,
        })
    }

    /// Semantic validation against the configured peer, in order: version,
    /// peer ASN, hold time, BGP identifier, optional parameters
    /// (RFC 4271 Section 6.2).
    pub fn validate(&self, peer_asn: u16, peer_bgp_id: u32) -> Result<(), ParserError> {
        if self.version != BGP_VERSION {
            // Data: 2-octet largest locally-supported version number
            return Err(ParserError::BgpError {
                error: BgpError::OpenMessageError(OpenMessageError::UnsupportedVersionNumber),
                data: (BGP_VERSION as u16).to_be_bytes().to_vec(),
            });
        }

        if self.asn != peer_asn {
            return Err(ParserError::BgpError {
                error: BgpError::OpenMessageError(OpenMessageError::BadPeerAs),
                data: self.asn.to_be_bytes().to_vec(),
            });
        }

        // MUST reject hold times of one or two seconds
        if self.hold_time == 1 || self.hold_time == 2 {
            return Err(ParserError::BgpError {
                error: BgpError::OpenMessageError(OpenMessageError::UnacceptedHoldTime),
                data: Vec::new(),
            });
        }

        if !is_valid_unicast_ipv4(self.bgp_identifier) || self.bgp_identifier != peer_bgp_id {
            return Err(ParserError::BgpError {
                error: BgpError::OpenMessageError(OpenMessageError::BadBgpIdentifier),
                data: Vec::new(),
            });
        }

        for param in &self.optional_params {
            // Authentication parameters pass through unverified (TODO:
            // verify once an authentication scheme is configured).
            if param.param_type != OPT_PARAM_AUTHENTICATION {
                return Err(ParserError::BgpError {
                    error: BgpError::OpenMessageError(OpenMessageError::UnsupportedOptionalParameter),
                    data: Vec::new(),
                });
            }
        }

        Ok(())
    }
}

impl Message for OpenMessage {
    fn kind(&self) -> MessageType {
        MessageType::Open
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.push(self.version);
        bytes.extend_from_slice(&self.asn.to_be_bytes());
        bytes.extend_from_slice(&self.hold_time.to_be_bytes());
        bytes.extend_from_slice(&self.bgp_identifier.to_be_bytes());

        let params: Vec<u8> = self
            .optional_params
            .iter()
            .flat_map(|p| p.to_bytes())
            .collect();
        bytes.push(params.len() as u8);
        bytes.extend_from_slice(&params);

        bytes
    }
}
