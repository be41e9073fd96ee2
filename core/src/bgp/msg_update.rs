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

use super::msg::{Message, MessageType, BGP_UPDATE_MIN_LENGTH};
use super::msg_notification::{BgpError, UpdateMessageError};
use super::msg_update_codec::{decode_path_attrs, encode_path_attrs};
use super::msg_update_types::{
    attr_type_code, AsPathSegment, Origin, PathAttrFlag, PathAttrValue, PathAttribute,
};
use super::utils::{encode_prefix, parse_nlri_list, IpNetwork, ParserError};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

fn update_error(error: UpdateMessageError, data: Vec<u8>) -> ParserError {
    ParserError::BgpError {
        error: BgpError::UpdateMessageError(error),
        data,
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct UpdateMessage {
    pub withdrawn_routes: Vec<IpNetwork>,
    pub path_attrs: BTreeMap<u8, PathAttribute>,
    pub nlri: Vec<IpNetwork>,
}

impl UpdateMessage {
    /// Build an announcement carrying the mandatory well-known attributes
    /// plus LOCAL_PREF / MED when present.
    pub fn new(
        origin: Origin,
        as_path: Vec<AsPathSegment>,
        next_hop: Ipv4Addr,
        nlri: Vec<IpNetwork>,
        local_pref: Option<u32>,
        med: Option<u32>,
        atomic_aggregate: bool,
        unknown_attrs: Vec<PathAttribute>,
    ) -> Self {
        let mut path_attrs = BTreeMap::new();
        let well_known = PathAttrFlag(PathAttrFlag::TRANSITIVE);
        let optional = PathAttrFlag(PathAttrFlag::OPTIONAL);

        path_attrs.insert(
            attr_type_code::ORIGIN,
            PathAttribute {
                flags: well_known,
                value: PathAttrValue::Origin(origin),
            },
        );
        path_attrs.insert(
            attr_type_code::AS_PATH,
            PathAttribute {
                flags: well_known,
                value: PathAttrValue::AsPath(as_path),
            },
        );
        path_attrs.insert(
            attr_type_code::NEXT_HOP,
            PathAttribute {
                flags: well_known,
                value: PathAttrValue::NextHop(next_hop),
            },
        );
        if let Some(med) = med {
            path_attrs.insert(
                attr_type_code::MULTI_EXIT_DISC,
                PathAttribute {
                    flags: optional,
                    value: PathAttrValue::MultiExitDisc(med),
                },
            );
        }
        if let Some(pref) = local_pref {
            path_attrs.insert(
                attr_type_code::LOCAL_PREF,
                PathAttribute {
                    flags: well_known,
                    value: PathAttrValue::LocalPref(pref),
                },
            );
        }
        if atomic_aggregate {
            path_attrs.insert(
                attr_type_code::ATOMIC_AGGREGATE,
                PathAttribute {
                    flags: well_known,
                    value: PathAttrValue::AtomicAggregate,
                },
            );
        }
        for attr in unknown_attrs {
            path_attrs.insert(attr.type_code(), attr);
        }

        UpdateMessage {
            withdrawn_routes: Vec::new(),
            path_attrs,
            nlri,
        }
    }

    /// Build a pure withdrawal (no attributes, no NLRI).
    pub fn new_withdraw(withdrawn_routes: Vec<IpNetwork>) -> Self {
        UpdateMessage {
            withdrawn_routes,
            path_attrs: BTreeMap::new(),
            nlri: Vec::new(),
        }
    }

    /// Decode an UPDATE body. `message_length` is the total length from the
    /// header, used to cross-check the two embedded length fields.
    pub fn from_bytes(bytes: Vec<u8>, message_length: u16) -> Result<Self, ParserError> {
        if bytes.len() < 4 {
            return Err(update_error(
                UpdateMessageError::MalformedAttributeList,
                Vec::new(),
            ));
        }

        let unfeasible_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        if 2 + unfeasible_len + 2 > bytes.len() {
            return Err(update_error(
                UpdateMessageError::MalformedAttributeList,
                Vec::new(),
            ));
        }
        let withdrawn_routes = parse_nlri_list(&bytes[2..2 + unfeasible_len])?;

        let attrs_offset = 2 + unfeasible_len;
        let attrs_len =
            u16::from_be_bytes([bytes[attrs_offset], bytes[attrs_offset + 1]]) as usize;

        // Both embedded lengths must fit inside the header-declared length
        if BGP_UPDATE_MIN_LENGTH as usize + unfeasible_len + attrs_len > message_length as usize {
            return Err(update_error(
                UpdateMessageError::MalformedAttributeList,
                Vec::new(),
            ));
        }

        let nlri_offset = attrs_offset + 2 + attrs_len;
        let path_attrs = decode_path_attrs(&bytes[attrs_offset + 2..nlri_offset])?;
        let nlri = parse_nlri_list(&bytes[nlri_offset..])?;

        Ok(UpdateMessage {
            withdrawn_routes,
            path_attrs,
            nlri,
        })
    }

    /// Semantic validation: AS_PATH loop detection and required-attribute
    /// presence. Runs after decode so flag/length errors report first.
    pub fn validate(&self, local_asn: u16) -> Result<(), ParserError> {
        if let Some(as_path) = self.get_as_path() {
            let looped = as_path
                .iter()
                .any(|segment| segment.asn_list.contains(&local_asn));
            if looped {
                return Err(update_error(UpdateMessageError::RoutingLoop, Vec::new()));
            }
        }

        // Announcements imply the mandatory well-known attributes
        if !self.nlri.is_empty() {
            for type_code in [
                attr_type_code::ORIGIN,
                attr_type_code::AS_PATH,
                attr_type_code::NEXT_HOP,
            ] {
                if !self.path_attrs.contains_key(&type_code) {
                    return Err(update_error(
                        UpdateMessageError::MissingWellKnownAttribute,
                        vec![type_code],
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn get_origin(&self) -> Option<Origin> {
        match self.path_attrs.get(&attr_type_code::ORIGIN)?.value {
            PathAttrValue::Origin(origin) => Some(origin),
            _ => None,
        }
    }

    pub fn get_as_path(&self) -> Option<&Vec<AsPathSegment>> {
        match &self.path_attrs.get(&attr_type_code::AS_PATH)?.value {
            PathAttrValue::AsPath(segments) => Some(segments),
            _ => None,
        }
    }

    pub fn get_next_hop(&self) -> Option<Ipv4Addr> {
        match self.path_attrs.get(&attr_type_code::NEXT_HOP)?.value {
            PathAttrValue::NextHop(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn get_med(&self) -> Option<u32> {
        match self.path_attrs.get(&attr_type_code::MULTI_EXIT_DISC)?.value {
            PathAttrValue::MultiExitDisc(med) => Some(med),
            _ => None,
        }
    }

    pub fn get_local_pref(&self) -> Option<u32> {
        match self.path_attrs.get(&attr_type_code::LOCAL_PREF)?.value {
            PathAttrValue::LocalPref(pref) => Some(pref),
            _ => None,
        }
    }

    pub fn get_atomic_aggregate(&self) -> bool {
        self.path_attrs
            .contains_key(&attr_type_code::ATOMIC_AGGREGATE)
    }

    /// Attributes we do not interpret, carried for re-advertisement.
    pub fn get_unknown_attrs(&self) -> Vec<PathAttribute> {
        self.path_attrs
            .values()
            .filter(|attr| matches!(attr.value, PathAttrValue::Unknown { .. }))
            .cloned()
            .collect()
    }
}

impl Message for UpdateMessage {
    fn kind(&self) -> MessageType {
        MessageType::Update
    }

    fn to_bytes(&self) -> Vec<u8> {
        let withdrawn: Vec<u8> = self
            .withdrawn_routes
            .iter()
            .flat_map(encode_prefix)
            .collect();
        let attrs = encode_path_attrs(&self.path_attrs);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(withdrawn.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&withdrawn);
        bytes.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&attrs);
        for prefix in &self.nlri {
            bytes.extend_from_slice(&encode_prefix(prefix));
        }
        bytes
    }
}
