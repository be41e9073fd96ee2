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

//! Path attribute TLV codec. Attribute layout is
//! `flags(1) | type(1) | length(1 or 2) | value` where the extended-length
//! flag bit selects the length width. Decoding validates flags, lengths and
//! values per the RFC 4271 Section 5 registrations and reports failures as
//! `(code, subcode, data)` with the offending attribute serialized back.

use super::msg_notification::{BgpError, UpdateMessageError};
use super::msg_update_types::{
    Aggregator, AsPathSegment, AsPathSegmentType, AttrType, Origin, PathAttrFlag, PathAttrValue,
    PathAttribute,
};
use super::utils::{read_u32, ParserError};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

fn update_error(error: UpdateMessageError, data: Vec<u8>) -> ParserError {
    ParserError::BgpError {
        error: BgpError::UpdateMessageError(error),
        data,
    }
}

/// Decode the path attribute block. Duplicate type codes are surfaced as
/// MalformedAttributeList.
pub(super) fn decode_path_attrs(bytes: &[u8]) -> Result<BTreeMap<u8, PathAttribute>, ParserError> {
    let mut attrs: BTreeMap<u8, PathAttribute> = BTreeMap::new();
    let mut cursor = 0;

    while cursor < bytes.len() {
        if cursor + 2 > bytes.len() {
            return Err(update_error(
                UpdateMessageError::MalformedAttributeList,
                Vec::new(),
            ));
        }
        let flags = PathAttrFlag(bytes[cursor]);
        let type_code = bytes[cursor + 1];

        let (value_len, header_len) = if flags.extended_len() {
            if cursor + 4 > bytes.len() {
                return Err(update_error(
                    UpdateMessageError::MalformedAttributeList,
                    Vec::new(),
                ));
            }
            (
                u16::from_be_bytes([bytes[cursor + 2], bytes[cursor + 3]]) as usize,
                4,
            )
        } else {
            if cursor + 3 > bytes.len() {
                return Err(update_error(
                    UpdateMessageError::MalformedAttributeList,
                    Vec::new(),
                ));
            }
            (bytes[cursor + 2] as usize, 3)
        };

        if cursor + header_len + value_len > bytes.len() {
            return Err(update_error(
                UpdateMessageError::MalformedAttributeList,
                Vec::new(),
            ));
        }

        // The attribute as received, for NOTIFICATION data fields
        let raw = bytes[cursor..cursor + header_len + value_len].to_vec();
        let value = &bytes[cursor + header_len..cursor + header_len + value_len];
        cursor += header_len + value_len;

        let attr = decode_attr(flags, type_code, value, &raw)?;
        if attrs.insert(type_code, attr).is_some() {
            return Err(update_error(
                UpdateMessageError::MalformedAttributeList,
                Vec::new(),
            ));
        }
    }

    Ok(attrs)
}

fn decode_attr(
    flags: PathAttrFlag,
    type_code: u8,
    value: &[u8],
    raw: &[u8],
) -> Result<PathAttribute, ParserError> {
    let attr_type = match AttrType::from_code(type_code) {
        Some(t) => t,
        None => {
            // Unrecognized: well-known (optional bit clear) is fatal,
            // optional attributes are carried through unmodified.
            if !flags.optional() {
                return Err(update_error(
                    UpdateMessageError::UnrecognizedWellKnownAttribute,
                    raw.to_vec(),
                ));
            }
            return Ok(PathAttribute {
                flags,
                value: PathAttrValue::Unknown {
                    type_code,
                    data: value.to_vec(),
                },
            });
        }
    };

    if flags.registration_bits() != attr_type.expected_flags() {
        return Err(update_error(
            UpdateMessageError::AttributeFlagsError,
            raw.to_vec(),
        ));
    }

    if let Some(expected_len) = attr_type.fixed_length() {
        if value.len() != expected_len {
            return Err(update_error(
                UpdateMessageError::AttributeLengthError,
                raw.to_vec(),
            ));
        }
    }

    let value = match attr_type {
        AttrType::Origin => {
            let origin = Origin::try_from(value[0]).map_err(|_| {
                update_error(UpdateMessageError::InvalidOriginAttribute, raw.to_vec())
            })?;
            PathAttrValue::Origin(origin)
        }
        AttrType::AsPath => PathAttrValue::AsPath(decode_as_path(value)?),
        AttrType::NextHop => {
            let addr = read_u32(value)?;
            if addr == 0 {
                return Err(update_error(
                    UpdateMessageError::InvalidNextHopAttribute,
                    raw.to_vec(),
                ));
            }
            PathAttrValue::NextHop(Ipv4Addr::from(addr))
        }
        AttrType::MultiExitDisc => PathAttrValue::MultiExitDisc(read_u32(value)?),
        AttrType::LocalPref => PathAttrValue::LocalPref(read_u32(value)?),
        AttrType::AtomicAggregate => PathAttrValue::AtomicAggregate,
        AttrType::Aggregator => PathAttrValue::Aggregator(Aggregator {
            asn: u16::from_be_bytes([value[0], value[1]]),
            ip_addr: Ipv4Addr::new(value[2], value[3], value[4], value[5]),
        }),
    };

    Ok(PathAttribute { flags, value })
}

/// AS_PATH value: a run of `(segment_type, count, asn[count])` with 16-bit
/// ASNs.
fn decode_as_path(bytes: &[u8]) -> Result<Vec<AsPathSegment>, ParserError> {
    let malformed = || update_error(UpdateMessageError::MalformedAsPath, Vec::new());
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < bytes.len() {
        if cursor + 2 > bytes.len() {
            return Err(malformed());
        }
        let segment_type = AsPathSegmentType::try_from(bytes[cursor])?;
        let count = bytes[cursor + 1] as usize;
        cursor += 2;

        if cursor + count * 2 > bytes.len() {
            return Err(malformed());
        }
        let mut asn_list = Vec::with_capacity(count);
        for _ in 0..count {
            asn_list.push(u16::from_be_bytes([bytes[cursor], bytes[cursor + 1]]));
            cursor += 2;
        }

        segments.push(AsPathSegment {
            segment_type,
            asn_list,
        });
    }

    Ok(segments)
}

fn encode_as_path(segments: &[AsPathSegment]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for segment in segments {
        bytes.push(segment.segment_type as u8);
        bytes.push(segment.asn_list.len() as u8);
        for asn in &segment.asn_list {
            bytes.extend_from_slice(&asn.to_be_bytes());
        }
    }
    bytes
}

fn encode_attr_value(value: &PathAttrValue) -> Vec<u8> {
    match value {
        PathAttrValue::Origin(origin) => vec![*origin as u8],
        PathAttrValue::AsPath(segments) => encode_as_path(segments),
        PathAttrValue::NextHop(addr) => addr.octets().to_vec(),
        PathAttrValue::MultiExitDisc(med) => med.to_be_bytes().to_vec(),
        PathAttrValue::LocalPref(pref) => pref.to_be_bytes().to_vec(),
        PathAttrValue::AtomicAggregate => Vec::new(),
        PathAttrValue::Aggregator(agg) => {
            let mut bytes = agg.asn.to_be_bytes().to_vec();
            bytes.extend_from_slice(&agg.ip_addr.octets());
            bytes
        }
        PathAttrValue::Unknown { data, .. } => data.clone(),
    }
}

/// Serialize one attribute. The extended-length bit is derived from the
/// actual value length so encoding is deterministic.
pub(super) fn encode_attr(attr: &PathAttribute) -> Vec<u8> {
    let value = encode_attr_value(&attr.value);
    let mut flags = attr.flags.0 & !PathAttrFlag::EXTENDED_LENGTH;

    let mut bytes = Vec::with_capacity(value.len() + 4);
    if value.len() > u8::MAX as usize {
        flags |= PathAttrFlag::EXTENDED_LENGTH;
        bytes.push(flags);
        bytes.push(attr.type_code());
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
    } else {
        bytes.push(flags);
        bytes.push(attr.type_code());
        bytes.push(value.len() as u8);
    }
    bytes.extend_from_slice(&value);
    bytes
}

/// Serialize the attribute block in ascending type-code order.
pub(super) fn encode_path_attrs(attrs: &BTreeMap<u8, PathAttribute>) -> Vec<u8> {
    attrs.values().flat_map(encode_attr).collect()
}
