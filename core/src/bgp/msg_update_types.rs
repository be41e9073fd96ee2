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
use super::utils::ParserError;
use std::net::Ipv4Addr;

#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct PathAttrFlag(pub u8);

impl PathAttrFlag {
    pub const OPTIONAL: u8 = 1 << 7;
    pub const TRANSITIVE: u8 = 1 << 6;
    pub const PARTIAL: u8 = 1 << 5;
    pub const EXTENDED_LENGTH: u8 = 1 << 4;

    pub fn extended_len(&self) -> bool {
        self.0 & Self::EXTENDED_LENGTH != 0
    }

    pub fn optional(&self) -> bool {
        self.0 & Self::OPTIONAL != 0
    }

    /// Flag bits that must match the IANA registration for a recognized
    /// attribute: everything except the extended-length bit.
    pub fn registration_bits(&self) -> u8 {
        self.0 & !Self::EXTENDED_LENGTH
    }
}

pub mod attr_type_code {
    pub const ORIGIN: u8 = 1;
    pub const AS_PATH: u8 = 2;
    pub const NEXT_HOP: u8 = 3;
    pub const MULTI_EXIT_DISC: u8 = 4;
    pub const LOCAL_PREF: u8 = 5;
    pub const ATOMIC_AGGREGATE: u8 = 6;
    pub const AGGREGATOR: u8 = 7;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrType {
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MultiExitDisc = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,
}

impl AttrType {
    pub(crate) fn from_code(value: u8) -> Option<Self> {
        match value {
            1 => Some(AttrType::Origin),
            2 => Some(AttrType::AsPath),
            3 => Some(AttrType::NextHop),
            4 => Some(AttrType::MultiExitDisc),
            5 => Some(AttrType::LocalPref),
            6 => Some(AttrType::AtomicAggregate),
            7 => Some(AttrType::Aggregator),
            _ => None,
        }
    }

    /// Registered flag bits per RFC 4271 Section 5: (optional, transitive).
    pub(crate) fn expected_flags(&self) -> u8 {
        match self {
            AttrType::Origin => PathAttrFlag::TRANSITIVE,
            AttrType::AsPath => PathAttrFlag::TRANSITIVE,
            AttrType::NextHop => PathAttrFlag::TRANSITIVE,
            AttrType::MultiExitDisc => PathAttrFlag::OPTIONAL,
            AttrType::LocalPref => PathAttrFlag::TRANSITIVE,
            AttrType::AtomicAggregate => PathAttrFlag::TRANSITIVE,
            AttrType::Aggregator => PathAttrFlag::OPTIONAL | PathAttrFlag::TRANSITIVE,
        }
    }

    /// Fixed value length where the registration prescribes one.
    pub(crate) fn fixed_length(&self) -> Option<usize> {
        match self {
            AttrType::Origin => Some(1),
            AttrType::NextHop => Some(4),
            AttrType::MultiExitDisc => Some(4),
            AttrType::LocalPref => Some(4),
            AttrType::AtomicAggregate => Some(0),
            AttrType::Aggregator => Some(6),
            AttrType::AsPath => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl TryFrom<u8> for Origin {
    type Error = ParserError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Origin::Igp),
            1 => Ok(Origin::Egp),
            2 => Ok(Origin::Incomplete),
            _ => Err(ParserError::BgpError {
                error: BgpError::UpdateMessageError(UpdateMessageError::InvalidOriginAttribute),
                data: vec![value],
            }),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AsPathSegmentType {
    AsSet = 1,
    AsSequence = 2,
}

impl TryFrom<u8> for AsPathSegmentType {
    type Error = ParserError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AsPathSegmentType::AsSet),
            2 => Ok(AsPathSegmentType::AsSequence),
            _ => Err(ParserError::BgpError {
                error: BgpError::UpdateMessageError(UpdateMessageError::MalformedAsPath),
                data: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AsPathSegment {
    pub segment_type: AsPathSegmentType,
    pub asn_list: Vec<u16>,
}

impl AsPathSegment {
    pub fn sequence(asn_list: Vec<u16>) -> Self {
        AsPathSegment {
            segment_type: AsPathSegmentType::AsSequence,
            asn_list,
        }
    }

    pub fn set(asn_list: Vec<u16>) -> Self {
        AsPathSegment {
            segment_type: AsPathSegmentType::AsSet,
            asn_list,
        }
    }
}

/// Prepend an ASN onto an AS_PATH: extend the leading AS_SEQUENCE, or create
/// a fresh single-entry AS_SEQUENCE when the path starts with an AS_SET or
/// is empty (RFC 4271 Section 5.1.2).
pub fn prepend_asn(asn: u16, as_path: &[AsPathSegment]) -> Vec<AsPathSegment> {
    match as_path.first() {
        Some(first) if first.segment_type == AsPathSegmentType::AsSequence => {
            let mut asn_list = Vec::with_capacity(first.asn_list.len() + 1);
            asn_list.push(asn);
            asn_list.extend_from_slice(&first.asn_list);
            let mut segments = vec![AsPathSegment::sequence(asn_list)];
            segments.extend_from_slice(&as_path[1..]);
            segments
        }
        Some(_) => {
            let mut segments = vec![AsPathSegment::sequence(vec![asn])];
            segments.extend_from_slice(as_path);
            segments
        }
        None => vec![AsPathSegment::sequence(vec![asn])],
    }
}

/// AS_PATH length for best-path selection: AS_SEQUENCE counts each ASN,
/// AS_SET counts as one (RFC 4271 Section 9.1.2.2).
pub fn as_path_length(as_path: &[AsPathSegment]) -> usize {
    as_path
        .iter()
        .map(|segment| match segment.segment_type {
            AsPathSegmentType::AsSequence => segment.asn_list.len(),
            AsPathSegmentType::AsSet => 1,
        })
        .sum()
}

/// First ASN of the first segment: the AS that most recently added itself.
pub fn leftmost_asn(as_path: &[AsPathSegment]) -> Option<u16> {
    as_path.first().and_then(|seg| seg.asn_list.first().copied())
}

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct Aggregator {
    pub asn: u16,
    pub ip_addr: Ipv4Addr,
}

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub enum PathAttrValue {
    Origin(Origin),
    AsPath(Vec<AsPathSegment>),
    NextHop(Ipv4Addr),
    MultiExitDisc(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator(Aggregator),
    Unknown { type_code: u8, data: Vec<u8> },
}

#[derive(Debug, PartialEq, Clone, Eq, Hash)]
pub struct PathAttribute {
    pub flags: PathAttrFlag,
    pub value: PathAttrValue,
}

impl PathAttribute {
    pub fn type_code(&self) -> u8 {
        match &self.value {
            PathAttrValue::Origin(_) => attr_type_code::ORIGIN,
            PathAttrValue::AsPath(_) => attr_type_code::AS_PATH,
            PathAttrValue::NextHop(_) => attr_type_code::NEXT_HOP,
            PathAttrValue::MultiExitDisc(_) => attr_type_code::MULTI_EXIT_DISC,
            PathAttrValue::LocalPref(_) => attr_type_code::LOCAL_PREF,
            PathAttrValue::AtomicAggregate => attr_type_code::ATOMIC_AGGREGATE,
            PathAttrValue::Aggregator(_) => attr_type_code::AGGREGATOR,
            PathAttrValue::Unknown { type_code, .. } => *type_code,
        }
    }
}
