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
use super::utils::ParserError;
use std::fmt::{Display, Formatter};

#[repr(u8)]
#[derive(Debug, PartialEq, Clone)]
pub enum MessageHeaderError {
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
    Unknown(u8),
}

impl From<u8> for MessageHeaderError {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageHeaderError::ConnectionNotSynchronized,
            2 => MessageHeaderError::BadMessageLength,
            3 => MessageHeaderError::BadMessageType,
            val => MessageHeaderError::Unknown(val),
        }
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Clone)]
pub enum OpenMessageError {
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    UnacceptedHoldTime = 6,
    Unknown(u8),
}

impl From<u8> for OpenMessageError {
    fn from(value: u8) -> Self {
        match value {
            1 => OpenMessageError::UnsupportedVersionNumber,
            2 => OpenMessageError::BadPeerAs,
            3 => OpenMessageError::BadBgpIdentifier,
            4 => OpenMessageError::UnsupportedOptionalParameter,
            6 => OpenMessageError::UnacceptedHoldTime,
            val => OpenMessageError::Unknown(val),
        }
    }
}

#[repr(u8)]
#[derive(Debug, PartialEq, Clone)]
pub enum UpdateMessageError {
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    RoutingLoop = 7,
    InvalidNextHopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
    Unknown(u8),
}

impl From<u8> for UpdateMessageError {
    fn from(value: u8) -> Self {
        match value {
            1 => UpdateMessageError::MalformedAttributeList,
            2 => UpdateMessageError::UnrecognizedWellKnownAttribute,
            3 => UpdateMessageError::MissingWellKnownAttribute,
            4 => UpdateMessageError::AttributeFlagsError,
            5 => UpdateMessageError::AttributeLengthError,
            6 => UpdateMessageError::InvalidOriginAttribute,
            7 => UpdateMessageError::RoutingLoop,
            8 => UpdateMessageError::InvalidNextHopAttribute,
            9 => UpdateMessageError::OptionalAttributeError,
            10 => UpdateMessageError::InvalidNetworkField,
            11 => UpdateMessageError::MalformedAsPath,
            val => UpdateMessageError::Unknown(val),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum BgpError {
    MessageHeaderError(MessageHeaderError),
    OpenMessageError(OpenMessageError),
    UpdateMessageError(UpdateMessageError),
    HoldTimerExpired,
    FiniteStateMachineError,
    Cease,
    Unknown,
}

#[repr(u8)]
enum ErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
    Unknown,
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            1 => ErrorCode::MessageHeaderError,
            2 => ErrorCode::OpenMessageError,
            3 => ErrorCode::UpdateMessageError,
            4 => ErrorCode::HoldTimerExpired,
            5 => ErrorCode::FiniteStateMachineError,
            6 => ErrorCode::Cease,
            _ => ErrorCode::Unknown,
        }
    }
}

impl BgpError {
    fn new(err_code: u8, err_sub_code: u8) -> BgpError {
        match ErrorCode::from(err_code) {
            ErrorCode::MessageHeaderError => {
                BgpError::MessageHeaderError(MessageHeaderError::from(err_sub_code))
            }
            ErrorCode::OpenMessageError => {
                BgpError::OpenMessageError(OpenMessageError::from(err_sub_code))
            }
            ErrorCode::UpdateMessageError => {
                BgpError::UpdateMessageError(UpdateMessageError::from(err_sub_code))
            }
            ErrorCode::HoldTimerExpired => BgpError::HoldTimerExpired,
            ErrorCode::FiniteStateMachineError => BgpError::FiniteStateMachineError,
            ErrorCode::Cease => BgpError::Cease,
            _ => BgpError::Unknown,
        }
    }

    pub fn error_code(&self) -> u8 {
        match self {
            BgpError::MessageHeaderError(_) => 1,
            BgpError::OpenMessageError(_) => 2,
            BgpError::UpdateMessageError(_) => 3,
            BgpError::HoldTimerExpired => 4,
            BgpError::FiniteStateMachineError => 5,
            BgpError::Cease => 6,
            BgpError::Unknown => 0,
        }
    }

    pub fn error_subcode(&self) -> u8 {
        match self {
            BgpError::MessageHeaderError(err) => match err {
                MessageHeaderError::ConnectionNotSynchronized => 1,
                MessageHeaderError::BadMessageLength => 2,
                MessageHeaderError::BadMessageType => 3,
                MessageHeaderError::Unknown(val) => *val,
            },
            BgpError::OpenMessageError(err) => match err {
                OpenMessageError::UnsupportedVersionNumber => 1,
                OpenMessageError::BadPeerAs => 2,
                OpenMessageError::BadBgpIdentifier => 3,
                OpenMessageError::UnsupportedOptionalParameter => 4,
                OpenMessageError::UnacceptedHoldTime => 6,
                OpenMessageError::Unknown(val) => *val,
            },
            BgpError::UpdateMessageError(err) => match err {
                UpdateMessageError::MalformedAttributeList => 1,
                UpdateMessageError::UnrecognizedWellKnownAttribute => 2,
                UpdateMessageError::MissingWellKnownAttribute => 3,
                UpdateMessageError::AttributeFlagsError => 4,
                UpdateMessageError::AttributeLengthError => 5,
                UpdateMessageError::InvalidOriginAttribute => 6,
                UpdateMessageError::RoutingLoop => 7,
                UpdateMessageError::InvalidNextHopAttribute => 8,
                UpdateMessageError::OptionalAttributeError => 9,
                UpdateMessageError::InvalidNetworkField => 10,
                UpdateMessageError::MalformedAsPath => 11,
                UpdateMessageError::Unknown(val) => *val,
            },
            _ => 0,
        }
    }

    fn subcode_name(&self) -> &'static str {
        match self {
            BgpError::MessageHeaderError(err) => match err {
                MessageHeaderError::ConnectionNotSynchronized => "connection not synchronized",
                MessageHeaderError::BadMessageLength => "bad message length",
                MessageHeaderError::BadMessageType => "bad message type",
                MessageHeaderError::Unknown(_) => "unknown subcode",
            },
            BgpError::OpenMessageError(err) => match err {
                OpenMessageError::UnsupportedVersionNumber => "unsupported version number",
                OpenMessageError::BadPeerAs => "bad peer AS",
                OpenMessageError::BadBgpIdentifier => "bad BGP identifier",
                OpenMessageError::UnsupportedOptionalParameter => "unsupported optional parameter",
                OpenMessageError::UnacceptedHoldTime => "unacceptable hold time",
                OpenMessageError::Unknown(_) => "unknown subcode",
            },
            BgpError::UpdateMessageError(err) => match err {
                UpdateMessageError::MalformedAttributeList => "malformed attribute list",
                UpdateMessageError::UnrecognizedWellKnownAttribute => {
                    "unrecognized well-known attribute"
                }
                UpdateMessageError::MissingWellKnownAttribute => "missing well-known attribute",
                UpdateMessageError::AttributeFlagsError => "attribute flags error",
                UpdateMessageError::AttributeLengthError => "attribute length error",
                UpdateMessageError::InvalidOriginAttribute => "invalid ORIGIN attribute",
                UpdateMessageError::RoutingLoop => "AS routing loop",
                UpdateMessageError::InvalidNextHopAttribute => "invalid NEXT_HOP attribute",
                UpdateMessageError::OptionalAttributeError => "optional attribute error",
                UpdateMessageError::InvalidNetworkField => "invalid network field",
                UpdateMessageError::MalformedAsPath => "malformed AS_PATH",
                UpdateMessageError::Unknown(_) => "unknown subcode",
            },
            _ => "",
        }
    }
}

impl Display for BgpError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            BgpError::MessageHeaderError(_) => {
                write!(f, "message header error: {}", self.subcode_name())
            }
            BgpError::OpenMessageError(_) => {
                write!(f, "OPEN message error: {}", self.subcode_name())
            }
            BgpError::UpdateMessageError(_) => {
                write!(f, "UPDATE message error: {}", self.subcode_name())
            }
            BgpError::HoldTimerExpired => write!(f, "hold timer expired"),
            BgpError::FiniteStateMachineError => write!(f, "finite state machine error"),
            BgpError::Cease => write!(f, "cease"),
            BgpError::Unknown => write!(f, "unknown error"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct NotificationMessage {
    error: BgpError,
    data: Vec<u8>,
}

impl NotificationMessage {
    pub fn new(error: BgpError, data: Vec<u8>) -> Self {
        NotificationMessage { error, data }
    }

    pub fn from_parser_error(error: &ParserError) -> Option<Self> {
        match error {
            ParserError::BgpError { error, data } => {
                Some(NotificationMessage::new(error.clone(), data.clone()))
            }
            _ => None,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let err_code = bytes[0];
        let err_sub_code = bytes[1];

        NotificationMessage {
            error: BgpError::new(err_code, err_sub_code),
            data: bytes[2..].to_vec(),
        }
    }

    pub fn error(&self) -> &BgpError {
        &self.error
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Display for NotificationMessage {
    /// Log form: "<category> error: <subcode name>: <code>/<subcode>/<data>"
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{}/{:02x?}",
            self.error,
            self.error.error_code(),
            self.error.error_subcode(),
            self.data
        )
    }
}

impl Message for NotificationMessage {
    fn kind(&self) -> MessageType {
        MessageType::Notification
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(self.error.error_code());
        bytes.push(self.error.error_subcode());
        bytes.extend_from_slice(&self.data);
        bytes
    }
}
