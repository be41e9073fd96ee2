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

use super::msg_keepalive::KeepAliveMessage;
use super::msg_notification::{BgpError, MessageHeaderError, NotificationMessage};
use super::msg_open::OpenMessage;
use super::msg_update::UpdateMessage;
use super::utils::ParserError;
use tokio::io::AsyncReadExt;

pub const BGP_HEADER_SIZE_BYTES: usize = 19;
pub const MAX_MESSAGE_SIZE: u16 = 4096;

/// Minimum total message lengths per type (RFC 4271 Section 4).
pub const BGP_OPEN_MIN_LENGTH: u16 = 29;
pub const BGP_UPDATE_MIN_LENGTH: u16 = 23;
pub const BGP_NOTIFICATION_MIN_LENGTH: u16 = 21;

// BGP header marker (16 bytes of 0xFF)
pub const BGP_MARKER: [u8; 16] = [0xff; 16];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    KeepAlive = 4,
}

impl MessageType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ParserError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Open),
            2 => Ok(MessageType::Update),
            3 => Ok(MessageType::Notification),
            4 => Ok(MessageType::KeepAlive),
            _ => Err(ParserError::BgpError {
                error: BgpError::MessageHeaderError(MessageHeaderError::BadMessageType),
                data: vec![value],
            }),
        }
    }
}

/// Trait for BGP message types that can serialize themselves
pub trait Message {
    /// Returns the message type identifier
    fn kind(&self) -> MessageType;

    /// Serializes the message body (without BGP header)
    fn to_bytes(&self) -> Vec<u8>;

    /// Serializes the complete BGP message with header
    fn serialize(&self) -> Vec<u8> {
        let body = self.to_bytes();
        let mut message = Vec::new();

        message.extend_from_slice(&BGP_MARKER);

        let length = BGP_HEADER_SIZE_BYTES as u16 + body.len() as u16;
        message.extend_from_slice(&length.to_be_bytes());

        message.push(self.kind().as_u8());
        message.extend_from_slice(&body);

        message
    }
}

#[derive(Debug)]
pub enum BgpMessage {
    Open(OpenMessage),
    Update(UpdateMessage),
    KeepAlive(KeepAliveMessage),
    Notification(NotificationMessage),
}

impl BgpMessage {
    fn from_bytes(
        message_type: MessageType,
        bytes: Vec<u8>,
        message_length: u16,
    ) -> Result<Self, ParserError> {
        match message_type {
            MessageType::Open => {
                let message = OpenMessage::from_bytes(bytes)?;
                Ok(BgpMessage::Open(message))
            }
            MessageType::Update => {
                let message = UpdateMessage::from_bytes(bytes, message_length)?;
                Ok(BgpMessage::Update(message))
            }
            MessageType::KeepAlive => Ok(BgpMessage::KeepAlive(KeepAliveMessage {})),
            MessageType::Notification => {
                let message = NotificationMessage::from_bytes(bytes);
                Ok(BgpMessage::Notification(message))
            }
        }
    }
}

/// Read one BGP message from the stream. Message boundaries are taken solely
/// from the header's 16-bit length field (RFC 4271 Section 4.1).
pub async fn read_bgp_message<R: AsyncReadExt + Unpin>(
    mut stream: R,
) -> Result<BgpMessage, ParserError> {
    let mut header_buffer = [0u8; BGP_HEADER_SIZE_BYTES];
    stream
        .read_exact(&mut header_buffer)
        .await
        .map_err(ParserError::from_io)?;

    // Validate header fields in order: marker, length, type (RFC 4271 Section 6.1)
    validate_marker(&header_buffer)?;

    let message_length = u16::from_be_bytes([header_buffer[16], header_buffer[17]]);
    let message_type_val = header_buffer[18];

    validate_length(message_length, message_type_val)?;
    let message_type = MessageType::try_from(message_type_val)?;

    let body_length = message_length - BGP_HEADER_SIZE_BYTES as u16;
    let mut message_buffer = vec![0u8; body_length.into()];

    if body_length > 0 {
        stream
            .read_exact(&mut message_buffer)
            .await
            .map_err(ParserError::from_io)?;
    }

    BgpMessage::from_bytes(message_type, message_buffer, message_length)
}

fn validate_marker(header: &[u8]) -> Result<(), ParserError> {
    if header[0..16] != BGP_MARKER {
        return Err(ParserError::BgpError {
            error: BgpError::MessageHeaderError(MessageHeaderError::ConnectionNotSynchronized),
            data: Vec::new(),
        });
    }
    Ok(())
}

fn validate_length(message_length: u16, message_type: u8) -> Result<(), ParserError> {
    let bad_length = || ParserError::BgpError {
        error: BgpError::MessageHeaderError(MessageHeaderError::BadMessageLength),
        data: message_length.to_be_bytes().to_vec(),
    };

    if message_length < BGP_HEADER_SIZE_BYTES as u16 || message_length > MAX_MESSAGE_SIZE {
        return Err(bad_length());
    }

    // Per-type minima: KEEPALIVE is header-only, the rest carry a body
    let valid = match MessageType::try_from(message_type) {
        Ok(MessageType::KeepAlive) => message_length == BGP_HEADER_SIZE_BYTES as u16,
        Ok(MessageType::Open) => message_length >= BGP_OPEN_MIN_LENGTH,
        Ok(MessageType::Update) => message_length >= BGP_UPDATE_MIN_LENGTH,
        Ok(MessageType::Notification) => message_length >= BGP_NOTIFICATION_MIN_LENGTH,
        // Unknown type is reported by the type check that follows
        Err(_) => true,
    };
    if !valid {
        return Err(bad_length());
    }

    Ok(())
}
