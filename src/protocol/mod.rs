//! Device Trace Protocol
//! Framed binary messages sent by the running state machine to the host.
//!
//! Every frame is the start sequence `17 31 23`, one message type byte, a
//! big-endian `u16` payload length and the payload. Payloads are fixed-width
//! big-endian `u16` fields only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

pub use decoder::{Decoded, DecoderConfig, DecoderStats, FrameDecoder, StalePolicy};
pub use encoder::Encoder;


/// Marks the beginning of every frame
pub const START_SEQUENCE: [u8; 3] = [17, 31, 23];

/// Start sequence + type + length
pub const HEADER_LEN: usize = START_SEQUENCE.len() + 3;

/// Largest payload any known message carries
pub const MAX_KNOWN_PAYLOAD: usize = 4;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Transport write failed: {0}")]
    Io(#[from] io::Error),
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),
    #[error("{message_type} expects a {expected} byte payload, got {actual}")]
    PayloadLength {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Wire value of each message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    IterationStart = 1,
    IterationEnd = 2,
    CurrentState = 3,
    WillCheckCondition = 4,
    WillPerformTransition = 5,
    WillPerformAction = 6,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::IterationStart,
        MessageType::IterationEnd,
        MessageType::CurrentState,
        MessageType::WillCheckCondition,
        MessageType::WillPerformTransition,
        MessageType::WillPerformAction,
    ];

    pub fn payload_len(self) -> usize {
        match self {
            MessageType::IterationStart | MessageType::IterationEnd => 0,
            MessageType::CurrentState | MessageType::WillPerformTransition => 2,
            MessageType::WillCheckCondition | MessageType::WillPerformAction => 4,
        }
    }

    /// Name used for the constants and functions of the device-side header
    pub fn name(self) -> &'static str {
        match self {
            MessageType::IterationStart => "IterationStart",
            MessageType::IterationEnd => "IterationEnd",
            MessageType::CurrentState => "CurrentState",
            MessageType::WillCheckCondition => "WillCheckCondition",
            MessageType::WillPerformTransition => "WillPerformTransition",
            MessageType::WillPerformAction => "WillPerformAction",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> ProtocolResult<Self> {
        MessageType::ALL
            .into_iter()
            .find(|t| *t as u8 == value)
            .ok_or(ProtocolError::UnknownMessageType(value))
    }
}

/// One decoded or to-be-encoded message, with raw symbol ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Message {
    IterationStart,
    IterationEnd,
    CurrentState { state: u16 },
    WillCheckCondition { transition: u16, condition: u16 },
    WillPerformTransition { transition: u16 },
    WillPerformAction { transition: u16, index: u16 },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::IterationStart => MessageType::IterationStart,
            Message::IterationEnd => MessageType::IterationEnd,
            Message::CurrentState { .. } => MessageType::CurrentState,
            Message::WillCheckCondition { .. } => MessageType::WillCheckCondition,
            Message::WillPerformTransition { .. } => MessageType::WillPerformTransition,
            Message::WillPerformAction { .. } => MessageType::WillPerformAction,
        }
    }

    fn fields(&self) -> Vec<u16> {
        match *self {
            Message::IterationStart | Message::IterationEnd => Vec::new(),
            Message::CurrentState { state } => vec![state],
            Message::WillCheckCondition {
                transition,
                condition,
            } => vec![transition, condition],
            Message::WillPerformTransition { transition } => vec![transition],
            Message::WillPerformAction { transition, index } => vec![transition, index],
        }
    }

    /// Append the complete frame for this message to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let fields = self.fields();
        let payload_len = (fields.len() * 2) as u16;
        out.extend_from_slice(&START_SEQUENCE);
        out.push(self.message_type() as u8);
        out.extend_from_slice(&payload_len.to_be_bytes());
        for field in fields {
            out.extend_from_slice(&field.to_be_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + MAX_KNOWN_PAYLOAD);
        self.encode_into(&mut out);
        out
    }

    /// Decode a payload whose header has already been read
    pub fn decode(message_type: MessageType, payload: &[u8]) -> ProtocolResult<Self> {
        let expected = message_type.payload_len();
        if payload.len() != expected {
            return Err(ProtocolError::PayloadLength {
                message_type,
                expected,
                actual: payload.len(),
            });
        }
        let field = |i: usize| u16::from_be_bytes([payload[2 * i], payload[2 * i + 1]]);

        Ok(match message_type {
            MessageType::IterationStart => Message::IterationStart,
            MessageType::IterationEnd => Message::IterationEnd,
            MessageType::CurrentState => Message::CurrentState { state: field(0) },
            MessageType::WillCheckCondition => Message::WillCheckCondition {
                transition: field(0),
                condition: field(1),
            },
            MessageType::WillPerformTransition => Message::WillPerformTransition {
                transition: field(0),
            },
            MessageType::WillPerformAction => Message::WillPerformAction {
                transition: field(0),
                index: field(1),
            },
        })
    }
}
