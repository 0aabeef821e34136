//! Error types for message encoding/decoding and connection handling.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::message::header::{MessageClass, MessageType};
use crate::message::schema::{OptionDef, ValueFormat};

/// Errors produced while encoding or decoding CoAP messages.
///
/// Lower layers return bare variants; [`Packet`](crate::message::packet::Packet),
/// [`CoapRequest`](crate::message::request::CoapRequest) and
/// [`CoapResponse`](crate::message::response::CoapResponse) wrap codec errors
/// with the absolute byte offset via [`MessageError::Unmarshal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Header version differs from the protocol version (1).
    #[error("unsupported version {version}, expected 1")]
    UnsupportedVersion { version: u8 },

    /// Message type is not valid for the current role.
    #[error("invalid type {message_type}")]
    InvalidType { message_type: MessageType },

    /// Code class does not match the current role, e.g. a response code in a
    /// request.
    #[error("invalid code {code}")]
    InvalidCode { code: MessageClass },

    /// Token length exceeds the 8 byte maximum.
    #[error("unsupported token length {length}, max is 8")]
    UnsupportedTokenLength { length: usize },

    /// Not enough bytes left for the sub-field being decoded.
    #[error("truncated input, expected {expected} bytes")]
    Truncated { expected: usize },

    /// Extend nibble 15 is reserved.
    #[error("unsupported extend value")]
    UnsupportedExtend,

    #[error("message too long, max {limit} bytes, got {length} bytes")]
    MessageTooLong { limit: usize, length: usize },

    #[error("payload too long, max {limit} bytes, got {length} bytes")]
    PayloadTooLong { limit: usize, length: usize },

    #[error("too many options, max {limit}, got {length}")]
    TooManyOptions { limit: usize, length: usize },

    #[error("option {} not found", .def.label())]
    OptionNotFound { def: OptionDef },

    #[error("option {} is not repeatable", .def.label())]
    OptionNotRepeatable { def: OptionDef },

    /// A typed accessor was used on an option whose definition declares a
    /// different value format.
    #[error("unsupported option {} value format {requested}, actual {}", .def.label(), .def.value_format)]
    InvalidOptionValueFormat {
        def: OptionDef,
        requested: ValueFormat,
    },

    /// Option value length outside the definition's `[min_len, max_len]`.
    #[error("expected option {} value length between {} and {}, got {length}", .def.label(), .def.min_len, .def.max_len)]
    InvalidOptionValueLength { def: OptionDef, length: u16 },

    /// Encoding one option of a collection failed.
    #[error("encode option {}: {cause}", .def.label())]
    EncodeOption {
        def: OptionDef,
        cause: Box<MessageError>,
    },

    /// Wrapper carrying the absolute byte offset at which decoding failed.
    #[error("unmarshal error at offset {offset}: {cause}")]
    Unmarshal {
        offset: usize,
        cause: Box<MessageError>,
    },
}

impl MessageError {
    /// Wraps a bare codec error with the byte offset at which it occurred.
    pub(crate) fn at_offset(self, offset: usize) -> MessageError {
        MessageError::Unmarshal {
            offset,
            cause: Box::new(self),
        }
    }
}

/// Errors surfaced by [`Connection`](crate::connection::Connection) and its
/// retransmission machinery.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection was closed; all subsequent operations fail with this.
    #[error("connection closed")]
    Closed,

    /// A datagram arrived from `peer` but could not be decoded.
    #[error("invalid message from {peer}: {cause}")]
    Decode {
        peer: SocketAddr,
        cause: MessageError,
    },

    /// A message could not be encoded for transmission.
    #[error(transparent)]
    Encode(#[from] MessageError),

    /// A Confirmable message was retransmitted the maximum number of times
    /// without an acknowledgement.
    #[error("retransmit retry limit reached after {retransmits} of {max} retransmits")]
    RetransmitRetryLimit { retransmits: u32, max: u32 },

    /// The sender gave up waiting for an acknowledgement.
    #[error("retransmit wait limit of {wait:?} exceeded")]
    RetransmitWaitLimit { wait: Duration },

    #[error(transparent)]
    Io(#[from] io::Error),
}
