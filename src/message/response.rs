//! Response convenience wrapper around [`Packet`].
//!
//! Validates that the code belongs to a response class (2-5) and maps the
//! Location-Path/Location-Query/Content-Format options to plain fields.

use std::fmt;

use crate::error::MessageError;
use crate::message::header::{Header, MessageClass, MessageType, ResponseType, PROTOCOL_VERSION};
use crate::message::options::Options;
use crate::message::packet::{DecodeOptions, Packet};
use crate::message::request::{decode_path, encode_path};
use crate::message::schema::{MediaType, CONTENT_FORMAT, LOCATION_PATH, LOCATION_QUERY};

/// A CoAP response message.
///
/// The `content_format`, `location_path` and `location_queries` fields
/// override the corresponding options at encode time when set; decoding
/// fills them from the received options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoapResponse {
    /// Responses may use any message type: piggybacked ACK, separate CON or
    /// NON, or RST.
    pub message_type: MessageType,
    pub status: ResponseType,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub options: Options,

    /// Overrides the Content-Format option when set.
    pub content_format: Option<MediaType>,
    /// Overrides the Location-Path options when non-empty.
    pub location_path: String,
    /// Overrides the Location-Query options when non-empty.
    pub location_queries: Vec<String>,

    pub payload: Vec<u8>,
}

impl Default for ResponseType {
    fn default() -> ResponseType {
        ResponseType::Content
    }
}

impl fmt::Display for ResponseType {
    /// Canonical `C.DD` form of the status code.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", MessageClass::Response(*self))
    }
}

impl CoapResponse {
    pub fn new(status: ResponseType) -> CoapResponse {
        CoapResponse {
            status,
            ..CoapResponse::default()
        }
    }

    /// Appends the encoded response to `buf`, applying the field overrides
    /// to a working copy of the options.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), MessageError> {
        let mut options = self.options.clone();

        if let Some(media_type) = self.content_format {
            options.set_uint(CONTENT_FORMAT, u32::from(media_type.code))?;
        }

        if !self.location_path.is_empty() {
            options.set_all_string(LOCATION_PATH, encode_path(&self.location_path))?;
        }

        if !self.location_queries.is_empty() {
            options.set_all_string(LOCATION_QUERY, self.location_queries.iter().cloned())?;
        }

        let packet = Packet {
            header: Header {
                version: PROTOCOL_VERSION,
                message_type: self.message_type,
                code: MessageClass::Response(self.status),
                message_id: self.message_id,
                token: self.token.clone(),
            },
            options,
            payload: self.payload.clone(),
        };

        packet.encode(buf)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;

        Ok(buf)
    }

    /// Decodes a response, validating that the code is a response status
    /// and extracting the location and content-format fields.
    ///
    /// Fails with [`MessageError::InvalidCode`] when the code class is not
    /// 2-5.
    pub fn from_bytes(data: &[u8], opts: &DecodeOptions) -> Result<CoapResponse, MessageError> {
        let packet = Packet::from_bytes(data, opts)?;

        let status = match packet.header.code {
            MessageClass::Response(status) => status,
            code => return Err(MessageError::InvalidCode { code }),
        };

        let content_format = packet
            .options
            .get_uint(CONTENT_FORMAT)
            .ok()
            .map(|code| opts.schema().media_type(code as u16));
        let location_path = decode_path(packet.options.get_all_string(LOCATION_PATH)?);
        let location_queries: Vec<String> = packet
            .options
            .get_all_string(LOCATION_QUERY)?
            .map(str::to_string)
            .collect();

        Ok(CoapResponse {
            message_type: packet.header.message_type,
            status,
            message_id: packet.header.message_id,
            token: packet.header.token,
            options: packet.options,
            content_format,
            location_path,
            location_queries,
            payload: packet.payload,
        })
    }
}

impl fmt::Display for CoapResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Response(Type={}, MessageID={}, Status={})",
            self.message_type, self.message_id, self.status
        )
    }
}
