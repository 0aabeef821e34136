//! Request convenience wrapper around [`Packet`].
//!
//! Validates the role rules of RFC 7252 §5.1 (type CON/NON, code class 0)
//! and maps the Uri-Host/Uri-Port/Uri-Path/Uri-Query options to plain
//! fields.

use std::fmt;

use crate::error::MessageError;
use crate::message::header::{Header, MessageClass, MessageType, RequestType, PROTOCOL_VERSION};
use crate::message::options::Options;
use crate::message::packet::{DecodeOptions, Packet};
use crate::message::schema::{URI_HOST, URI_PATH, URI_PORT, URI_QUERY};

/// A CoAP request message.
///
/// The `host`, `port`, `path` and `queries` fields override the
/// corresponding options at encode time when set; decoding fills them from
/// the received options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoapRequest {
    /// Confirmable or NonConfirmable; other types fail encoding.
    pub message_type: MessageType,
    pub method: RequestType,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub options: Options,

    /// Overrides the Uri-Host option when non-empty.
    pub host: String,
    /// Overrides the Uri-Port option when non-zero.
    pub port: u16,
    /// Overrides the Uri-Path options when non-empty.
    pub path: String,
    /// Overrides the Uri-Query options when non-empty.
    pub queries: Vec<String>,

    pub payload: Vec<u8>,
}

impl Default for RequestType {
    fn default() -> RequestType {
        RequestType::Get
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestType::Get => "GET",
            RequestType::Post => "POST",
            RequestType::Put => "PUT",
            RequestType::Delete => "DELETE",
            RequestType::Fetch => "FETCH",
            RequestType::Patch => "PATCH",
            RequestType::IPatch => "iPATCH",
        };

        f.write_str(s)
    }
}

impl CoapRequest {
    pub fn new(method: RequestType) -> CoapRequest {
        CoapRequest {
            method,
            ..CoapRequest::default()
        }
    }

    /// Appends the encoded request to `buf`, applying the URI field
    /// overrides to a working copy of the options.
    ///
    /// Fails with [`MessageError::InvalidType`] unless the type is
    /// Confirmable or NonConfirmable.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), MessageError> {
        if self.message_type != MessageType::Confirmable
            && self.message_type != MessageType::NonConfirmable
        {
            return Err(MessageError::InvalidType {
                message_type: self.message_type,
            });
        }

        let mut options = self.options.clone();

        if !self.host.is_empty() {
            options.set_string(URI_HOST, self.host.clone())?;
        }

        if self.port != 0 {
            options.set_uint(URI_PORT, u32::from(self.port))?;
        }

        if !self.path.is_empty() {
            options.set_all_string(URI_PATH, encode_path(&self.path))?;
        }

        if !self.queries.is_empty() {
            options.set_all_string(URI_QUERY, self.queries.iter().cloned())?;
        }

        let packet = Packet {
            header: Header {
                version: PROTOCOL_VERSION,
                message_type: self.message_type,
                code: MessageClass::Request(self.method),
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

    /// Decodes a request, validating the role rules and extracting the URI
    /// fields from the options.
    ///
    /// Fails with [`MessageError::InvalidType`] for ACK/RST and
    /// [`MessageError::InvalidCode`] when the code is not a request method.
    pub fn from_bytes(data: &[u8], opts: &DecodeOptions) -> Result<CoapRequest, MessageError> {
        let packet = Packet::from_bytes(data, opts)?;

        if packet.header.message_type != MessageType::Confirmable
            && packet.header.message_type != MessageType::NonConfirmable
        {
            return Err(MessageError::InvalidType {
                message_type: packet.header.message_type,
            });
        }

        let method = match packet.header.code {
            MessageClass::Request(method) => method,
            code => return Err(MessageError::InvalidCode { code }),
        };

        let host = packet
            .options
            .get_string(URI_HOST)
            .unwrap_or_default()
            .to_string();
        let port = packet.options.get_uint(URI_PORT).unwrap_or(0) as u16;
        let path = decode_path(packet.options.get_all_string(URI_PATH)?);
        let queries: Vec<String> = packet
            .options
            .get_all_string(URI_QUERY)?
            .map(str::to_string)
            .collect();

        Ok(CoapRequest {
            message_type: packet.header.message_type,
            method,
            message_id: packet.header.message_id,
            token: packet.header.token,
            options: packet.options,
            host,
            port,
            path,
            queries,
            payload: packet.payload,
        })
    }
}

impl fmt::Display for CoapRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request(Type={}, MessageID={}, Method={}, Path={})",
            self.message_type, self.message_id, self.method, self.path
        )
    }
}

/// Splits a path into Uri-Path segment values; `""` and `"/"` yield no
/// segments.
pub fn encode_path(path: &str) -> impl Iterator<Item = String> + '_ {
    let path = path.strip_prefix('/').unwrap_or(path);
    let segments = if path.is_empty() {
        None
    } else {
        Some(path.split('/'))
    };

    segments.into_iter().flatten().map(str::to_string)
}

/// Joins Uri-Path segment values into a `/`-prefixed path; no segments
/// yield `"/"`.
pub fn decode_path<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }

    if path.is_empty() {
        path.push('/');
    }

    path
}
