//! The complete CoAP message: header, options, payload marker and payload.

use std::sync::Arc;

use crate::error::MessageError;
use crate::message::header::{Header, HEADER_LENGTH};
use crate::message::options::Options;
use crate::message::schema::{default_schema, Schema};

/// Single byte separating options from a non-empty payload.
pub const PAYLOAD_MARKER: u8 = 0xFF;

/// Default maximum datagram length accepted by the decoder.
pub const MAX_MESSAGE_LENGTH: usize = 65535;

/// Default maximum payload length: a maximal datagram minus the fixed
/// header and payload marker.
pub const MAX_PAYLOAD_LENGTH: usize = MAX_MESSAGE_LENGTH - HEADER_LENGTH - 1;

/// Default maximum number of options kept per message.
pub const MAX_OPTIONS: usize = 256;

/// Default maximum value length for unrecognized options.
pub const MAX_OPTION_LENGTH: u16 = 1024;

/// Decoder parameters: the schema and the advisory size budgets used for
/// robustness against hostile input.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Option/media-type registry; `None` means the default well-known
    /// registry.
    pub schema: Option<Arc<Schema>>,
    pub max_message_length: usize,
    pub max_payload_length: usize,
    pub max_options: usize,
    pub max_option_length: u16,
}

impl Default for DecodeOptions {
    fn default() -> DecodeOptions {
        DecodeOptions {
            schema: None,
            max_message_length: MAX_MESSAGE_LENGTH,
            max_payload_length: MAX_PAYLOAD_LENGTH,
            max_options: MAX_OPTIONS,
            max_option_length: MAX_OPTION_LENGTH,
        }
    }
}

impl DecodeOptions {
    pub(crate) fn schema(&self) -> &Schema {
        match &self.schema {
            Some(schema) => schema,
            None => default_schema(),
        }
    }
}

/// A CoAP message as sent and received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub options: Options,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new() -> Packet {
        Packet {
            header: Header::new(),
            ..Packet::default()
        }
    }

    /// Appends the encoded message to `buf`.
    ///
    /// The payload marker is emitted only when the payload is non-empty; no
    /// trailing bytes follow the payload.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), MessageError> {
        self.header.encode(buf)?;
        self.options.encode(buf)?;

        if !self.payload.is_empty() {
            buf.push(PAYLOAD_MARKER);
            buf.extend_from_slice(&self.payload);
        }

        Ok(())
    }

    /// Encodes the message into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;

        Ok(buf)
    }

    /// Decodes a message, enforcing the size budgets in `opts`.
    ///
    /// Header and option errors are wrapped in
    /// [`MessageError::Unmarshal`] carrying the absolute byte offset at
    /// which decoding failed; budget breaches are returned bare.
    pub fn from_bytes(data: &[u8], opts: &DecodeOptions) -> Result<Packet, MessageError> {
        if data.len() > opts.max_message_length {
            return Err(MessageError::MessageTooLong {
                limit: opts.max_message_length,
                length: data.len(),
            });
        }

        let mut pos = 0;

        let header = match Header::decode(data, &mut pos) {
            Ok(header) => header,
            Err(cause) => return Err(cause.at_offset(pos)),
        };

        let options = match Options::decode(
            data,
            &mut pos,
            opts.schema(),
            opts.max_options,
            opts.max_option_length,
        ) {
            Ok(options) => options,
            Err(cause) => return Err(cause.at_offset(pos)),
        };

        // anything left starts with the payload marker the options decoder
        // stopped on; a lone marker means no payload
        let mut payload = Vec::new();
        if pos < data.len() {
            let rest = &data[pos + 1..];
            if rest.len() > opts.max_payload_length {
                return Err(MessageError::PayloadTooLong {
                    limit: opts.max_payload_length,
                    length: rest.len(),
                });
            }

            payload = rest.to_vec();
        }

        Ok(Packet {
            header,
            options,
            payload,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::header::{MessageClass, MessageType, RequestType, ResponseType};
    use crate::message::option::CoapOption;
    use crate::message::schema::{MAX_AGE, URI_PATH, URI_QUERY};

    fn decoded(data: &[u8]) -> Packet {
        Packet::from_bytes(data, &DecodeOptions::default()).unwrap()
    }

    #[test]
    fn test_packet_roundtrip_with_options() {
        let data = [
            0x44, 0x01, 0x84, 0x9E, 0x51, 0x55, 0x77, 0xE8, // header
            0xB2, 0x48, 0x69, // Uri-Path "Hi"
            0x04, 0x54, 0x65, 0x73, 0x74, // Uri-Path "Test"
            0x43, 0x61, 0x3D, 0x31, // Uri-Query "a=1"
        ];

        let packet = decoded(&data);
        assert_eq!(packet.header.version, 1);
        assert_eq!(packet.header.message_type, MessageType::Confirmable);
        assert_eq!(
            packet.header.code,
            MessageClass::Request(RequestType::Get)
        );
        assert_eq!(packet.header.message_id, 33950);
        assert_eq!(packet.header.token, [0x51, 0x55, 0x77, 0xE8]);

        let paths: Vec<&str> = packet.options.get_all_string(URI_PATH).unwrap().collect();
        assert_eq!(paths, ["Hi", "Test"]);
        let queries: Vec<&str> = packet.options.get_all_string(URI_QUERY).unwrap().collect();
        assert_eq!(queries, ["a=1"]);
        assert!(packet.payload.is_empty());

        assert_eq!(packet.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_packet_roundtrip_with_payload() {
        let data = [
            0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, // header
            0xFF, 0x48, 0x65, 0x6C, 0x6C, 0x6F, // payload "Hello"
        ];

        let packet = decoded(&data);
        assert_eq!(packet.header.message_type, MessageType::Acknowledgement);
        assert_eq!(
            packet.header.code,
            MessageClass::Response(ResponseType::Content)
        );
        assert_eq!(packet.header.message_id, 5117);
        assert_eq!(packet.payload, b"Hello");

        assert_eq!(packet.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_packet_roundtrip_with_payload_and_options() {
        let data = [
            0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, // header
            0xD3, 0x01, 0x42, 0x42, 0x42, // Max-Age 0x424242
            0xFF, 0x48, 0x65, 0x6C, 0x6C, 0x6F, // payload "Hello"
        ];

        let packet = decoded(&data);
        assert_eq!(packet.options.get_uint(MAX_AGE).unwrap(), 0x424242);
        assert_eq!(packet.payload, b"Hello");

        assert_eq!(packet.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_packet_encode_from_scratch() {
        let mut packet = Packet::new();
        packet.header.message_type = MessageType::Confirmable;
        packet.header.code = MessageClass::Request(RequestType::Get);
        packet.header.message_id = 33950;
        packet.header.token = vec![0x51, 0x55, 0x77, 0xE8];
        packet
            .options
            .push(CoapOption::new(URI_PATH, "Hi").unwrap());
        packet
            .options
            .push(CoapOption::new(URI_PATH, "Test").unwrap());
        packet.options.set_string(URI_QUERY, "a=1").unwrap();

        assert_eq!(
            packet.to_bytes().unwrap(),
            [
                0x44, 0x01, 0x84, 0x9E, 0x51, 0x55, 0x77, 0xE8, 0xB2, 0x48, 0x69, 0x04, 0x54,
                0x65, 0x73, 0x74, 0x43, 0x61, 0x3D, 0x31,
            ]
        );
    }

    #[test]
    fn test_empty_payload_has_no_marker() {
        let packet = Packet::new();
        let data = packet.to_bytes().unwrap();
        assert_eq!(data.len(), HEADER_LENGTH);
        assert!(!data.contains(&PAYLOAD_MARKER));

        // a lone trailing marker decodes to an empty payload
        let mut with_marker = data.clone();
        with_marker.push(PAYLOAD_MARKER);
        let decoded = Packet::from_bytes(&with_marker, &DecodeOptions::default()).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_packet_decode_errors() {
        let cases: Vec<(&str, Vec<u8>, DecodeOptions, MessageError)> = vec![
            (
                "unknown version",
                vec![0x84, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC],
                DecodeOptions::default(),
                MessageError::UnsupportedVersion { version: 2 }.at_offset(0),
            ),
            (
                "unsupported token length",
                vec![0x6C, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, 0x4D, 0xAC],
                DecodeOptions::default(),
                MessageError::UnsupportedTokenLength { length: 12 }.at_offset(4),
            ),
            (
                "truncated header",
                vec![0x64, 0x45],
                DecodeOptions::default(),
                MessageError::Truncated { expected: 4 }.at_offset(0),
            ),
            (
                "truncated response header",
                vec![0x60, 0x45, 0x00],
                DecodeOptions::default(),
                MessageError::Truncated { expected: 4 }.at_offset(0),
            ),
            (
                "truncated token",
                vec![0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2],
                DecodeOptions::default(),
                MessageError::Truncated { expected: 4 }.at_offset(4),
            ),
            (
                "truncated options",
                vec![
                    0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, // header
                    0xD3, 0x01, 0x42, // truncated Max-Age
                ],
                DecodeOptions::default(),
                MessageError::Truncated { expected: 3 }.at_offset(10),
            ),
            (
                "message too long",
                vec![
                    0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, 0xFF, 0x48, 0x65, 0x6C, 0x6C,
                    0x6F,
                ],
                DecodeOptions {
                    max_message_length: 10,
                    ..DecodeOptions::default()
                },
                MessageError::MessageTooLong {
                    limit: 10,
                    length: 14,
                },
            ),
            (
                "payload too long",
                vec![
                    0x64, 0x45, 0x13, 0xFD, 0xD0, 0xE2, 0x4D, 0xAC, 0xFF, 0x48, 0x65, 0x6C, 0x6C,
                    0x6F,
                ],
                DecodeOptions {
                    max_payload_length: 2,
                    ..DecodeOptions::default()
                },
                MessageError::PayloadTooLong {
                    limit: 2,
                    length: 5,
                },
            ),
        ];

        for (name, data, opts, expected) in cases {
            let err = Packet::from_bytes(&data, &opts).expect_err(name);
            assert_eq!(err, expected, "{name}");
        }
    }

    #[test]
    fn test_malicious_packet() {
        use quickcheck::{Gen, QuickCheck, TestResult};

        fn run(data: Vec<u8>) -> TestResult {
            let opts = DecodeOptions::default();
            let packet = match Packet::from_bytes(&data, &opts) {
                Ok(packet) => packet,
                Err(_) => return TestResult::passed(),
            };

            if packet.header.version != 1 || packet.header.token.len() > 8 {
                return TestResult::failed();
            }
            if packet.options.len() > opts.max_options {
                return TestResult::failed();
            }

            // a successfully decoded packet is canonical: re-encoding and
            // re-decoding it is the identity
            let encoded = match packet.to_bytes() {
                Ok(encoded) => encoded,
                Err(_) => return TestResult::passed(),
            };
            let reparsed = match Packet::from_bytes(&encoded, &opts) {
                Ok(reparsed) => reparsed,
                Err(_) => return TestResult::failed(),
            };

            TestResult::from_bool(reparsed == packet)
        }

        QuickCheck::new()
            .tests(10000)
            .gen(Gen::new(1500))
            .quickcheck(run as fn(Vec<u8>) -> TestResult)
    }
}
