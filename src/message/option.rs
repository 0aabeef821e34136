//! A single CoAP option: a schema definition paired with a typed value.
//!
//! Options travel on the wire delta-encoded against the previous option's
//! code (RFC 7252 §3.1), so both `encode` and `decode` take the running
//! `prev` code maintained by the collection layer.

use std::fmt;

use crate::error::MessageError;
use crate::message::codec::{decode_extend, decode_uint, encode_extend, encode_uint, uint_len};
use crate::message::schema::{OptionDef, Schema, ValueFormat};

/// Typed option value matching the definition's [`ValueFormat`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OptionValue {
    #[default]
    Empty,
    Uint(u32),
    Opaque(Vec<u8>),
    String(String),
}

impl OptionValue {
    /// The wire format this value encodes as.
    pub fn format(&self) -> ValueFormat {
        match self {
            OptionValue::Empty => ValueFormat::Empty,
            OptionValue::Uint(_) => ValueFormat::Uint,
            OptionValue::Opaque(_) => ValueFormat::Opaque,
            OptionValue::String(_) => ValueFormat::String,
        }
    }

    /// Encoded length in bytes; uints use their minimal big-endian length.
    pub fn len(&self) -> u16 {
        match self {
            OptionValue::Empty => 0,
            OptionValue::Uint(v) => uint_len(*v),
            OptionValue::Opaque(v) => v.len() as u16,
            OptionValue::String(v) => v.len() as u16,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical encoded bytes of the value, used when a repeated
    /// non-repeatable option is demoted to an unrecognized opaque one.
    fn into_bytes(self) -> Vec<u8> {
        match self {
            OptionValue::Empty => Vec::new(),
            OptionValue::Uint(v) => {
                let mut buf = Vec::with_capacity(4);
                encode_uint(v, &mut buf);
                buf
            }
            OptionValue::Opaque(v) => v,
            OptionValue::String(v) => v.into_bytes(),
        }
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> OptionValue {
        OptionValue::Uint(v)
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(v: Vec<u8>) -> OptionValue {
        OptionValue::Opaque(v)
    }
}

impl From<&[u8]> for OptionValue {
    fn from(v: &[u8]) -> OptionValue {
        OptionValue::Opaque(v.to_vec())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> OptionValue {
        OptionValue::String(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> OptionValue {
        OptionValue::String(v.to_string())
    }
}

/// A CoAP option: an [`OptionDef`] and exactly one value matching its
/// format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    def: OptionDef,
    value: OptionValue,
}

impl CoapOption {
    /// Creates an option, validating that the value's format matches the
    /// definition and its encoded length is within `[min_len, max_len]`.
    pub fn new(def: OptionDef, value: impl Into<OptionValue>) -> Result<CoapOption, MessageError> {
        let value = value.into();
        if value.format() != def.value_format {
            return Err(MessageError::InvalidOptionValueFormat {
                def,
                requested: value.format(),
            });
        }

        let length = value.len();
        if length < def.min_len || length > def.max_len {
            return Err(MessageError::InvalidOptionValueLength { def, length });
        }

        Ok(CoapOption { def, value })
    }

    /// Creates a valueless option for an [`ValueFormat::Empty`] definition.
    pub fn empty(def: OptionDef) -> Result<CoapOption, MessageError> {
        CoapOption::new(def, OptionValue::Empty)
    }

    pub fn def(&self) -> OptionDef {
        self.def
    }

    pub fn code(&self) -> u16 {
        self.def.code
    }

    pub fn value(&self) -> &OptionValue {
        &self.value
    }

    /// Encoded value length in bytes.
    pub fn len(&self) -> u16 {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Returns the uint value, failing when the definition declares another
    /// format.
    pub fn uint(&self) -> Result<u32, MessageError> {
        match &self.value {
            OptionValue::Uint(v) => Ok(*v),
            _ => Err(MessageError::InvalidOptionValueFormat {
                def: self.def,
                requested: ValueFormat::Uint,
            }),
        }
    }

    /// Returns the opaque value, failing when the definition declares
    /// another format.
    pub fn opaque(&self) -> Result<&[u8], MessageError> {
        match &self.value {
            OptionValue::Opaque(v) => Ok(v),
            _ => Err(MessageError::InvalidOptionValueFormat {
                def: self.def,
                requested: ValueFormat::Opaque,
            }),
        }
    }

    /// Returns the string value, failing when the definition declares
    /// another format.
    pub fn string(&self) -> Result<&str, MessageError> {
        match &self.value {
            OptionValue::String(v) => Ok(v),
            _ => Err(MessageError::InvalidOptionValueFormat {
                def: self.def,
                requested: ValueFormat::String,
            }),
        }
    }

    /// Demotes the option to the synthetic unrecognized definition, turning
    /// the value into its canonical opaque bytes.
    ///
    /// The collection decoder applies this to the second occurrence of a
    /// non-repeatable option (RFC 7252 §5.4.5).
    pub(crate) fn into_unrecognized(self, max_len: u16) -> CoapOption {
        CoapOption {
            def: OptionDef::unrecognized(self.def.code, max_len),
            value: OptionValue::Opaque(self.value.into_bytes()),
        }
    }

    /// Appends the option to `buf`, delta-encoded against `prev`.
    ///
    /// The caller guarantees `prev <= self.code()`; equal codes encode a
    /// repetition with delta 0.
    pub fn encode(&self, buf: &mut Vec<u8>, prev: u16) -> Result<(), MessageError> {
        let length = self.len();
        if length < self.def.min_len || length > self.def.max_len {
            return Err(MessageError::InvalidOptionValueLength {
                def: self.def,
                length,
            });
        }

        // reserve the delta/length header byte, patch it after the extends
        let header = buf.len();
        buf.push(0);

        let delta = self.def.code.wrapping_sub(prev);
        let delta_nibble = encode_extend(delta, buf);
        let length_nibble = encode_extend(length, buf);
        buf[header] = delta_nibble << 4 | length_nibble;

        match &self.value {
            OptionValue::Empty => {}
            OptionValue::Uint(v) => encode_uint(*v, buf),
            OptionValue::Opaque(v) => buf.extend_from_slice(v),
            OptionValue::String(v) => buf.extend_from_slice(v.as_bytes()),
        }

        Ok(())
    }

    /// Decodes one option from `data` at `*pos`, resolving its code against
    /// `prev` and its definition against `schema`.
    ///
    /// Unknown codes resolve to an unrecognized opaque definition bounded by
    /// `max_option_length`. Decoded bytes are copied out of `data`.
    pub fn decode(
        data: &[u8],
        pos: &mut usize,
        prev: u16,
        schema: &Schema,
        max_option_length: u16,
    ) -> Result<CoapOption, MessageError> {
        let header = match data.get(*pos) {
            Some(b) => *b,
            None => return Err(MessageError::Truncated { expected: 1 }),
        };
        *pos += 1;

        let delta = decode_extend(data, pos, header >> 4)?;
        let length = decode_extend(data, pos, header & 0x0F)?;

        let code = prev.wrapping_add(delta);
        let def = schema.option(code, max_option_length);

        let rest = &data[*pos..];
        if rest.len() < usize::from(length) {
            return Err(MessageError::Truncated {
                expected: usize::from(length),
            });
        }
        if length < def.min_len || length > def.max_len {
            return Err(MessageError::InvalidOptionValueLength { def, length });
        }
        if def.value_format == ValueFormat::Uint && length > 4 {
            return Err(MessageError::InvalidOptionValueLength { def, length });
        }

        let raw = &rest[..usize::from(length)];
        *pos += usize::from(length);

        let value = match def.value_format {
            ValueFormat::Empty => OptionValue::Empty,
            ValueFormat::Uint => OptionValue::Uint(decode_uint(raw)),
            ValueFormat::Opaque => OptionValue::Opaque(raw.to_vec()),
            ValueFormat::String => OptionValue::String(String::from_utf8_lossy(raw).into_owned()),
        };

        Ok(CoapOption { def, value })
    }
}

impl fmt::Display for CoapOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.def.recognized() {
            self.def.name.to_string()
        } else {
            self.def.code.to_string()
        };

        match &self.value {
            OptionValue::Empty => write!(f, "Option({name})"),
            OptionValue::Uint(v) => write!(f, "{name}({v})"),
            OptionValue::Opaque(v) => {
                write!(f, "{name}(")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                write!(f, ")")
            }
            OptionValue::String(v) => write!(f, "{name}({v:?})"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::schema::{
        default_schema, ETAG, IF_MATCH, IF_NONE_MATCH, MAX_AGE, PROXY_URI, URI_HOST, URI_PORT,
    };

    fn bytes8() -> Vec<u8> {
        b"deadbeef".to_vec()
    }

    fn bytes16() -> Vec<u8> {
        bytes8().repeat(2)
    }

    fn bytes272() -> Vec<u8> {
        bytes8().repeat(34)
    }

    #[test]
    fn test_option_new_validation() {
        assert!(CoapOption::new(IF_MATCH, bytes8()).is_ok());

        assert_eq!(
            CoapOption::new(URI_HOST, bytes8()),
            Err(MessageError::InvalidOptionValueFormat {
                def: URI_HOST,
                requested: ValueFormat::Opaque,
            })
        );

        assert_eq!(
            CoapOption::new(IF_MATCH, bytes272()),
            Err(MessageError::InvalidOptionValueLength {
                def: IF_MATCH,
                length: 272,
            })
        );

        assert_eq!(
            CoapOption::new(ETAG, Vec::<u8>::new()),
            Err(MessageError::InvalidOptionValueLength {
                def: ETAG,
                length: 0,
            })
        );

        // a uint whose minimal encoding exceeds max_len
        assert_eq!(
            CoapOption::new(URI_PORT, 0x10000u32),
            Err(MessageError::InvalidOptionValueLength {
                def: URI_PORT,
                length: 3,
            })
        );
    }

    #[test]
    fn test_option_roundtrip() {
        let cases: Vec<(&str, Vec<u8>, u16, OptionValue)> = vec![
            ("empty value format", vec![0x50], IF_NONE_MATCH.code, OptionValue::Empty),
            (
                "opaque value format",
                vec![0x14, 0xde, 0xad, 0xbe, 0xef],
                IF_MATCH.code,
                OptionValue::Opaque(vec![0xde, 0xad, 0xbe, 0xef]),
            ),
            (
                "string value format",
                [vec![0x38], bytes8()].concat(),
                URI_HOST.code,
                OptionValue::String("deadbeef".to_string()),
            ),
            (
                "uint value format/1",
                vec![0x71, 0x42],
                URI_PORT.code,
                OptionValue::Uint(0x42),
            ),
            (
                "uint value format/2",
                vec![0x72, 0x42, 0x42],
                URI_PORT.code,
                OptionValue::Uint(0x4242),
            ),
            (
                "uint value format/3",
                vec![0xD3, 0x01, 0x42, 0x42, 0x42],
                MAX_AGE.code,
                OptionValue::Uint(0x424242),
            ),
            (
                "uint value format/4",
                vec![0xD4, 0x01, 0x42, 0x42, 0x42, 0x42],
                MAX_AGE.code,
                OptionValue::Uint(0x42424242),
            ),
            (
                "delta extend byte",
                vec![0xD0, 0x01],
                MAX_AGE.code,
                OptionValue::Uint(0),
            ),
            (
                "delta extend dword",
                vec![0xE0, 0x00, 0x01],
                270,
                OptionValue::Opaque(Vec::new()),
            ),
            (
                "length extend byte",
                [vec![0xDD, 0x16, 0x03], bytes16()].concat(),
                PROXY_URI.code,
                OptionValue::String(String::from_utf8(bytes16()).unwrap()),
            ),
            (
                "length extend dword",
                [vec![0xDE, 0x16, 0x00, 0x03], bytes272()].concat(),
                PROXY_URI.code,
                OptionValue::String(String::from_utf8(bytes272()).unwrap()),
            ),
        ];

        let schema = default_schema();

        for (name, input, code, expected) in cases {
            let mut pos = 0;
            let opt = CoapOption::decode(&input, &mut pos, 0, schema, 1024)
                .unwrap_or_else(|e| panic!("{name}: decode: {e}"));
            assert_eq!(pos, input.len(), "{name}: consumed");
            assert_eq!(opt.code(), code, "{name}: code");
            assert_eq!(*opt.value(), expected, "{name}: value");

            let mut buf = Vec::new();
            opt.encode(&mut buf, 0).unwrap_or_else(|e| panic!("{name}: encode: {e}"));
            assert_eq!(buf, input, "{name}: encoded bytes");
        }
    }

    #[test]
    fn test_option_decode_errors() {
        let cases: Vec<(&str, Vec<u8>, MessageError)> = vec![
            ("empty input", vec![], MessageError::Truncated { expected: 1 }),
            (
                "truncated value",
                vec![0x71],
                MessageError::Truncated { expected: 1 },
            ),
            ("invalid delta", vec![0xF0], MessageError::UnsupportedExtend),
            (
                "truncated delta extend byte",
                vec![0xD0],
                MessageError::Truncated { expected: 1 },
            ),
            (
                "truncated delta extend dword",
                vec![0xE0, 0x01],
                MessageError::Truncated { expected: 2 },
            ),
            ("invalid length", vec![0x7F], MessageError::UnsupportedExtend),
            (
                "truncated length extend byte",
                vec![0x7D],
                MessageError::Truncated { expected: 1 },
            ),
            (
                "truncated length extend dword",
                vec![0x7E],
                MessageError::Truncated { expected: 2 },
            ),
            (
                "value length outside definition bounds",
                vec![0x73, 0x01, 0x02, 0x03],
                MessageError::InvalidOptionValueLength {
                    def: URI_PORT,
                    length: 3,
                },
            ),
        ];

        let schema = default_schema();

        for (name, input, expected) in cases {
            let mut pos = 0;
            let err = CoapOption::decode(&input, &mut pos, 0, schema, 1024)
                .expect_err(name);
            assert_eq!(err, expected, "{name}");
        }
    }

    #[test]
    fn test_typed_accessors() {
        let opt = CoapOption::new(URI_PORT, 5683u32).unwrap();
        assert_eq!(opt.uint().unwrap(), 5683);
        assert_eq!(
            opt.string(),
            Err(MessageError::InvalidOptionValueFormat {
                def: URI_PORT,
                requested: ValueFormat::String,
            })
        );
        assert_eq!(
            opt.opaque(),
            Err(MessageError::InvalidOptionValueFormat {
                def: URI_PORT,
                requested: ValueFormat::Opaque,
            })
        );
    }

    #[test]
    fn test_into_unrecognized() {
        let opt = CoapOption::new(URI_PORT, 0x4242u32).unwrap();
        let demoted = opt.into_unrecognized(1024);

        assert!(!demoted.def().recognized());
        assert_eq!(demoted.code(), URI_PORT.code);
        assert_eq!(demoted.opaque().unwrap(), &[0x42, 0x42]);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            CoapOption::new(URI_PORT, 5683u32).unwrap().to_string(),
            "Uri-Port(5683)"
        );
        assert_eq!(
            CoapOption::new(URI_HOST, "example.com").unwrap().to_string(),
            "Uri-Host(\"example.com\")"
        );
        assert_eq!(
            CoapOption::new(IF_MATCH, vec![0xde, 0xad]).unwrap().to_string(),
            "If-Match(dead)"
        );
        assert_eq!(
            CoapOption::empty(IF_NONE_MATCH).unwrap().to_string(),
            "Option(If-None-Match)"
        );
    }
}
