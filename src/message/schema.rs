//! Option and media-type registries.
//!
//! Decoding is schema-driven: every option code resolves to an [`OptionDef`]
//! that dictates the value format and length bounds. Codes missing from the
//! [`Schema`] resolve to synthetic unrecognized definitions so the collection
//! layer can apply the critical/elective rules of RFC 7252 §5.4.1.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Format of an option value on the wire (RFC 7252 §3.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueFormat {
    /// Zero-length value.
    #[default]
    Empty,
    /// Non-negative integer, minimum-length big-endian.
    Uint,
    /// Opaque byte sequence.
    Opaque,
    /// UTF-8 string, treated as raw bytes by the codec.
    String,
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueFormat::Empty => "empty",
            ValueFormat::Uint => "uint",
            ValueFormat::Opaque => "opaque",
            ValueFormat::String => "string",
        };

        f.write_str(s)
    }
}

/// Definition of a CoAP option: value format, repeatability and length
/// bounds.
///
/// A definition is *recognized* iff its name is non-empty; decoding an
/// unknown code yields the synthetic definition from
/// [`OptionDef::unrecognized`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionDef {
    pub name: &'static str,
    pub code: u16,
    pub value_format: ValueFormat,
    pub repeatable: bool,
    pub min_len: u16,
    pub max_len: u16,
}

// Well-known options, RFC 7252 §5.10 plus Block (RFC 7959), Observe
// (RFC 7641) and No-Response (RFC 7967).
pub const IF_MATCH: OptionDef = OptionDef {
    name: "If-Match",
    code: 1,
    value_format: ValueFormat::Opaque,
    repeatable: true,
    min_len: 0,
    max_len: 8,
};
pub const URI_HOST: OptionDef = OptionDef {
    name: "Uri-Host",
    code: 3,
    value_format: ValueFormat::String,
    repeatable: false,
    min_len: 1,
    max_len: 255,
};
pub const ETAG: OptionDef = OptionDef {
    name: "ETag",
    code: 4,
    value_format: ValueFormat::Opaque,
    repeatable: true,
    min_len: 1,
    max_len: 8,
};
pub const IF_NONE_MATCH: OptionDef = OptionDef {
    name: "If-None-Match",
    code: 5,
    value_format: ValueFormat::Empty,
    repeatable: false,
    min_len: 0,
    max_len: 0,
};
pub const OBSERVE: OptionDef = OptionDef {
    name: "Observe",
    code: 6,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 3,
};
pub const URI_PORT: OptionDef = OptionDef {
    name: "Uri-Port",
    code: 7,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 2,
};
pub const LOCATION_PATH: OptionDef = OptionDef {
    name: "Location-Path",
    code: 8,
    value_format: ValueFormat::String,
    repeatable: true,
    min_len: 0,
    max_len: 255,
};
pub const URI_PATH: OptionDef = OptionDef {
    name: "Uri-Path",
    code: 11,
    value_format: ValueFormat::String,
    repeatable: true,
    min_len: 0,
    max_len: 255,
};
pub const CONTENT_FORMAT: OptionDef = OptionDef {
    name: "Content-Format",
    code: 12,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 2,
};
pub const MAX_AGE: OptionDef = OptionDef {
    name: "Max-Age",
    code: 14,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 4,
};
pub const URI_QUERY: OptionDef = OptionDef {
    name: "Uri-Query",
    code: 15,
    value_format: ValueFormat::String,
    repeatable: true,
    min_len: 0,
    max_len: 255,
};
pub const ACCEPT: OptionDef = OptionDef {
    name: "Accept",
    code: 17,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 2,
};
pub const LOCATION_QUERY: OptionDef = OptionDef {
    name: "Location-Query",
    code: 20,
    value_format: ValueFormat::String,
    repeatable: true,
    min_len: 0,
    max_len: 255,
};
pub const BLOCK2: OptionDef = OptionDef {
    name: "Block2",
    code: 23,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 3,
};
pub const BLOCK1: OptionDef = OptionDef {
    name: "Block1",
    code: 27,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 3,
};
pub const SIZE2: OptionDef = OptionDef {
    name: "Size2",
    code: 28,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 4,
};
pub const PROXY_URI: OptionDef = OptionDef {
    name: "Proxy-Uri",
    code: 35,
    value_format: ValueFormat::String,
    repeatable: false,
    min_len: 1,
    max_len: 1034,
};
pub const PROXY_SCHEME: OptionDef = OptionDef {
    name: "Proxy-Scheme",
    code: 39,
    value_format: ValueFormat::String,
    repeatable: false,
    min_len: 1,
    max_len: 255,
};
pub const SIZE1: OptionDef = OptionDef {
    name: "Size1",
    code: 60,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 4,
};
pub const NO_RESPONSE: OptionDef = OptionDef {
    name: "No-Response",
    code: 258,
    value_format: ValueFormat::Uint,
    repeatable: false,
    min_len: 0,
    max_len: 1,
};

impl OptionDef {
    /// Synthetic definition for a code missing from the schema: an opaque
    /// value bounded only by the caller's `max_len` policy.
    pub fn unrecognized(code: u16, max_len: u16) -> OptionDef {
        OptionDef {
            name: "",
            code,
            value_format: ValueFormat::Opaque,
            repeatable: false,
            min_len: 0,
            max_len,
        }
    }

    /// Whether the definition came from a schema rather than being
    /// synthesized for an unknown code.
    pub fn recognized(&self) -> bool {
        !self.name.is_empty()
    }

    /// Critical options cause message rejection when unrecognized
    /// (RFC 7252 §5.4.1).
    pub fn critical(&self) -> bool {
        self.code & 0x01 == 0x01
    }

    /// Unsafe-to-forward options must be understood by proxies
    /// (RFC 7252 §5.4.2).
    pub fn unsafe_to_forward(&self) -> bool {
        self.code & 0x02 == 0x02
    }

    /// NoCacheKey options are excluded from the cache key (RFC 7252 §5.4.2).
    pub fn no_cache_key(&self) -> bool {
        self.code & 0x1E == 0x1C
    }

    /// Short form for error messages: the quoted name, or the bare code when
    /// unrecognized.
    pub(crate) fn label(&self) -> String {
        if self.recognized() {
            format!("{:?}", self.name)
        } else {
            self.code.to_string()
        }
    }
}

impl fmt::Display for OptionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recognized() {
            write!(
                f,
                "Option(Name={}, Code={}, ValueFormat={}, MinLen={}, MaxLen={})",
                self.name, self.code, self.value_format, self.min_len, self.max_len
            )
        } else {
            write!(
                f,
                "Option(Code={}, ValueFormat={}, MaxLen={})",
                self.code, self.value_format, self.max_len
            )
        }
    }
}

/// Payload media type (RFC 7252 §12.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaType {
    pub code: u16,
    pub name: &'static str,
}

pub const MEDIA_TYPE_TEXT_PLAIN: MediaType = MediaType {
    code: 0,
    name: "text/plain; charset=utf-8",
};
pub const MEDIA_TYPE_COSE_ENCRYPT0: MediaType = MediaType {
    code: 16,
    name: "application/cose; cose-type=\"cose-encrypt0\"",
};
pub const MEDIA_TYPE_COSE_MAC0: MediaType = MediaType {
    code: 17,
    name: "application/cose; cose-type=\"cose-mac0\"",
};
pub const MEDIA_TYPE_CBOR_SIGN1: MediaType = MediaType {
    code: 18,
    name: "application/cbor; cbor-type=\"cbor-sign1\"",
};
pub const MEDIA_TYPE_IMAGE_GIF: MediaType = MediaType {
    code: 21,
    name: "image/gif",
};
pub const MEDIA_TYPE_IMAGE_PNG: MediaType = MediaType {
    code: 22,
    name: "image/png",
};
pub const MEDIA_TYPE_IMAGE_JPEG: MediaType = MediaType {
    code: 23,
    name: "image/jpeg",
};
pub const MEDIA_TYPE_LINK_FORMAT: MediaType = MediaType {
    code: 40,
    name: "application/link-format",
};
pub const MEDIA_TYPE_XML: MediaType = MediaType {
    code: 41,
    name: "application/xml",
};
pub const MEDIA_TYPE_OCTET_STREAM: MediaType = MediaType {
    code: 42,
    name: "application/octet-stream",
};
pub const MEDIA_TYPE_EXI: MediaType = MediaType {
    code: 47,
    name: "application/exi",
};
pub const MEDIA_TYPE_JSON: MediaType = MediaType {
    code: 50,
    name: "application/json",
};
pub const MEDIA_TYPE_CBOR: MediaType = MediaType {
    code: 60,
    name: "application/cbor",
};
pub const MEDIA_TYPE_CBOR_SEQ: MediaType = MediaType {
    code: 63,
    name: "application/cbor-seq",
};

impl MediaType {
    /// Synthetic entry for a code missing from the schema.
    pub fn unrecognized(code: u16) -> MediaType {
        MediaType { code, name: "" }
    }

    pub fn recognized(&self) -> bool {
        !self.name.is_empty()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recognized() {
            f.write_str(self.name)
        } else {
            write!(f, "MediaType({})", self.code)
        }
    }
}

/// Registry of option definitions and media types, addressable by code.
///
/// Lookup misses return synthetic unrecognized entries instead of failing.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    options: HashMap<u16, OptionDef>,
    media_types: HashMap<u16, MediaType>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    pub fn add_options(mut self, options: impl IntoIterator<Item = OptionDef>) -> Schema {
        for def in options {
            self.options.insert(def.code, def);
        }

        self
    }

    pub fn add_media_types(mut self, media_types: impl IntoIterator<Item = MediaType>) -> Schema {
        for media_type in media_types {
            self.media_types.insert(media_type.code, media_type);
        }

        self
    }

    /// Looks up an option definition, synthesizing an unrecognized opaque
    /// definition bounded by `max_len` for unknown codes.
    pub fn option(&self, code: u16, max_len: u16) -> OptionDef {
        self.options
            .get(&code)
            .copied()
            .unwrap_or_else(|| OptionDef::unrecognized(code, max_len))
    }

    /// Looks up a media type, synthesizing an unrecognized entry for unknown
    /// codes.
    pub fn media_type(&self, code: u16) -> MediaType {
        self.media_types
            .get(&code)
            .copied()
            .unwrap_or_else(|| MediaType::unrecognized(code))
    }
}

/// The default schema: well-known options and media types from the IANA
/// CoRE parameters registry.
///
/// <https://www.iana.org/assignments/core-parameters/core-parameters.xhtml>
pub fn default_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();

    SCHEMA.get_or_init(|| {
        Schema::new()
            .add_options([
                IF_MATCH,
                URI_HOST,
                ETAG,
                IF_NONE_MATCH,
                OBSERVE,
                URI_PORT,
                LOCATION_PATH,
                URI_PATH,
                CONTENT_FORMAT,
                MAX_AGE,
                URI_QUERY,
                ACCEPT,
                LOCATION_QUERY,
                BLOCK2,
                BLOCK1,
                SIZE2,
                PROXY_URI,
                PROXY_SCHEME,
                SIZE1,
                NO_RESPONSE,
            ])
            .add_media_types([
                MEDIA_TYPE_TEXT_PLAIN,
                MEDIA_TYPE_COSE_ENCRYPT0,
                MEDIA_TYPE_COSE_MAC0,
                MEDIA_TYPE_CBOR_SIGN1,
                MEDIA_TYPE_IMAGE_GIF,
                MEDIA_TYPE_IMAGE_PNG,
                MEDIA_TYPE_IMAGE_JPEG,
                MEDIA_TYPE_LINK_FORMAT,
                MEDIA_TYPE_XML,
                MEDIA_TYPE_OCTET_STREAM,
                MEDIA_TYPE_EXI,
                MEDIA_TYPE_JSON,
                MEDIA_TYPE_CBOR,
                MEDIA_TYPE_CBOR_SEQ,
            ])
    })
}
