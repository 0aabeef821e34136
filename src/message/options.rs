//! Ordered collection of CoAP options.
//!
//! Options may be held unsorted in memory; encoding produces a sorted
//! working copy so the wire order (ascending code, RFC 7252 §3.1) never
//! mutates caller state. Decoding applies the §5.4.5 repeat rule and the
//! §5.4.1 elective-drop rule.

use crate::error::MessageError;
use crate::message::option::{CoapOption, OptionValue};
use crate::message::packet::PAYLOAD_MARKER;
use crate::message::schema::{OptionDef, Schema, ValueFormat};

/// Ordered list of options with typed accessors and bulk codecs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    data: Vec<CoapOption>,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoapOption> {
        self.data.iter()
    }

    /// Appends an option, allowing repeats of the same code.
    pub fn push(&mut self, opt: CoapOption) {
        self.data.push(opt);
    }

    /// Whether an option with the definition's code is present.
    pub fn contains(&self, def: OptionDef) -> bool {
        self.index(def).is_some()
    }

    /// First option with the definition's code.
    pub fn get(&self, def: OptionDef) -> Option<&CoapOption> {
        self.index(def).map(|i| &self.data[i])
    }

    /// All options with the definition's code, in insertion order.
    pub fn get_all(&self, def: OptionDef) -> impl Iterator<Item = &CoapOption> {
        self.data.iter().filter(move |opt| opt.code() == def.code)
    }

    /// Upserts an option: replaces the first occurrence of its code, or
    /// appends when absent.
    pub fn set(&mut self, opt: CoapOption) {
        match self.index(opt.def()) {
            Some(i) => self.data[i] = opt,
            None => self.data.push(opt),
        }
    }

    /// Removes every occurrence of the definition's code, returning the
    /// number removed.
    pub fn clear(&mut self, def: OptionDef) -> usize {
        let before = self.data.len();
        self.data.retain(|opt| opt.code() != def.code);

        before - self.data.len()
    }

    /// Uint value of the first matching option.
    pub fn get_uint(&self, def: OptionDef) -> Result<u32, MessageError> {
        match self.get(def) {
            Some(opt) => opt.uint(),
            None => Err(MessageError::OptionNotFound { def }),
        }
    }

    /// Upserts a uint option, validating format and length against the
    /// definition.
    pub fn set_uint(&mut self, def: OptionDef, value: u32) -> Result<(), MessageError> {
        self.set(CoapOption::new(def, value)?);
        Ok(())
    }

    /// Opaque value of the first matching option.
    pub fn get_opaque(&self, def: OptionDef) -> Result<&[u8], MessageError> {
        match self.get(def) {
            Some(opt) => opt.opaque(),
            None => Err(MessageError::OptionNotFound { def }),
        }
    }

    /// Upserts an opaque option, validating format and length against the
    /// definition.
    pub fn set_opaque(
        &mut self,
        def: OptionDef,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), MessageError> {
        self.set(CoapOption::new(def, value.into())?);
        Ok(())
    }

    /// String value of the first matching option.
    pub fn get_string(&self, def: OptionDef) -> Result<&str, MessageError> {
        match self.get(def) {
            Some(opt) => opt.string(),
            None => Err(MessageError::OptionNotFound { def }),
        }
    }

    /// Upserts a string option, validating format and length against the
    /// definition.
    pub fn set_string(
        &mut self,
        def: OptionDef,
        value: impl Into<String>,
    ) -> Result<(), MessageError> {
        self.set(CoapOption::new(def, value.into())?);
        Ok(())
    }

    /// Upserts a valueless option for an empty-format definition.
    pub fn set_empty(&mut self, def: OptionDef) -> Result<(), MessageError> {
        self.set(CoapOption::empty(def)?);
        Ok(())
    }

    /// Uint values of all matching options, in insertion order.
    pub fn get_all_uint(
        &self,
        def: OptionDef,
    ) -> Result<impl Iterator<Item = u32> + '_, MessageError> {
        self.require_format(def, ValueFormat::Uint)?;

        Ok(self.get_all(def).filter_map(|opt| opt.uint().ok()))
    }

    /// Replaces all occurrences of a repeatable uint option with `values`.
    pub fn set_all_uint(
        &mut self,
        def: OptionDef,
        values: impl IntoIterator<Item = u32>,
    ) -> Result<(), MessageError> {
        self.require_format(def, ValueFormat::Uint)?;
        self.set_all(def, values.into_iter().map(OptionValue::Uint))
    }

    /// Opaque values of all matching options, in insertion order.
    pub fn get_all_opaque(
        &self,
        def: OptionDef,
    ) -> Result<impl Iterator<Item = &[u8]> + '_, MessageError> {
        self.require_format(def, ValueFormat::Opaque)?;

        Ok(self.get_all(def).filter_map(|opt| opt.opaque().ok()))
    }

    /// Replaces all occurrences of a repeatable opaque option with `values`.
    pub fn set_all_opaque(
        &mut self,
        def: OptionDef,
        values: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<(), MessageError> {
        self.require_format(def, ValueFormat::Opaque)?;
        self.set_all(def, values.into_iter().map(OptionValue::Opaque))
    }

    /// String values of all matching options, in insertion order.
    pub fn get_all_string(
        &self,
        def: OptionDef,
    ) -> Result<impl Iterator<Item = &str> + '_, MessageError> {
        self.require_format(def, ValueFormat::String)?;

        Ok(self.get_all(def).filter_map(|opt| opt.string().ok()))
    }

    /// Replaces all occurrences of a repeatable string option with `values`.
    pub fn set_all_string(
        &mut self,
        def: OptionDef,
        values: impl IntoIterator<Item = String>,
    ) -> Result<(), MessageError> {
        self.require_format(def, ValueFormat::String)?;
        self.set_all(def, values.into_iter().map(OptionValue::String))
    }

    /// Appends the delta-encoded options to `buf` in ascending code order.
    ///
    /// Works on a sorted copy; ties keep insertion order and the caller's
    /// collection is never reordered.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), MessageError> {
        if self.data.is_empty() {
            return Ok(());
        }

        let mut sorted = self.data.clone();
        sorted.sort_by_key(CoapOption::code);

        let mut prev = 0u16;
        for opt in &sorted {
            opt.encode(buf, prev)
                .map_err(|cause| MessageError::EncodeOption {
                    def: opt.def(),
                    cause: Box::new(cause),
                })?;
            prev = opt.code();
        }

        Ok(())
    }

    /// Decodes options from `data` at `*pos` until the buffer ends or the
    /// payload marker is reached.
    ///
    /// A second consecutive occurrence of a non-repeatable option is
    /// demoted to an unrecognized opaque option (RFC 7252 §5.4.5);
    /// unrecognized elective options are silently dropped (§5.4.1).
    pub fn decode(
        data: &[u8],
        pos: &mut usize,
        schema: &Schema,
        max_options: usize,
        max_option_length: u16,
    ) -> Result<Options, MessageError> {
        let mut prev = 0u16;
        let mut options = Vec::new();

        while *pos < data.len() && data[*pos] != PAYLOAD_MARKER {
            let mut opt = CoapOption::decode(data, pos, prev, schema, max_option_length)?;

            if !opt.def().repeatable && opt.code() == prev {
                opt = opt.into_unrecognized(max_option_length);
            }

            prev = opt.code();

            if !opt.def().recognized() && !opt.def().critical() {
                continue;
            }

            if options.len() == max_options {
                return Err(MessageError::TooManyOptions {
                    limit: max_options,
                    length: options.len() + 1,
                });
            }

            options.push(opt);
        }

        Ok(Options { data: options })
    }

    fn index(&self, def: OptionDef) -> Option<usize> {
        self.data.iter().position(|opt| opt.code() == def.code)
    }

    fn require_format(&self, def: OptionDef, requested: ValueFormat) -> Result<(), MessageError> {
        if def.value_format != requested {
            return Err(MessageError::InvalidOptionValueFormat { def, requested });
        }

        Ok(())
    }

    fn set_all(
        &mut self,
        def: OptionDef,
        values: impl Iterator<Item = OptionValue>,
    ) -> Result<(), MessageError> {
        if !def.repeatable {
            return Err(MessageError::OptionNotRepeatable { def });
        }

        let mut replacement = Vec::new();
        for value in values {
            replacement.push(CoapOption::new(def, value)?);
        }

        self.clear(def);
        self.data.extend(replacement);

        Ok(())
    }
}

impl FromIterator<CoapOption> for Options {
    fn from_iter<T: IntoIterator<Item = CoapOption>>(iter: T) -> Options {
        Options {
            data: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Options {
    type Item = CoapOption;
    type IntoIter = std::vec::IntoIter<CoapOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}
