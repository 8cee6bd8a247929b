//! Decoder-side parsing and hydration.
//!
//! Each frame is processed in two phases. The *parse* phase checks the
//! grammar and turns every table element into a typed [`RawEntry`] without
//! constructing any final value; forward references to higher slots are
//! permitted here. The *link* phase walks the entries, creating container
//! shells before populating their children so that reference cycles close
//! without ever observing an uninitialized slot.

use graphwire_types::{
    BigInt, ErrorValue, Map, Record, Regexp, Sequence, Set, Symbol, Timestamp, Url, Value,
};

use crate::{
    error::DecodeError, plugin::DecodePlugin, registry::DecoderRegistry, wire,
};

/// One parsed table slot.
#[derive(Debug)]
enum RawEntry {
    /// An inlined scalar (bare string, number, boolean or null).
    Inline(Value),
    /// A singleton atom occupying the root slot.
    Atom(i64),
    Sequence(Vec<i64>),
    Record(Vec<(String, i64)>),
    Map(Vec<(i64, i64)>),
    Set(Vec<i64>),
    BigInt(BigInt),
    Timestamp(i64),
    Regexp { pattern: String, flags: String },
    Symbol(String),
    Url(String),
    Error { kind: String, message: String },
    Custom { tag: String, fields: Vec<i64> },
    Pending(u64),
}

/// Hydrates one frame's reference table into a value.
pub(crate) struct Hydrator<'a> {
    plugins: &'a [Box<dyn DecodePlugin>],
    registry: &'a mut DecoderRegistry,
}

impl<'a> Hydrator<'a> {
    pub(crate) fn new(
        plugins: &'a [Box<dyn DecodePlugin>],
        registry: &'a mut DecoderRegistry,
    ) -> Self {
        Hydrator { plugins, registry }
    }

    /// Parses and links `table`, returning the value at index 0.
    pub(crate) fn hydrate(
        &mut self,
        table: &[serde_json::Value],
    ) -> Result<Value, DecodeError> {
        if table.is_empty() {
            return Err(wire::malformed("empty reference table"));
        }
        let raw = table
            .iter()
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()?;
        let mut built: Vec<Option<Value>> = vec![None; raw.len()];
        let mut linking = vec![false; raw.len()];
        self.link(0, &raw, &mut built, &mut linking)
    }

    fn link(
        &mut self,
        index: usize,
        raw: &[RawEntry],
        built: &mut Vec<Option<Value>>,
        linking: &mut Vec<bool>,
    ) -> Result<Value, DecodeError> {
        if let Some(value) = &built[index] {
            return Ok(value.clone());
        }
        if linking[index] {
            // Re-entered an entry that has no shell: the cycle runs through
            // a non-container (e.g. a custom-tagged entry, whose value does
            // not exist until its plugin has run).
            return Err(wire::malformed(format!(
                "reference cycle through non-container slot {index}"
            )));
        }
        linking[index] = true;

        let value = match &raw[index] {
            RawEntry::Inline(value) => value.clone(),
            RawEntry::Atom(sentinel) => wire::sentinel_atom(*sentinel)
                .ok_or_else(|| wire::malformed(format!("invalid atom sentinel {sentinel}")))?,
            RawEntry::Sequence(refs) => {
                let sequence = Sequence::new();
                built[index] = Some(Value::Sequence(sequence.clone()));
                for &reference in refs {
                    if reference == wire::SENTINEL_HOLE {
                        sequence.push_hole();
                    } else {
                        sequence.push(self.resolve(reference, raw, built, linking)?);
                    }
                }
                Value::Sequence(sequence)
            }
            RawEntry::Record(entries) => {
                let record = Record::new();
                built[index] = Some(Value::Record(record.clone()));
                for (key, reference) in entries {
                    record.insert(key.clone(), self.resolve(*reference, raw, built, linking)?);
                }
                Value::Record(record)
            }
            RawEntry::Map(entries) => {
                let map = Map::new();
                built[index] = Some(Value::Map(map.clone()));
                for &(key_ref, value_ref) in entries {
                    let key = self.resolve(key_ref, raw, built, linking)?;
                    let value = self.resolve(value_ref, raw, built, linking)?;
                    map.insert(key, value);
                }
                Value::Map(map)
            }
            RawEntry::Set(refs) => {
                let set = Set::new();
                built[index] = Some(Value::Set(set.clone()));
                for &reference in refs {
                    set.insert(self.resolve(reference, raw, built, linking)?);
                }
                Value::Set(set)
            }
            RawEntry::BigInt(integer) => Value::BigInt(integer.clone()),
            RawEntry::Timestamp(millis) => Value::Timestamp(Timestamp::from_millis(*millis)),
            RawEntry::Regexp { pattern, flags } => {
                Value::Regexp(Regexp::new(pattern.clone(), flags.clone()))
            }
            RawEntry::Symbol(name) => Value::Symbol(Symbol::for_name(name)),
            RawEntry::Url(url) => Value::Url(Url::new(url.clone())),
            RawEntry::Error { kind, message } => {
                Value::Error(ErrorValue::new(kind.clone(), message.clone()))
            }
            RawEntry::Custom { tag, fields } => {
                let mut children = Vec::with_capacity(fields.len());
                for &reference in fields {
                    children.push(self.resolve(reference, raw, built, linking)?);
                }
                let mut revived = None;
                for plugin in self.plugins {
                    if let Some(value) = plugin.revive(tag, &children)? {
                        revived = Some(value);
                        break;
                    }
                }
                revived.ok_or_else(|| DecodeError::UnknownTag(tag.clone()))?
            }
            RawEntry::Pending(global) => Value::Deferred(self.registry.placeholder(*global)),
        };

        built[index] = Some(value.clone());
        Ok(value)
    }

    /// Resolves a payload reference: a sentinel atom or a table slot.
    fn resolve(
        &mut self,
        reference: i64,
        raw: &[RawEntry],
        built: &mut Vec<Option<Value>>,
        linking: &mut Vec<bool>,
    ) -> Result<Value, DecodeError> {
        if reference < 0 {
            return wire::sentinel_atom(reference)
                .ok_or_else(|| wire::malformed(format!("invalid sentinel reference {reference}")));
        }
        let index = reference as usize;
        if index >= raw.len() {
            return Err(DecodeError::UnknownReference(reference));
        }
        self.link(index, raw, built, linking)
    }
}

fn parse_entry(element: &serde_json::Value) -> Result<RawEntry, DecodeError> {
    match element {
        serde_json::Value::String(string) => Ok(RawEntry::Inline(Value::String(string.clone()))),
        serde_json::Value::Number(number) => {
            let number = number
                .as_f64()
                .ok_or_else(|| wire::malformed("unrepresentable inline number"))?;
            Ok(RawEntry::Inline(Value::Number(number)))
        }
        // Bare booleans and null are accepted for interoperability; our own
        // encoder emits sentinels for them.
        serde_json::Value::Bool(boolean) => Ok(RawEntry::Inline(Value::Bool(*boolean))),
        serde_json::Value::Null => Ok(RawEntry::Inline(Value::Null)),
        serde_json::Value::Array(parts) => parse_node(parts),
        serde_json::Value::Object(_) => Err(wire::malformed("object in reference table")),
    }
}

fn parse_node(parts: &[serde_json::Value]) -> Result<RawEntry, DecodeError> {
    let [code, payload] = parts else {
        return Err(wire::malformed("table node is not a [code, payload] pair"));
    };
    let code = code
        .as_u64()
        .ok_or_else(|| wire::malformed("non-integer type code"))?;
    match code {
        wire::CODE_ATOM => Ok(RawEntry::Atom(expect_ref(payload)?)),
        wire::CODE_SEQUENCE => Ok(RawEntry::Sequence(expect_refs(payload)?)),
        wire::CODE_RECORD => {
            let parts = expect_array(payload)?;
            if parts.len() % 2 != 0 {
                return Err(wire::malformed("odd record payload length"));
            }
            let mut entries = Vec::with_capacity(parts.len() / 2);
            for pair in parts.chunks_exact(2) {
                let key = pair[0]
                    .as_str()
                    .ok_or_else(|| wire::malformed("record key is not a string"))?;
                entries.push((key.to_owned(), expect_ref(&pair[1])?));
            }
            Ok(RawEntry::Record(entries))
        }
        wire::CODE_MAP => {
            let parts = expect_array(payload)?;
            if parts.len() % 2 != 0 {
                return Err(wire::malformed("odd map payload length"));
            }
            let mut entries = Vec::with_capacity(parts.len() / 2);
            for pair in parts.chunks_exact(2) {
                entries.push((expect_ref(&pair[0])?, expect_ref(&pair[1])?));
            }
            Ok(RawEntry::Map(entries))
        }
        wire::CODE_SET => Ok(RawEntry::Set(expect_refs(payload)?)),
        wire::CODE_BIGINT => {
            let digits = expect_string(payload)?;
            let integer = digits
                .parse::<BigInt>()
                .map_err(|_| wire::malformed("invalid big integer digits"))?;
            Ok(RawEntry::BigInt(integer))
        }
        wire::CODE_TIMESTAMP => {
            let millis = payload
                .as_i64()
                .ok_or_else(|| wire::malformed("timestamp is not an integer"))?;
            Ok(RawEntry::Timestamp(millis))
        }
        wire::CODE_REGEXP => {
            let parts = expect_array(payload)?;
            let [pattern, flags] = parts else {
                return Err(wire::malformed("regexp payload is not [pattern, flags]"));
            };
            Ok(RawEntry::Regexp {
                pattern: expect_string(pattern)?,
                flags: expect_string(flags)?,
            })
        }
        wire::CODE_SYMBOL => Ok(RawEntry::Symbol(expect_string(payload)?)),
        wire::CODE_URL => Ok(RawEntry::Url(expect_string(payload)?)),
        wire::CODE_ERROR => {
            let parts = expect_array(payload)?;
            let [kind, message] = parts else {
                return Err(wire::malformed("error payload is not [kind, message]"));
            };
            Ok(RawEntry::Error {
                kind: expect_string(kind)?,
                message: expect_string(message)?,
            })
        }
        wire::CODE_CUSTOM => {
            let parts = expect_array(payload)?;
            let Some((tag, fields)) = parts.split_first() else {
                return Err(wire::malformed("custom payload is missing its tag"));
            };
            let tag = tag
                .as_str()
                .ok_or_else(|| wire::malformed("custom tag is not a string"))?;
            let fields = fields
                .iter()
                .map(expect_ref)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RawEntry::Custom {
                tag: tag.to_owned(),
                fields,
            })
        }
        wire::CODE_PENDING => {
            let global = payload
                .as_u64()
                .ok_or_else(|| wire::malformed("pending index is not an unsigned integer"))?;
            Ok(RawEntry::Pending(global))
        }
        _ => Err(wire::malformed(format!("unknown type code {code}"))),
    }
}

fn expect_array(payload: &serde_json::Value) -> Result<&[serde_json::Value], DecodeError> {
    payload
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| wire::malformed("payload is not an array"))
}

fn expect_string(payload: &serde_json::Value) -> Result<String, DecodeError> {
    payload
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| wire::malformed("payload is not a string"))
}

fn expect_ref(element: &serde_json::Value) -> Result<i64, DecodeError> {
    element
        .as_i64()
        .ok_or_else(|| wire::malformed("reference is not an integer"))
}

fn expect_refs(payload: &serde_json::Value) -> Result<Vec<i64>, DecodeError> {
    expect_array(payload)?.iter().map(expect_ref).collect()
}
