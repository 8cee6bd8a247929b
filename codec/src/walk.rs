//! Encoder-side graph walking.
//!
//! [`TableBuilder`] produces one frame's reference table from a root value.
//! Heap values are deduplicated by identity and assigned local slot indices
//! in first-visit order; the seen-map entry is inserted *before* descending
//! into children, which is what closes cycles. Singleton atoms become
//! negative sentinels and never occupy slots. Deferred values are handed to
//! the encoder registry, which assigns them indices in the stream-wide
//! space and watches them for settlement.

use std::collections::HashMap;

use graphwire_types::{Slot, Value};

use crate::{
    error::EncodeError,
    plugin::EncodePlugin,
    registry::EncoderRegistry,
    wire,
};

/// Which index space the frame's deferreds are registered in.
#[derive(Clone, Copy, PartialEq, Eq)]
enum IndexSpace {
    /// The root frame: a deferred's global index is its own table slot.
    RootSlots,
    /// A resolution frame: table slots are frame-local; deferreds draw
    /// fresh indices from the stream-wide allocator.
    Continuation,
}

/// Builds the reference table for a single frame.
pub(crate) struct TableBuilder<'a> {
    plugins: &'a [Box<dyn EncodePlugin>],
    registry: &'a mut EncoderRegistry,
    space: IndexSpace,
    seen: HashMap<usize, i64>,
    table: Vec<serde_json::Value>,
}

impl<'a> TableBuilder<'a> {
    /// Builder for the root frame.
    pub(crate) fn root_frame(
        plugins: &'a [Box<dyn EncodePlugin>],
        registry: &'a mut EncoderRegistry,
    ) -> Self {
        TableBuilder::new(plugins, registry, IndexSpace::RootSlots)
    }

    /// Builder for a resolution frame.
    pub(crate) fn continuation_frame(
        plugins: &'a [Box<dyn EncodePlugin>],
        registry: &'a mut EncoderRegistry,
    ) -> Self {
        TableBuilder::new(plugins, registry, IndexSpace::Continuation)
    }

    fn new(
        plugins: &'a [Box<dyn EncodePlugin>],
        registry: &'a mut EncoderRegistry,
        space: IndexSpace,
    ) -> Self {
        TableBuilder {
            plugins,
            registry,
            space,
            seen: HashMap::new(),
            table: Vec::new(),
        }
    }

    /// Builds the table rooted at `root`. Index 0 holds the root.
    pub(crate) fn build(mut self, root: &Value) -> Result<Vec<serde_json::Value>, EncodeError> {
        let reference = self.visit(root)?;
        if reference < 0 {
            // Singleton atoms never occupy slots, but every frame's root
            // must live at index 0; wrap the sentinel in an atom node.
            debug_assert!(self.table.is_empty());
            self.table
                .push(wire::node(wire::CODE_ATOM, reference.into()));
        } else {
            debug_assert_eq!(reference, 0);
        }
        Ok(self.table)
    }

    fn visit(&mut self, value: &Value) -> Result<i64, EncodeError> {
        if let Some(sentinel) = wire::atom_sentinel(value) {
            return Ok(sentinel);
        }
        if let Some(id) = value.heap_id() {
            if let Some(&index) = self.seen.get(&id) {
                return Ok(index);
            }
        }
        for plugin in self.plugins {
            if let Some(replacement) = plugin.replace(value)? {
                let index = self.allocate(value);
                let mut payload = Vec::with_capacity(replacement.fields.len() + 1);
                payload.push(serde_json::Value::from(replacement.tag));
                for field in &replacement.fields {
                    payload.push(self.visit(field)?.into());
                }
                self.table[index as usize] =
                    wire::node(wire::CODE_CUSTOM, serde_json::Value::Array(payload));
                return Ok(index);
            }
        }
        self.visit_builtin(value)
    }

    fn visit_builtin(&mut self, value: &Value) -> Result<i64, EncodeError> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) => {
                unreachable!("singleton atoms are encoded as sentinels")
            }
            Value::Number(number) => Ok(self.push_slot(value, (*number).into())),
            Value::String(string) => Ok(self.push_slot(value, string.clone().into())),
            Value::BigInt(integer) => Ok(self.push_slot(
                value,
                wire::node(wire::CODE_BIGINT, integer.to_string().into()),
            )),
            Value::Symbol(symbol) => Ok(self.push_slot(
                value,
                wire::node(wire::CODE_SYMBOL, symbol.name().into()),
            )),
            Value::Regexp(regexp) => Ok(self.push_slot(
                value,
                wire::node(
                    wire::CODE_REGEXP,
                    serde_json::Value::Array(vec![
                        regexp.pattern().into(),
                        regexp.flags().into(),
                    ]),
                ),
            )),
            Value::Timestamp(timestamp) => Ok(self.push_slot(
                value,
                wire::node(wire::CODE_TIMESTAMP, timestamp.millis().into()),
            )),
            Value::Url(url) => Ok(self.push_slot(
                value,
                wire::node(wire::CODE_URL, url.as_str().into()),
            )),
            Value::Error(error) => Ok(self.push_slot(
                value,
                wire::node(
                    wire::CODE_ERROR,
                    serde_json::Value::Array(vec![
                        error.kind().into(),
                        error.message().into(),
                    ]),
                ),
            )),
            Value::Sequence(sequence) => {
                let index = self.allocate(value);
                let slots = sequence.snapshot();
                let mut refs = Vec::with_capacity(slots.len());
                for slot in &slots {
                    match slot {
                        Slot::Hole => refs.push(wire::SENTINEL_HOLE.into()),
                        Slot::Value(child) => refs.push(self.visit(child)?.into()),
                    }
                }
                self.table[index as usize] =
                    wire::node(wire::CODE_SEQUENCE, serde_json::Value::Array(refs));
                Ok(index)
            }
            Value::Record(record) => {
                let index = self.allocate(value);
                let entries = record.snapshot();
                let mut payload = Vec::with_capacity(entries.len() * 2);
                for (key, child) in &entries {
                    payload.push(serde_json::Value::from(key.as_str()));
                    payload.push(self.visit(child)?.into());
                }
                self.table[index as usize] =
                    wire::node(wire::CODE_RECORD, serde_json::Value::Array(payload));
                Ok(index)
            }
            Value::Map(map) => {
                let index = self.allocate(value);
                let entries = map.snapshot();
                let mut payload = Vec::with_capacity(entries.len() * 2);
                for (key, child) in &entries {
                    payload.push(self.visit(key)?.into());
                    payload.push(self.visit(child)?.into());
                }
                self.table[index as usize] =
                    wire::node(wire::CODE_MAP, serde_json::Value::Array(payload));
                Ok(index)
            }
            Value::Set(set) => {
                let index = self.allocate(value);
                let members = set.snapshot();
                let mut refs = Vec::with_capacity(members.len());
                for member in &members {
                    refs.push(self.visit(member)?.into());
                }
                self.table[index as usize] =
                    wire::node(wire::CODE_SET, serde_json::Value::Array(refs));
                Ok(index)
            }
            Value::Custom(custom) => Err(EncodeError::UnsupportedValue {
                tag: custom.tag().to_owned(),
            }),
            Value::Deferred(deferred) => {
                let index = self.allocate(value);
                let slot_hint = match self.space {
                    IndexSpace::RootSlots => Some(index as u64),
                    IndexSpace::Continuation => None,
                };
                let global = self.registry.register(deferred, slot_hint)?;
                self.table[index as usize] =
                    wire::node(wire::CODE_PENDING, global.into());
                Ok(index)
            }
        }
    }

    /// Assigns the next free slot to `value` and records it in the seen-map
    /// before any descent into children.
    fn allocate(&mut self, value: &Value) -> i64 {
        let index = self.table.len() as i64;
        self.table.push(serde_json::Value::Null);
        if let Some(id) = value.heap_id() {
            self.seen.insert(id, index);
        }
        index
    }

    fn push_slot(&mut self, value: &Value, element: serde_json::Value) -> i64 {
        let index = self.allocate(value);
        self.table[index as usize] = element;
        index
    }
}
