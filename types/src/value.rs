use std::collections::HashSet;

use num_bigint::BigInt;

use crate::{
    containers::{CustomValue, Map, Record, Sequence, Set, Slot},
    deferred::{Deferred, Settlement},
    error_value::ErrorValue,
    regexp::Regexp,
    symbol::Symbol,
    timestamp::Timestamp,
    url::Url,
};

/// A value transportable by the codec.
///
/// Scalars are stored inline and compared by content. The remaining kinds
/// wrap shared handles; see the crate docs for how identity works.
#[derive(Clone, Debug)]
pub enum Value {
    /// The unit-absent value.
    Undefined,
    /// The unit-null value.
    Null,
    /// Boolean true or false.
    Bool(bool),
    /// A double-precision number, including NaN, the infinities and
    /// negative zero.
    Number(f64),
    /// An arbitrary-precision integer.
    BigInt(BigInt),
    /// A string.
    String(String),
    /// A symbol, interned globally by name.
    Symbol(Symbol),
    /// A regular expression: pattern plus flag string.
    Regexp(Regexp),
    /// A UTC instant with millisecond precision.
    Timestamp(Timestamp),
    /// A URL in string form.
    Url(Url),
    /// An ordered sequence with possibly absent positions.
    Sequence(Sequence),
    /// A string-keyed record.
    Record(Record),
    /// A keyed mapping with arbitrary value keys.
    Map(Map),
    /// An unordered unique set.
    Set(Set),
    /// A tagged error: kind name plus message.
    Error(ErrorValue),
    /// An application-registered tagged record.
    Custom(CustomValue),
    /// A value supplied later, settling as fulfilled or rejected.
    Deferred(Deferred),
}

impl Value {
    /// Returns the stable identity token of a heap-backed value, or `None`
    /// for inline scalars and atoms.
    ///
    /// Two values with the same token are clones of one handle. This is the
    /// key the encoder deduplicates by.
    pub fn heap_id(&self) -> Option<usize> {
        match self {
            Value::Sequence(sequence) => Some(sequence.heap_id()),
            Value::Record(record) => Some(record.heap_id()),
            Value::Map(map) => Some(map.heap_id()),
            Value::Set(set) => Some(set.heap_id()),
            Value::Error(error) => Some(error.heap_id()),
            Value::Custom(custom) => Some(custom.heap_id()),
            Value::Deferred(deferred) => Some(deferred.heap_id()),
            _ => None,
        }
    }

    /// Identity equality: pointer equality for heap-backed values, content
    /// equality for scalars.
    ///
    /// NaN is `same` as NaN; negative zero is not `same` as positive zero.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => number_eq(*a, *b),
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Regexp(a), Value::Regexp(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Url(a), Value::Url(b)) => a == b,
            _ => match (self.heap_id(), other.heap_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Structural equality, tolerant of reference cycles.
    ///
    /// Containers are compared member-wise. A pair of values already under
    /// comparison further up the stack is assumed equal, so self-referential
    /// graphs compare by their (possibly infinite) unfolding instead of
    /// recursing forever.
    pub fn structural_eq(&self, other: &Value) -> bool {
        let mut in_progress = HashSet::new();
        self.eq_rec(other, &mut in_progress)
    }

    fn eq_rec(&self, other: &Value, in_progress: &mut HashSet<(usize, usize)>) -> bool {
        if self.same(other) {
            return true;
        }
        if let (Some(a), Some(b)) = (self.heap_id(), other.heap_id()) {
            if !in_progress.insert((a, b)) {
                return true;
            }
        }
        match (self, other) {
            (Value::Sequence(a), Value::Sequence(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter().zip(&b).all(|(x, y)| match (x, y) {
                        (Slot::Hole, Slot::Hole) => true,
                        (Slot::Value(x), Slot::Value(y)) => x.eq_rec(y, in_progress),
                        _ => false,
                    })
            }
            (Value::Record(a), Value::Record(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter()
                            .find(|(other_key, _)| other_key == key)
                            .map(|(_, other_value)| value.eq_rec(other_value, in_progress))
                            .unwrap_or(false)
                    })
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter().any(|(other_key, other_value)| {
                            key.eq_rec(other_key, in_progress)
                                && value.eq_rec(other_value, in_progress)
                        })
                    })
            }
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter()
                        .all(|member| b.iter().any(|other| member.eq_rec(other, in_progress)))
            }
            (Value::Error(a), Value::Error(b)) => {
                a.kind() == b.kind() && a.message() == b.message()
            }
            (Value::Custom(a), Value::Custom(b)) => {
                let (fields_a, fields_b) = (a.fields(), b.fields());
                a.tag() == b.tag()
                    && fields_a.len() == fields_b.len()
                    && fields_a
                        .iter()
                        .zip(&fields_b)
                        .all(|(x, y)| x.eq_rec(y, in_progress))
            }
            (Value::Deferred(a), Value::Deferred(b)) => match (a.settlement(), b.settlement()) {
                (Some(Settlement::Fulfilled(x)), Some(Settlement::Fulfilled(y)))
                | (Some(Settlement::Rejected(x)), Some(Settlement::Rejected(y))) => {
                    x.eq_rec(&y, in_progress)
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Regexp(_) => "regexp",
            Value::Timestamp(_) => "timestamp",
            Value::Url(_) => "url",
            Value::Sequence(_) => "sequence",
            Value::Record(_) => "record",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Error(_) => "error",
            Value::Custom(_) => "custom",
            Value::Deferred(_) => "deferred",
        }
    }
}

/// Number equality with the atom semantics: NaN equals NaN, negative zero
/// differs from positive zero.
fn number_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Self {
        Value::Bool(boolean)
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Value::String(string.to_owned())
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        Value::String(string)
    }
}

impl From<BigInt> for Value {
    fn from(integer: BigInt) -> Self {
        Value::BigInt(integer)
    }
}
