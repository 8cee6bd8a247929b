//! Shared-identity containers.
//!
//! Every container is a handle over `Arc<Mutex<_>>` storage. Cloning shares
//! the storage, and the interior mutability lets the decoder create an empty
//! shell first and populate it afterwards, which is how reference cycles are
//! closed during hydration.
//!
//! Membership equality for [`Map`] keys and [`Set`] members is
//! [`Value::same`]: identity for heap values, content for scalars. Two
//! distinct containers with equal contents are distinct set members.

use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::Value;

/// A position in a sequence: either a held value or a hole.
///
/// A hole is an *absent* position, distinct from a present
/// [`Value::Undefined`].
#[derive(Clone, Debug)]
pub enum Slot {
    /// An absent position.
    Hole,
    /// A present value.
    Value(Value),
}

impl Slot {
    /// Returns the held value, or `None` for a hole.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Slot::Hole => None,
            Slot::Value(value) => Some(value),
        }
    }

    /// Whether this position is absent.
    pub fn is_hole(&self) -> bool {
        matches!(self, Slot::Hole)
    }
}

/// An ordered sequence with possibly absent positions.
#[derive(Clone, Default)]
pub struct Sequence {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl Sequence {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Sequence::default()
    }

    /// Stable identity token of this sequence.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.slots) as usize
    }

    /// Appends a value.
    pub fn push(&self, value: Value) {
        self.lock().push(Slot::Value(value));
    }

    /// Appends an absent position.
    pub fn push_hole(&self) {
        self.lock().push(Slot::Hole);
    }

    /// Number of positions, holes included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the sequence has no positions.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The value at `index`; `None` if the position is absent or out of
    /// range. Use [`Sequence::slot`] to tell those apart.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.lock().get(index).and_then(|slot| slot.value().cloned())
    }

    /// The slot at `index`, or `None` if out of range.
    pub fn slot(&self, index: usize) -> Option<Slot> {
        self.lock().get(index).cloned()
    }

    /// A copy of all slots.
    pub fn snapshot(&self) -> Vec<Slot> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().expect("sequence state poisoned")
    }
}

impl FromIterator<Value> for Sequence {
    fn from_iter<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let sequence = Sequence::new();
        for value in values {
            sequence.push(value);
        }
        sequence
    }
}

impl Debug for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Sequence({} slots)", self.len())
    }
}

/// A string-keyed record, insertion ordered.
#[derive(Clone, Default)]
pub struct Record {
    entries: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Record::default()
    }

    /// Stable identity token of this record.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.entries) as usize
    }

    /// Inserts a key. An existing key is replaced in place, keeping its
    /// original position.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut entries = self.lock();
        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    /// The value under `key`, if present.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock()
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.clone())
    }

    /// Whether `key` is present (even when its value is `Undefined`).
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().iter().any(|(existing, _)| existing == key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the record has no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, Value)>> {
        self.entries.lock().expect("record state poisoned")
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(entries: I) -> Self {
        let record = Record::new();
        for (key, value) in entries {
            record.insert(key, value);
        }
        record
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Record({} keys)", self.len())
    }
}

/// A keyed mapping with arbitrary value keys, insertion ordered.
#[derive(Clone, Default)]
pub struct Map {
    entries: Arc<Mutex<Vec<(Value, Value)>>>,
}

impl Map {
    /// Creates an empty map.
    pub fn new() -> Self {
        Map::default()
    }

    /// Stable identity token of this map.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.entries) as usize
    }

    /// Inserts a key. A key that is [`Value::same`] as an existing one is
    /// replaced in place.
    pub fn insert(&self, key: Value, value: Value) {
        let mut entries = self.lock();
        match entries.iter_mut().find(|(existing, _)| existing.same(&key)) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    /// The value under `key`, if present.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.lock()
            .iter()
            .find(|(existing, _)| existing.same(key))
            .map(|(_, value)| value.clone())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of all entries in insertion order.
    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Value, Value)>> {
        self.entries.lock().expect("map state poisoned")
    }
}

impl Debug for Map {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Map({} entries)", self.len())
    }
}

/// An unordered unique set (insertion ordered for iteration).
#[derive(Clone, Default)]
pub struct Set {
    members: Arc<Mutex<Vec<Value>>>,
}

impl Set {
    /// Creates an empty set.
    pub fn new() -> Self {
        Set::default()
    }

    /// Stable identity token of this set.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.members) as usize
    }

    /// Inserts a member. Returns `false` if a [`Value::same`] member was
    /// already present.
    pub fn insert(&self, value: Value) -> bool {
        let mut members = self.lock();
        if members.iter().any(|existing| existing.same(&value)) {
            return false;
        }
        members.push(value);
        true
    }

    /// Whether a [`Value::same`] member is present.
    pub fn contains(&self, value: &Value) -> bool {
        self.lock().iter().any(|existing| existing.same(value))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of all members in insertion order.
    pub fn snapshot(&self) -> Vec<Value> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.members.lock().expect("set state poisoned")
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let set = Set::new();
        for value in values {
            set.insert(value);
        }
        set
    }
}

impl Debug for Set {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Set({} members)", self.len())
    }
}

/// An application-registered tagged record: an immutable tag plus an ordered
/// field list.
#[derive(Clone)]
pub struct CustomValue {
    inner: Arc<CustomInner>,
}

struct CustomInner {
    tag: String,
    fields: Mutex<Vec<Value>>,
}

impl CustomValue {
    /// Creates a custom value with the given tag and fields.
    pub fn new(tag: impl Into<String>, fields: Vec<Value>) -> Self {
        CustomValue {
            inner: Arc::new(CustomInner {
                tag: tag.into(),
                fields: Mutex::new(fields),
            }),
        }
    }

    /// Stable identity token of this value.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// The tag.
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// Appends a field.
    pub fn push_field(&self, value: Value) {
        self.lock().push(value);
    }

    /// A copy of the fields in order.
    pub fn fields(&self) -> Vec<Value> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.inner.fields.lock().expect("custom value state poisoned")
    }
}

impl Debug for CustomValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({:?}, {} fields)", self.tag(), self.fields().len())
    }
}
