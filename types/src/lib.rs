//! Core value model shared by the graphwire encoder and decoder.
//!
//! The codec transports a closed set of value kinds: singleton atoms,
//! scalars, containers, tagged records and deferred values that settle
//! later. This crate defines those kinds and nothing else; the wire format
//! and the streaming machinery live in the `graphwire` crate.
//!
//! Heap-backed kinds (containers, errors, custom records, deferreds) are
//! cheap-to-clone shared handles. Cloning a handle never copies contents,
//! it shares them, which is what gives these values their *identity*: the
//! encoder deduplicates by identity, so a value reachable twice through one
//! root is encoded once and decodes back into one shared value.

mod containers;
mod deferred;
mod error_value;
mod regexp;
mod symbol;
mod timestamp;
mod url;
mod value;

pub use containers::{CustomValue, Map, Record, Sequence, Set, Slot};
pub use deferred::{Deferred, Settled, Settlement, SettleError};
pub use error_value::ErrorValue;
pub use regexp::Regexp;
pub use symbol::Symbol;
pub use timestamp::Timestamp;
pub use url::Url;
pub use value::Value;

pub use num_bigint::BigInt;
