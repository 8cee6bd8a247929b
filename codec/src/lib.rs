//! Streaming, self-referential value serialization.
//!
//! `graphwire` transports structured in-memory values (atoms, scalars,
//! containers, tagged records and *deferred* values that resolve
//! asynchronously) across an ordered byte stream. The receiver observes
//! the root value before all sub-values have arrived and observes each
//! deferred independently as it is fulfilled or rejected at the sender.
//!
//! ## Wire format
//!
//! The stream is text oriented and newline delimited. Each line is one
//! frame carrying an indexed reference table (a JSON array). The first
//! frame holds the root value graph; every subsequent frame settles exactly
//! one deferred, keyed by its global index:
//!
//! ```text
//! [[2,["answer",1]],[12,1]]     root: a record holding a pending deferred
//! +1:[42.0]                     the deferred fulfilled with 42
//! ```
//!
//! The table supports shared references and cycles: every heap value is
//! assigned a slot index on first visit and referenced by index afterwards.
//! Singleton atoms (undefined, null, the booleans, the infinities, NaN,
//! negative zero, the empty string) are encoded as negative sentinels and
//! never occupy slots.
//!
//! ## Entry points
//!
//! [`encode`] walks a value onto an [`futures::io::AsyncWrite`] writer and
//! stays alive until every registered deferred has settled. [`decode`]
//! hydrates the root frame from an [`futures::io::AsyncRead`] reader and
//! returns promptly; the returned [`Decoded::done`] future pumps the
//! remaining frames and completes when the stream terminates.

mod decode;
mod encode;
mod error;
mod io;
mod parse;
mod plugin;
mod registry;
mod walk;
mod wire;

pub use decode::{decode, DecodeOptions, Decoded, Done};
pub use encode::{encode, EncodeOptions};
pub use error::{DecodeError, EncodeError, PluginError};
pub use io::{FrameReader, FrameWriter};
pub use plugin::{DecodePlugin, EncodePlugin, Replacement};

pub use graphwire_types as types;

/// Shorthand for unwrapping a `Result` inside a poll function, converting
/// the error before returning it.
macro_rules! try_ready {
    ($e:expr) => {
        match $e {
            Err(error) => return ::std::task::Poll::Ready(Err(error.into())),
            Ok(value) => value,
        }
    };
}

pub(crate) use try_ready;
