//! Error types for encoding and decoding.
//!
//! Errors raised *before* the decoder has delivered the root value fail the
//! top-level call. Errors raised afterwards are surfaced through individual
//! placeholder rejections (and through the `done` future), leaving the
//! already delivered root intact.

use std::io;

use thiserror::Error;

/// Failure of a user-supplied plugin: the plugin itself failed, or it
/// returned a shape the codec cannot use.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("plugin failure: {0}")]
pub struct PluginError(pub String);

/// Errors fatal to an [`encode`](crate::encode()) call.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A custom value that no encoder plugin claimed. Application-registered
    /// records have no built-in wire form.
    #[error("unsupported value: no encoder plugin claimed custom tag `{tag}`")]
    UnsupportedValue {
        /// Tag of the unclaimed value.
        tag: String,
    },
    /// A plugin failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),
    /// A deferred value was encountered after cancellation closed the
    /// registry to new registrations.
    #[error("deferred value registered after encoder shutdown")]
    RegistryClosed,
    /// The outbound stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors fatal to a [`decode`](crate::decode()) call or its `done` future.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// An incoming frame violated the wire grammar.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// A frame cited a table index that was never assigned.
    #[error("unknown reference {0}")]
    UnknownReference(i64),
    /// A resolution frame targeted an index that is not pending.
    #[error("resolution frame for index {0} which is not pending")]
    UnexpectedResolution(u64),
    /// An incoming custom-tagged entry that no decoder plugin claimed.
    #[error("unknown custom tag `{0}`")]
    UnknownTag(String),
    /// A plugin failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),
    /// The caller's cancellation handle fired.
    #[error("decoding cancelled")]
    Cancelled,
    /// The inbound stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
