//! Plugin dispatch for custom-tagged values.
//!
//! Plugins form an ordered list consulted ahead of the built-in kind table;
//! the first plugin that claims a value wins. Registering a plugin early in
//! the list therefore overrides later plugins and the built-ins alike. The
//! tag emitted by an encoder plugin must match a decoder plugin registered
//! at the receiver.

use graphwire_types::Value;

use crate::error::PluginError;

/// Replacement emitted by an encoder plugin: a tag plus the ordered
/// sub-values to encode in its place.
#[derive(Clone, Debug)]
pub struct Replacement {
    /// Tag routed to the decoder plugin list at the receiver.
    pub tag: String,
    /// Sub-values, encoded recursively and passed positionally on decode.
    pub fields: Vec<Value>,
}

impl Replacement {
    /// Creates a replacement.
    pub fn new(tag: impl Into<String>, fields: Vec<Value>) -> Self {
        Replacement {
            tag: tag.into(),
            fields,
        }
    }
}

/// Encoder-side type plugin.
pub trait EncodePlugin: Send + Sync {
    /// Inspects `value`. Returns a replacement to claim it, or `None` to
    /// decline and let the next plugin (or the built-in kinds) handle it.
    fn replace(&self, value: &Value) -> Result<Option<Replacement>, PluginError>;
}

/// Decoder-side type plugin.
pub trait DecodePlugin: Send + Sync {
    /// Revives a custom-tagged entry from its hydrated fields. Returns the
    /// reconstructed value, or `None` to decline.
    fn revive(&self, tag: &str, fields: &[Value]) -> Result<Option<Value>, PluginError>;
}
