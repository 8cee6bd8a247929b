//! Tagged error values.

use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

/// A tagged error value: a kind name plus a message.
///
/// Contents are immutable; the handle is identity-dedupable like the
/// containers.
#[derive(Clone)]
pub struct ErrorValue {
    inner: Arc<ErrorInner>,
}

struct ErrorInner {
    kind: String,
    message: String,
}

impl ErrorValue {
    /// Creates an error value.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorValue {
            inner: Arc::new(ErrorInner {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    /// Rejection reason used when the stream closed while the value was
    /// still pending.
    pub fn closed_without_resolution() -> Self {
        ErrorValue::new(
            "ClosedWithoutResolution",
            "stream closed before the deferred value was resolved",
        )
    }

    /// Rejection reason used when a codec call was cancelled without the
    /// caller supplying a reason of its own.
    pub fn cancelled() -> Self {
        ErrorValue::new("Cancelled", "the operation was cancelled")
    }

    /// Rejection reason used when decoding failed after the root value was
    /// already delivered.
    pub fn decode_failure(detail: impl Into<String>) -> Self {
        ErrorValue::new("Decode", detail)
    }

    /// Stable identity token of this error.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// The kind name.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// The message.
    pub fn message(&self) -> &str {
        &self.inner.message
    }
}

impl Debug for ErrorValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorValue({:?}: {:?})", self.kind(), self.message())
    }
}

impl Display for ErrorValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}
