//! Decoder entry point.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{future::BoxFuture, AsyncRead, FutureExt, StreamExt};
use graphwire_types::{ErrorValue, Settlement, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::DecodeError,
    io::FrameReader,
    parse::Hydrator,
    plugin::DecodePlugin,
    registry::DecoderRegistry,
    wire::{self, FrameHeader},
};

/// Read buffer growth increment for the frame reader.
const READ_BUFFER_INCREMENT: usize = 8 * 1024;

/// Options for [`decode`].
#[derive(Default)]
pub struct DecodeOptions {
    /// Decoder plugins, consulted in order for custom-tagged entries.
    pub plugins: Vec<Box<dyn DecodePlugin>>,
    /// Cancellation handle. Firing it rejects every pending placeholder and
    /// releases the inbound stream.
    pub signal: Option<CancellationToken>,
    /// Rejection reason handed to pending placeholders on cancellation.
    /// Defaults to a `Cancelled` error value.
    pub cancel_reason: Option<Value>,
}

/// A decoded stream.
pub struct Decoded {
    /// The hydrated root. Deferred positions hold placeholders that settle
    /// as resolution frames arrive.
    pub value: Value,
    /// Completion future. It must be awaited (or spawned) to pump the
    /// remaining frames; no placeholder settles otherwise.
    pub done: Done,
}

impl std::fmt::Debug for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoded")
            .field("value", &self.value)
            .field("done", &self.done)
            .finish()
    }
}

/// Future driving the post-root frames; resolves when the stream
/// terminates.
///
/// Clean end of input yields `Ok(())` even when placeholders were still
/// pending: those are rejected with a `ClosedWithoutResolution` error
/// value, while the already delivered root stays intact.
pub struct Done {
    inner: BoxFuture<'static, Result<(), DecodeError>>,
}

impl std::fmt::Debug for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

impl Future for Done {
    type Output = Result<(), DecodeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

/// Decodes a graphwire stream from `reader`.
///
/// Returns as soon as the root frame has been hydrated. Deferreds inside
/// the root are placeholders at that point; the call never waits for them
/// to settle. Errors in the root frame fail this call; errors afterwards
/// surface through [`Decoded::done`] and through placeholder rejections.
pub async fn decode<R>(reader: R, options: DecodeOptions) -> Result<Decoded, DecodeError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let DecodeOptions {
        plugins,
        signal,
        cancel_reason,
    } = options;
    let mut frames = FrameReader::new(reader, READ_BUFFER_INCREMENT);
    let mut registry = DecoderRegistry::new();

    let line = match frames.next().await {
        Some(line) => line?,
        None => return Err(wire::malformed("stream ended before the root frame")),
    };
    let frame = wire::parse_frame(&line)?;
    if frame.header != FrameHeader::Root {
        return Err(wire::malformed("first frame carries a resolution discriminator"));
    }
    let value = Hydrator::new(&plugins, &mut registry).hydrate(&frame.table)?;
    debug!(
        slots = frame.table.len(),
        pending = registry.pending_count(),
        "root frame hydrated"
    );

    let done = Done {
        inner: pump(frames, registry, plugins, signal, cancel_reason).boxed(),
    };
    Ok(Decoded { value, done })
}

async fn pump<R>(
    mut frames: FrameReader<R>,
    mut registry: DecoderRegistry,
    plugins: Vec<Box<dyn DecodePlugin>>,
    signal: Option<CancellationToken>,
    cancel_reason: Option<Value>,
) -> Result<(), DecodeError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    loop {
        let next = match &signal {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        let reason = cancel_reason
                            .clone()
                            .unwrap_or_else(|| Value::Error(ErrorValue::cancelled()));
                        warn!(
                            pending = registry.pending_count(),
                            "decode cancelled; rejecting placeholders"
                        );
                        registry.reject_all(&reason);
                        return Err(DecodeError::Cancelled);
                    }
                    next = frames.next() => next,
                }
            }
            None => frames.next().await,
        };

        let line = match next {
            None => {
                let pending = registry.pending_count();
                if pending > 0 {
                    debug!(pending, "stream closed with unresolved deferreds");
                    registry
                        .reject_all(&Value::Error(ErrorValue::closed_without_resolution()));
                }
                return Ok(());
            }
            Some(Ok(line)) => line,
            Some(Err(error)) => {
                fail(&mut registry, error.to_string());
                return Err(error.into());
            }
        };

        if let Err(error) = apply_frame(&line, &mut registry, &plugins) {
            fail(&mut registry, error.to_string());
            return Err(error);
        }
    }
}

/// Hydrates one resolution frame and settles its placeholder.
fn apply_frame(
    line: &[u8],
    registry: &mut DecoderRegistry,
    plugins: &[Box<dyn DecodePlugin>],
) -> Result<(), DecodeError> {
    let frame = wire::parse_frame(line)?;
    let (index, rejected) = match frame.header {
        FrameHeader::Root => return Err(wire::malformed("second root frame")),
        FrameHeader::Fulfill(index) => (index, false),
        FrameHeader::Reject(index) => (index, true),
    };
    let value = Hydrator::new(plugins, registry).hydrate(&frame.table)?;
    trace!(index, rejected, "resolution frame hydrated");
    let settlement = if rejected {
        Settlement::Rejected(value)
    } else {
        Settlement::Fulfilled(value)
    };
    registry.settle(index, settlement)
}

/// Rejects every pending placeholder after a post-root failure, so callers
/// holding only placeholders observe it too.
fn fail(registry: &mut DecoderRegistry, detail: String) {
    registry.reject_all(&Value::Error(ErrorValue::decode_failure(detail)));
}
