//! Encoder entry point.

use futures::{AsyncWrite, SinkExt};
use graphwire_types::{ErrorValue, Settlement, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::EncodeError,
    io::FrameWriter,
    plugin::EncodePlugin,
    registry::EncoderRegistry,
    walk::TableBuilder,
    wire::{self, FrameHeader},
};

/// Options for [`encode`].
#[derive(Default)]
pub struct EncodeOptions {
    /// Encoder plugins, consulted in order ahead of the built-in kinds.
    pub plugins: Vec<Box<dyn EncodePlugin>>,
    /// Cancellation handle. Firing it rejects the outstanding deferreds,
    /// writes their rejection frames and closes the stream.
    pub signal: Option<CancellationToken>,
    /// Rejection reason handed to outstanding deferreds on cancellation.
    /// Defaults to a `Cancelled` error value.
    pub cancel_reason: Option<Value>,
}

/// Encodes `value` onto `writer` as a graphwire stream.
///
/// The root frame is written and flushed immediately. The call then stays
/// alive until every registered deferred has settled, each settlement
/// producing one more frame in completion order, then closes the stream.
/// Settlement payloads may themselves contain deferreds, which are
/// registered under fresh indices and settled by later frames.
pub async fn encode<W>(
    value: &Value,
    writer: W,
    options: EncodeOptions,
) -> Result<(), EncodeError>
where
    W: AsyncWrite + Unpin,
{
    let EncodeOptions {
        plugins,
        signal,
        cancel_reason,
    } = options;
    let mut registry = EncoderRegistry::new();
    let mut writer = FrameWriter::new(writer);

    let table = TableBuilder::root_frame(&plugins, &mut registry).build(value)?;
    registry.advance_past(table.len() as u64);
    debug!(slots = table.len(), "root frame encoded");
    writer.send(wire::render_frame(FrameHeader::Root, &table)).await?;

    while !registry.is_idle() {
        let settlement = match &signal {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => None,
                    settlement = registry.next_settlement() => settlement,
                }
            }
            None => registry.next_settlement().await,
        };

        let Some((index, settlement)) = settlement else {
            return cancel(&mut writer, &mut registry, &plugins, cancel_reason).await;
        };

        let (header, payload) = match settlement {
            Settlement::Fulfilled(value) => (FrameHeader::Fulfill(index), value),
            Settlement::Rejected(reason) => (FrameHeader::Reject(index), reason),
        };
        trace!(index, rejected = matches!(header, FrameHeader::Reject(_)), "deferred settled");
        let table = TableBuilder::continuation_frame(&plugins, &mut registry).build(&payload)?;
        writer.send(wire::render_frame(header, &table)).await?;
    }

    debug!("all deferreds settled; closing stream");
    writer.close().await?;
    Ok(())
}

/// Cancellation path: reject everything outstanding, emit the rejection
/// frames while the stream is still writable, then close.
async fn cancel<W>(
    writer: &mut FrameWriter<W>,
    registry: &mut EncoderRegistry,
    plugins: &[Box<dyn EncodePlugin>],
    cancel_reason: Option<Value>,
) -> Result<(), EncodeError>
where
    W: AsyncWrite + Unpin,
{
    let reason = cancel_reason.unwrap_or_else(|| Value::Error(ErrorValue::cancelled()));
    let drained = registry.close();
    warn!(
        outstanding = drained.len(),
        "encode cancelled; rejecting outstanding deferreds"
    );
    for (index, deferred) in drained {
        // The deferred may have settled between draining and now; the
        // cancellation reason still wins for the stream's consumer.
        let _ = deferred.reject(reason.clone());
        let table = TableBuilder::continuation_frame(plugins, registry).build(&reason)?;
        writer.send(wire::render_frame(FrameHeader::Reject(index), &table)).await?;
    }
    writer.close().await?;
    Ok(())
}
