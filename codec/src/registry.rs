//! Deferred tracking on both sides of the stream.
//!
//! The encoder registry watches registered deferreds through their
//! `settled()` futures and yields settlements in completion order, which
//! is the order resolution frames go out on the wire. The decoder registry owns
//! the placeholders installed wherever a pending index is referenced and
//! settles them as resolution frames arrive.

use std::collections::HashMap;

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use graphwire_types::{Deferred, Settlement, Value};

use crate::error::{DecodeError, EncodeError};

/// Encoder-side registry of deferred values.
pub(crate) struct EncoderRegistry {
    /// Identity of every deferred ever registered, mapped to its global
    /// index. Entries are never removed: a deferred reachable from several
    /// frames keeps one index and settles with one frame.
    indices: HashMap<usize, u64>,
    /// Next free global index; kept past every root-frame slot.
    next_index: u64,
    /// Completion futures of not yet settled deferreds.
    settlements: FuturesUnordered<BoxFuture<'static, (u64, Settlement)>>,
    /// Deferreds awaiting settlement, for draining on cancellation.
    outstanding: HashMap<u64, Deferred>,
    /// Set once cancellation stops new registrations.
    closed: bool,
}

impl EncoderRegistry {
    pub(crate) fn new() -> Self {
        EncoderRegistry {
            indices: HashMap::new(),
            next_index: 0,
            settlements: FuturesUnordered::new(),
            outstanding: HashMap::new(),
            closed: false,
        }
    }

    /// Registers a deferred, returning its global index. A deferred already
    /// registered (by this or an earlier frame) keeps its index and is not
    /// watched twice.
    ///
    /// `slot_hint` is the table slot while encoding the root frame, where
    /// slot and global index coincide; resolution frames pass `None` and
    /// draw from the stream-wide allocator.
    pub(crate) fn register(
        &mut self,
        deferred: &Deferred,
        slot_hint: Option<u64>,
    ) -> Result<u64, EncodeError> {
        if let Some(&index) = self.indices.get(&deferred.heap_id()) {
            return Ok(index);
        }
        if self.closed {
            return Err(EncodeError::RegistryClosed);
        }
        let index = match slot_hint {
            Some(slot) => slot,
            None => {
                let index = self.next_index;
                self.next_index += 1;
                index
            }
        };
        self.indices.insert(deferred.heap_id(), index);
        self.outstanding.insert(index, deferred.clone());
        let settled = deferred.settled();
        self.settlements
            .push(async move { (index, settled.await) }.boxed());
        Ok(index)
    }

    /// Moves the stream-wide allocator past `bound`, so indices assigned by
    /// later frames never collide with root-frame slots.
    pub(crate) fn advance_past(&mut self, bound: u64) {
        if self.next_index < bound {
            self.next_index = bound;
        }
    }

    /// Whether no registered deferred is awaiting settlement.
    pub(crate) fn is_idle(&self) -> bool {
        self.settlements.is_empty()
    }

    /// Waits for the next settlement, in completion order.
    pub(crate) async fn next_settlement(&mut self) -> Option<(u64, Settlement)> {
        let settlement = self.settlements.next().await;
        if let Some((index, _)) = &settlement {
            self.outstanding.remove(index);
        }
        settlement
    }

    /// Closes the registry to new registrations and drains the not yet
    /// settled deferreds, ordered by index for deterministic output.
    pub(crate) fn close(&mut self) -> Vec<(u64, Deferred)> {
        self.closed = true;
        self.settlements.clear();
        let mut drained: Vec<_> = self.outstanding.drain().collect();
        drained.sort_by_key(|(index, _)| *index);
        drained
    }
}

/// Decoder-side registry of placeholders.
pub(crate) struct DecoderRegistry {
    /// Placeholder per known global index. Entries are kept after
    /// settlement so a later frame referencing the same index hydrates to
    /// the same (already settled) deferred.
    placeholders: HashMap<u64, Deferred>,
}

impl DecoderRegistry {
    pub(crate) fn new() -> Self {
        DecoderRegistry {
            placeholders: HashMap::new(),
        }
    }

    /// Returns the placeholder for `index`, creating it if unseen.
    pub(crate) fn placeholder(&mut self, index: u64) -> Deferred {
        self.placeholders
            .entry(index)
            .or_insert_with(Deferred::pending)
            .clone()
    }

    /// Settles the placeholder for `index`.
    pub(crate) fn settle(
        &mut self,
        index: u64,
        settlement: Settlement,
    ) -> Result<(), DecodeError> {
        let placeholder = self
            .placeholders
            .get(&index)
            .ok_or(DecodeError::UnexpectedResolution(index))?;
        let result = match settlement {
            Settlement::Fulfilled(value) => placeholder.fulfill(value),
            Settlement::Rejected(reason) => placeholder.reject(reason),
        };
        result.map_err(|_| DecodeError::UnexpectedResolution(index))
    }

    /// Number of placeholders still pending.
    pub(crate) fn pending_count(&self) -> usize {
        self.placeholders
            .values()
            .filter(|placeholder| placeholder.is_pending())
            .count()
    }

    /// Rejects every still-pending placeholder with `reason`.
    pub(crate) fn reject_all(&mut self, reason: &Value) {
        for placeholder in self.placeholders.values() {
            if placeholder.is_pending() {
                // Cannot fail: the placeholder was pending a line above and
                // nothing else settles placeholders concurrently.
                let _ = placeholder.reject(reason.clone());
            }
        }
    }
}
