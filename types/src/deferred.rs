//! First-class deferred values.
//!
//! A [`Deferred`] is a cloneable handle over a settle-once state machine.
//! The same type serves both roles the codec needs: on the encoder side it
//! is the registered future whose completion produces a resolution frame,
//! and on the decoder side it is the placeholder installed wherever a
//! pending index is referenced. Settling wakes every task waiting on a
//! [`Settled`] future, so any number of decoded references can observe one
//! settlement.

use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll, Waker},
};

use thiserror::Error;

use crate::Value;

/// Error returned when settling an already settled deferred.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("deferred already settled")]
pub struct SettleError;

/// The final state of a deferred.
#[derive(Clone, Debug)]
pub enum Settlement {
    /// Settled with a value.
    Fulfilled(Value),
    /// Settled with a rejection reason (any value, typically an error).
    Rejected(Value),
}

impl Settlement {
    /// The carried value, whichever way the deferred settled.
    pub fn value(&self) -> &Value {
        match self {
            Settlement::Fulfilled(value) | Settlement::Rejected(value) => value,
        }
    }

    /// Converts into `Ok` on fulfillment, `Err` on rejection.
    pub fn into_result(self) -> Result<Value, Value> {
        match self {
            Settlement::Fulfilled(value) => Ok(value),
            Settlement::Rejected(reason) => Err(reason),
        }
    }
}

enum State {
    Pending { wakers: Vec<Waker> },
    Settled(Settlement),
}

/// A value that will be supplied later.
#[derive(Clone)]
pub struct Deferred {
    state: Arc<Mutex<State>>,
}

impl Deferred {
    /// Creates an unsettled deferred.
    pub fn pending() -> Self {
        Deferred {
            state: Arc::new(Mutex::new(State::Pending { wakers: Vec::new() })),
        }
    }

    /// Creates a deferred already fulfilled with `value`.
    pub fn fulfilled(value: Value) -> Self {
        Deferred {
            state: Arc::new(Mutex::new(State::Settled(Settlement::Fulfilled(value)))),
        }
    }

    /// Creates a deferred already rejected with `reason`.
    pub fn rejected(reason: Value) -> Self {
        Deferred {
            state: Arc::new(Mutex::new(State::Settled(Settlement::Rejected(reason)))),
        }
    }

    /// Stable identity token of this deferred.
    pub fn heap_id(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    /// Whether the deferred has not settled yet.
    pub fn is_pending(&self) -> bool {
        matches!(*self.lock(), State::Pending { .. })
    }

    /// A snapshot of the settlement, or `None` while pending.
    pub fn settlement(&self) -> Option<Settlement> {
        match &*self.lock() {
            State::Pending { .. } => None,
            State::Settled(settlement) => Some(settlement.clone()),
        }
    }

    /// Settles with a value, waking all waiters.
    pub fn fulfill(&self, value: Value) -> Result<(), SettleError> {
        self.settle(Settlement::Fulfilled(value))
    }

    /// Settles with a rejection reason, waking all waiters.
    pub fn reject(&self, reason: Value) -> Result<(), SettleError> {
        self.settle(Settlement::Rejected(reason))
    }

    fn settle(&self, settlement: Settlement) -> Result<(), SettleError> {
        let mut state = self.lock();
        match &mut *state {
            State::Pending { wakers } => {
                let wakers = mem::take(wakers);
                *state = State::Settled(settlement);
                drop(state);
                for waker in wakers {
                    waker.wake();
                }
                Ok(())
            }
            State::Settled(_) => Err(SettleError),
        }
    }

    /// A future resolving with the settlement once it happens.
    pub fn settled(&self) -> Settled {
        Settled {
            deferred: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("deferred state poisoned")
    }
}

impl Debug for Deferred {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &*self.lock() {
            State::Pending { .. } => write!(f, "Deferred(pending)"),
            State::Settled(Settlement::Fulfilled(_)) => write!(f, "Deferred(fulfilled)"),
            State::Settled(Settlement::Rejected(_)) => write!(f, "Deferred(rejected)"),
        }
    }
}

/// Future returned by [`Deferred::settled`].
pub struct Settled {
    deferred: Deferred,
}

impl Future for Settled {
    type Output = Settlement;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Settlement> {
        let mut state = self.deferred.lock();
        match &mut *state {
            State::Settled(settlement) => Poll::Ready(settlement.clone()),
            State::Pending { wakers } => {
                if !wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[test]
    fn settles_exactly_once() {
        let deferred = Deferred::pending();
        assert!(deferred.is_pending());
        assert!(deferred.fulfill(Value::from(1.0)).is_ok());
        assert_eq!(deferred.reject(Value::Null), Err(SettleError));
        assert!(matches!(
            deferred.settlement(),
            Some(Settlement::Fulfilled(_))
        ));
    }

    #[test]
    fn settled_future_resolves_immediately_when_settled() {
        let deferred = Deferred::rejected(Value::from("nope"));
        let settlement = deferred.settled().now_or_never().expect("already settled");
        assert!(matches!(settlement, Settlement::Rejected(_)));
    }

    #[test]
    fn pending_future_stays_pending() {
        let deferred = Deferred::pending();
        assert!(deferred.settled().now_or_never().is_none());
    }

    #[tokio::test]
    async fn settling_wakes_waiting_tasks() {
        let deferred = Deferred::pending();

        let first = tokio::spawn({
            let deferred = deferred.clone();
            async move { deferred.settled().await }
        });
        let second = tokio::spawn({
            let deferred = deferred.clone();
            async move { deferred.settled().await }
        });

        tokio::task::yield_now().await;
        deferred.fulfill(Value::from(42.0)).expect("should settle");

        for handle in [first, second] {
            let settlement = handle.await.expect("waiter should finish");
            assert!(settlement.value().same(&Value::from(42.0)));
        }
    }
}
