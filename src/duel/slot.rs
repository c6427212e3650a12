//! Single-settlement signal slots.
//!
//! A [`SignalSlot`] is the rendezvous point between a session's lifecycle
//! task and the external `accept`/`act` calls. It moves through
//! `Idle -> Open -> {Fulfilled, TimedOut, Cancelled}` and settles exactly
//! once: the first of fulfillment, deadline expiry or cancellation wins, and
//! every later attempt observes the slot already settled and does nothing.
//!
//! The state lives in a `tokio::sync::watch` channel. `send_if_modified` is
//! the compare-and-set that decides who settles the slot, and receivers wake
//! on every settlement.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

/// Result of waiting on a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// An external signal settled the slot with a value.
    Fulfilled(T),
    /// The deadline elapsed before any signal arrived.
    TimedOut,
    /// The slot was cancelled; neither a timeout nor a fulfillment.
    Cancelled,
}

#[derive(Debug, Clone)]
enum SlotState<T> {
    Idle,
    Open,
    Fulfilled(T),
    TimedOut,
    Cancelled,
}

impl<T> SlotState<T> {
    const fn is_settled(&self) -> bool {
        matches!(self, Self::Fulfilled(_) | Self::TimedOut | Self::Cancelled)
    }
}

/// Single-assignment, single-consumer rendezvous with a deadline.
pub struct SignalSlot<T> {
    name: &'static str,
    state: watch::Sender<SlotState<T>>,
}

impl<T> SignalSlot<T>
where
    T: Clone + Send + Sync,
{
    /// Creates an idle slot. `name` is only used in logs.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(SlotState::Idle);
        Self { name, state }
    }

    /// Opens the slot for fulfillment.
    ///
    /// Returns `false` if the slot was already opened or settled (for
    /// example, cancelled before it could open).
    pub fn open(&self) -> bool {
        let opened = self.state.send_if_modified(|state| {
            if matches!(state, SlotState::Idle) {
                *state = SlotState::Open;
                true
            } else {
                false
            }
        });
        trace!(slot = self.name, opened, "open");
        opened
    }

    /// Returns whether the slot is open and not yet settled.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), SlotState::Open)
    }

    /// Returns whether the slot has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.state.borrow().is_settled()
    }

    /// Settles an open slot with `value`.
    ///
    /// Returns `true` only for the call that actually settled the slot.
    pub fn fulfill(&self, value: T) -> bool {
        let fulfilled = self.state.send_if_modified(move |state| {
            if matches!(state, SlotState::Open) {
                *state = SlotState::Fulfilled(value);
                true
            } else {
                false
            }
        });
        trace!(slot = self.name, fulfilled, "fulfill");
        fulfilled
    }

    /// Cancels the slot if it has not settled yet. Idempotent.
    ///
    /// An idle slot is cancelled too, so it can no longer be opened.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.send_if_modified(|state| {
            if state.is_settled() {
                false
            } else {
                *state = SlotState::Cancelled;
                true
            }
        });
        trace!(slot = self.name, cancelled, "cancel");
        cancelled
    }

    /// Settles the slot as timed out, unless something else got there first.
    fn expire(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_settled() {
                false
            } else {
                *state = SlotState::TimedOut;
                true
            }
        })
    }

    /// Waits until the slot settles or `window` elapses.
    ///
    /// On deadline the slot is expired atomically; if a fulfillment or a
    /// cancellation won that race, the winner's outcome is returned instead.
    pub async fn wait(&self, window: Duration) -> WaitOutcome<T> {
        let mut rx = self.state.subscribe();
        let elapsed = tokio::time::timeout(window, rx.wait_for(SlotState::is_settled))
            .await
            .is_err();

        if elapsed && self.expire() {
            trace!(slot = self.name, ?window, "expired");
        }

        self.outcome()
    }

    /// Returns the settled outcome. Unsettled slots only occur after an
    /// expiry lost to nothing, which cannot happen; they map to `Cancelled`.
    fn outcome(&self) -> WaitOutcome<T> {
        match &*self.state.borrow() {
            SlotState::Fulfilled(value) => WaitOutcome::Fulfilled(value.clone()),
            SlotState::TimedOut => WaitOutcome::TimedOut,
            SlotState::Idle | SlotState::Open | SlotState::Cancelled => WaitOutcome::Cancelled,
        }
    }
}

impl<T> fmt::Debug for SignalSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.borrow() {
            SlotState::Idle => "idle",
            SlotState::Open => "open",
            SlotState::Fulfilled(_) => "fulfilled",
            SlotState::TimedOut => "timed_out",
            SlotState::Cancelled => "cancelled",
        };
        f.debug_struct("SignalSlot")
            .field("name", &self.name)
            .field("state", &state)
            .finish()
    }
}
