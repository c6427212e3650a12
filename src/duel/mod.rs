//! Duel core
//!
//! A duel is a timed two-party race inside one chat context: a challenge is
//! accepted, a random grace period gates when either side may fire, the
//! first shot after "go" wins and a shot before it is a foul. Every path
//! ends in exactly one [`DuelOutcome`] and, usually, a restriction for one or
//! both participants.
//!
//! - [`slot`]: single-settlement signal slots raced against deadlines
//! - [`session`]: one duel's state machine and lifecycle task
//! - [`registry`]: at most one live session per endpoint and chat
//! - [`delay`]: grace period selection
//! - [`outcome`]: resolution and signal result types

pub mod delay;
pub mod outcome;
pub mod registry;
pub mod session;
pub mod slot;

pub use delay::{FixedGrace, GraceDelay, RandomGrace};
pub use outcome::{DuelOutcome, IgnoreReason, SignalOutcome};
pub use registry::{SessionKey, SessionRegistry};
pub use session::{DuelSession, Stage};
pub use slot::{SignalSlot, WaitOutcome};
