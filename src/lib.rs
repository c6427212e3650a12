//! `quickdraw` - timed quick-draw duels for chat bots
//!
//! Two participants in a chat race each other: after a challenge is
//! accepted, a random grace period gates the "go" signal, the first shot
//! after it wins, and a shot before it is a foul. Every duel resolves into
//! exactly one outcome and a temporary restriction for the losing side.
//!
//! The [`duel`] module is the core; it talks to the outside world only
//! through [`chat::ChatGateway`].

pub mod chat;
pub mod cli;
pub mod config;
pub mod duel;
pub mod error;
pub mod observability;
