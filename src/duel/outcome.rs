//! Results of duels and of the signals delivered into them.

use std::fmt;

use serde::Serialize;

use crate::chat::UserId;

/// How a duel session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuelOutcome {
    /// A participant fired during the grace period.
    Foul {
        /// Who fired early
        fouler: UserId,
        /// The other participant
        bystander: UserId,
    },
    /// A participant fired first after "go".
    Win {
        /// Who fired first
        winner: UserId,
        /// The other participant
        loser: UserId,
    },
    /// The challenge was never accepted.
    NoAcceptance,
    /// The challenge was accepted but nobody fired after "go".
    Stalemate,
    /// The session was cancelled before resolving; no enforcement happened.
    Abandoned,
    /// The lifecycle failed unexpectedly and was cleaned up.
    Faulted {
        /// Error description
        reason: String,
    },
}

impl DuelOutcome {
    /// Short label for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Foul { .. } => "foul",
            Self::Win { .. } => "win",
            Self::NoAcceptance => "no_acceptance",
            Self::Stalemate => "stalemate",
            Self::Abandoned => "abandoned",
            Self::Faulted { .. } => "faulted",
        }
    }
}

impl fmt::Display for DuelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foul { fouler, .. } => write!(f, "foul by {fouler}"),
            Self::Win { winner, .. } => write!(f, "won by {winner}"),
            Self::Faulted { reason } => write!(f, "faulted: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// What an `accept`/`act` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The challenge was accepted.
    Accepted,
    /// The caller fired during the grace period.
    Fouled,
    /// The caller fired first after "go".
    Fired,
    /// The signal had no effect.
    Ignored(IgnoreReason),
}

/// Why a signal had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The session already timed out.
    TimedOut,
    /// The session already finished.
    Finished,
    /// The caller is not one of the two participants.
    NotParticipant,
    /// No wait for this signal is open, or it has already settled.
    NotOpen,
}
