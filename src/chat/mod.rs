//! Chat collaborator interface.
//!
//! The duel core never talks to a chat network directly. It announces
//! [`Notice`]s and requests restrictions through a [`ChatGateway`], which the
//! embedding bot implements for its transport.
//!
//! - [`console::ConsoleGateway`]: NDJSON over stdout, used by `quickdraw play`
//! - [`memory::MemoryGateway`]: in-memory transcript for tests and embedding

pub mod console;
pub mod memory;

pub use console::ConsoleGateway;
pub use memory::{MemoryGateway, Transcript};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Identifier of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a chat context (group, channel, room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the transport endpoint (bot account) a session runs on.
///
/// Two gateways with the same endpoint id are treated as the same bot when
/// the registry checks for an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub String);

impl EndpointId {
    /// Creates a new `EndpointId`.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Announcement sent into a chat context by a duel session.
///
/// Gateways may render these however their transport likes; the `Display`
/// impl is a plain English default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// The duel was accepted; explains the rules of the race.
    Rules {
        /// Display name of the bot calling "go"
        nickname: String,
        /// Upper bound of the grace period
        max_grace: Duration,
    },
    /// The grace period is over; the first shot now wins.
    Go,
    /// A participant fired before "go".
    Foul {
        /// Who fired early
        fouler: UserId,
        /// Restriction applied to the fouler
        fouler_penalty: Duration,
        /// Restriction applied to the other participant
        bystander_penalty: Duration,
    },
    /// A participant fired first after "go".
    Winner {
        /// Who fired first
        winner: UserId,
        /// Restriction applied to the loser
        loser_penalty: Duration,
    },
    /// The challenged participant never accepted.
    NoAcceptance {
        /// Length of the acceptance window
        window: Duration,
        /// Restriction applied to both participants
        penalty: Duration,
    },
    /// Nobody fired after "go".
    NoShot {
        /// Length of the shot window
        window: Duration,
        /// Restriction applied to both participants, if any
        penalty: Option<Duration>,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rules {
                nickname,
                max_grace,
            } => write!(
                f,
                "{nickname} will call GO within {}. The first to fire after GO wins; \
                 firing before GO is a foul. The loser gets muted.",
                humantime::format_duration(*max_grace)
            ),
            Self::Go => write!(f, "GO"),
            Self::Foul {
                fouler,
                fouler_penalty,
                bystander_penalty,
            } => write!(
                f,
                "Player {fouler} fired early and is muted for {}; the opponent got shot and is muted for {}",
                humantime::format_duration(*fouler_penalty),
                humantime::format_duration(*bystander_penalty)
            ),
            Self::Winner {
                winner,
                loser_penalty,
            } => write!(
                f,
                "Player {winner} wins; the opponent is muted for {}",
                humantime::format_duration(*loser_penalty)
            ),
            Self::NoAcceptance { window, penalty } => write!(
                f,
                "The duel was not accepted within {}; both duelists are muted for {}",
                humantime::format_duration(*window),
                humantime::format_duration(*penalty)
            ),
            Self::NoShot { window, penalty } => {
                write!(
                    f,
                    "Nobody fired within {}",
                    humantime::format_duration(*window)
                )?;
                match penalty {
                    Some(p) => write!(
                        f,
                        "; both duelists are muted for {}",
                        humantime::format_duration(*p)
                    ),
                    None => write!(f, "; no winner"),
                }
            }
        }
    }
}

/// Transport adapter a duel session talks to.
///
/// Calls are awaited by the session before it moves on to its next wait, so
/// announcements reach the chat in order.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    /// Returns the identity of the endpoint this gateway speaks for.
    fn endpoint(&self) -> EndpointId;

    /// Sends an announcement into the chat context.
    async fn notify(&self, chat: ChatId, notice: &Notice) -> Result<(), ChatError>;

    /// Temporarily prevents `user` from posting in `chat`.
    async fn restrict(&self, chat: ChatId, user: UserId, duration: Duration)
    -> Result<(), ChatError>;
}
