//! `play` command handler
//!
//! Runs a single console chat: commands arrive on stdin one per line, and
//! every announcement, restriction and reply leaves on stdout as NDJSON.
//!
//! ```text
//! 10 duel 20     user 10 challenges user 20
//! 20 accept      user 20 accepts
//! 10 fire        user 10 shoots
//! who            list running duels
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chat::{ChatGateway, ChatId, ConsoleGateway, EndpointId, UserId};
use crate::cli::args::PlayArgs;
use crate::config::{default_config, load_config};
use crate::duel::{RandomGrace, SessionRegistry, SignalOutcome};
use crate::error::{ChatError, QuickdrawError};
use crate::observability::EventEmitter;

// ============================================================================
// Command parsing
// ============================================================================

/// One line of console input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `<challenger> duel <challenged>`
    Duel {
        /// Who issues the challenge
        challenger: UserId,
        /// Who is challenged
        challenged: UserId,
    },
    /// `<user> accept`
    Accept(UserId),
    /// `<user> fire`
    Fire(UserId),
    /// `who`
    Who,
}

/// Why a console line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    /// The line had no tokens.
    #[error("empty command")]
    Empty,

    /// A user id was not an integer.
    #[error("invalid user id: {0}")]
    InvalidUser(String),

    /// The verb or the argument count was not recognized.
    #[error("unrecognized command: {0}")]
    Unrecognized(String),
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => Err(CommandParseError::Empty),
            [verb] if verb.eq_ignore_ascii_case("who") => Ok(Self::Who),
            [user, verb] if verb.eq_ignore_ascii_case("accept") => {
                Ok(Self::Accept(parse_user(user)?))
            }
            [user, verb] if verb.eq_ignore_ascii_case("fire") => Ok(Self::Fire(parse_user(user)?)),
            [challenger, verb, challenged] if verb.eq_ignore_ascii_case("duel") => {
                Ok(Self::Duel {
                    challenger: parse_user(challenger)?,
                    challenged: parse_user(challenged)?,
                })
            }
            _ => Err(CommandParseError::Unrecognized(line.trim().to_string())),
        }
    }
}

fn parse_user(token: &str) -> Result<UserId, CommandParseError> {
    token
        .parse()
        .map(UserId)
        .map_err(|_| CommandParseError::InvalidUser(token.to_string()))
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duel {
                challenger,
                challenged,
            } => write!(f, "{challenger} duel {challenged}"),
            Self::Accept(user) => write!(f, "{user} accept"),
            Self::Fire(user) => write!(f, "{user} fire"),
            Self::Who => f.write_str("who"),
        }
    }
}

// ============================================================================
// Console chat
// ============================================================================

/// Command layer for one console chat.
///
/// Decides who may do what before calling into the duel core: nobody duels
/// themselves, nobody is in two duels at once, and only the challenged user
/// may accept.
#[derive(Debug)]
pub struct ConsoleChat {
    registry: SessionRegistry,
    gateway: Arc<ConsoleGateway>,
    chat: ChatId,
}

impl ConsoleChat {
    /// Creates a command layer for `chat`.
    #[must_use]
    pub const fn new(registry: SessionRegistry, gateway: Arc<ConsoleGateway>, chat: ChatId) -> Self {
        Self {
            registry,
            gateway,
            chat,
        }
    }

    /// The registry sessions are created in.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Parses and handles one input line. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if a reply cannot be written.
    pub async fn handle_line(&self, line: &str) -> Result<(), ChatError> {
        match line.parse::<ConsoleCommand>() {
            Ok(command) => self.handle(command).await,
            Err(CommandParseError::Empty) => Ok(()),
            Err(e) => self.reply(&e.to_string()).await,
        }
    }

    /// Handles one parsed command.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if a reply cannot be written.
    pub async fn handle(&self, command: ConsoleCommand) -> Result<(), ChatError> {
        debug!(chat = %self.chat, %command, "console command");
        match command {
            ConsoleCommand::Duel {
                challenger,
                challenged,
            } => self.challenge(challenger, challenged).await,
            ConsoleCommand::Accept(user) => self.accept(user).await,
            ConsoleCommand::Fire(user) => {
                self.fire(user).await;
                Ok(())
            }
            ConsoleCommand::Who => self.who().await,
        }
    }

    async fn challenge(&self, challenger: UserId, challenged: UserId) -> Result<(), ChatError> {
        if challenger == challenged {
            return self.reply("you cannot duel yourself").await;
        }

        let busy = self
            .registry
            .list_active_participants()
            .await
            .into_values()
            .flat_map(|(a, b)| [a, b])
            .find(|u| *u == challenger || *u == challenged);
        if let Some(user) = busy {
            return self.reply(&format!("{user} is already in a duel")).await;
        }

        let gateway: Arc<dyn ChatGateway> = Arc::clone(&self.gateway) as Arc<dyn ChatGateway>;
        match self
            .registry
            .create(gateway, self.chat, challenger, challenged)
            .await
        {
            Some(_) => {
                let window = self.registry.config().accept_duration();
                self.reply(&format!(
                    "{challenger} challenges {challenged}; {challenged} has {} to accept",
                    humantime::format_duration(window)
                ))
                .await
            }
            None => self.reply("a duel is already running in this chat").await,
        }
    }

    async fn accept(&self, user: UserId) -> Result<(), ChatError> {
        let Some(session) = self.registry.get(&self.endpoint(), self.chat).await else {
            return self.reply("there is no duel to accept").await;
        };
        if user != session.challenged() {
            return self
                .reply(&format!("only {} can accept this duel", session.challenged()))
                .await;
        }

        if let SignalOutcome::Ignored(reason) = session.accept() {
            debug!(%user, ?reason, "accept had no effect");
        }
        Ok(())
    }

    async fn fire(&self, user: UserId) {
        let Some(session) = self.registry.get(&self.endpoint(), self.chat).await else {
            debug!(%user, "shot outside any duel");
            return;
        };
        let outcome = session.act(user);
        debug!(%user, ?outcome, "shot delivered");
    }

    async fn who(&self) -> Result<(), ChatError> {
        let active = self.registry.list_active_participants().await;
        if active.is_empty() {
            return self.reply("no duels running").await;
        }
        let text = active
            .iter()
            .map(|(chat, (a, b))| format!("chat {chat}: {a} vs {b}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.reply(&text).await
    }

    fn endpoint(&self) -> EndpointId {
        self.gateway.endpoint()
    }

    async fn reply(&self, text: &str) -> Result<(), ChatError> {
        self.gateway.reply(self.chat, text).await
    }
}

// ============================================================================
// Command entry point
// ============================================================================

/// Run duels in a console chat until stdin closes or `cancel` fires.
///
/// On end of input, live duels are allowed to resolve. On cancellation they
/// are aborted.
///
/// # Errors
///
/// Returns a config error if the configuration is invalid, an I/O error if
/// stdin or the events file fails, or a chat error if stdout is closed.
pub async fn run(args: &PlayArgs, cancel: CancellationToken) -> Result<(), QuickdrawError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        info!(port, "Prometheus metrics endpoint started");
    }

    let config = if let Some(ref path) = args.config {
        info!(config = %path.display(), "loading configuration");
        load_config(path)?
    } else {
        default_config()?
    };

    let events = match args.events_file {
        Some(ref path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    let registry =
        SessionRegistry::with_parts(config, Arc::new(RandomGrace), Arc::new(events));
    let gateway = Arc::new(ConsoleGateway::stdout(EndpointId::new(args.endpoint.clone())));
    let console = ConsoleChat::new(registry, gateway, ChatId(args.chat));

    info!(chat = args.chat, endpoint = %args.endpoint, "console chat ready");
    serve(&console, BufReader::new(tokio::io::stdin()), cancel).await
}

/// Feeds `input` line by line into `console`.
///
/// # Errors
///
/// Returns an I/O error if reading fails, or a chat error if a reply
/// cannot be written.
pub async fn serve<R>(
    console: &ConsoleChat,
    input: R,
    cancel: CancellationToken,
) -> Result<(), QuickdrawError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("cancelled, aborting live duels");
                console.registry().shutdown().await;
                return Ok(());
            }
            line = lines.next_line() => match line? {
                Some(line) => console.handle_line(&line).await?,
                None => break,
            },
        }
    }

    debug!("end of input");
    tokio::select! {
        () = cancel.cancelled() => console.registry().shutdown().await,
        () = console.registry().drain() => {}
    }
    Ok(())
}
