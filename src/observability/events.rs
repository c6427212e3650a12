//! Structured duel event stream.
//!
//! Discrete, typed events emitted over a session's lifetime, serialized as
//! newline-delimited JSON (JSONL) with a monotonically increasing sequence
//! number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chat::{ChatId, EndpointId, UserId};
use crate::duel::DuelOutcome;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during duel operation.
///
/// Each variant is tagged with `"type"` when serialized to JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A challenge was registered.
    DuelCreated {
        /// When the session was created.
        timestamp: DateTime<Utc>,
        /// Session identifier.
        session_id: String,
        /// Endpoint the session runs on.
        endpoint: EndpointId,
        /// Chat context.
        chat: ChatId,
        /// Challenging participant.
        challenger: UserId,
        /// Challenged participant.
        challenged: UserId,
    },

    /// The challenge was accepted.
    DuelAccepted {
        /// When the acceptance arrived.
        timestamp: DateTime<Utc>,
        /// Session identifier.
        session_id: String,
        /// Chat context.
        chat: ChatId,
    },

    /// The grace period started.
    GraceStarted {
        /// When the grace period started.
        timestamp: DateTime<Utc>,
        /// Session identifier.
        session_id: String,
        /// Chat context.
        chat: ChatId,
        /// Chosen grace length in protocol units.
        grace_units: u64,
    },

    /// The session finished.
    DuelResolved {
        /// When the session finished.
        timestamp: DateTime<Utc>,
        /// Session identifier.
        session_id: String,
        /// Chat context.
        chat: ChatId,
        /// How it ended.
        outcome: DuelOutcome,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization or I/O failures are silently dropped: a broken event sink
/// must never stall a duel.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::noop()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
