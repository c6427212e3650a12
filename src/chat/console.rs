//! Console chat gateway.
//!
//! Writes NDJSON (newline-delimited JSON) lines for every announcement,
//! restriction and command reply. `quickdraw play` uses it on stdout; tests
//! hand it an in-memory pipe.

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ChatGateway, ChatId, EndpointId, Notice, UserId};
use crate::error::ChatError;

/// One line of console output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ConsoleLine<'a> {
    Notice { chat: ChatId, text: String },
    Restrict { chat: ChatId, user: UserId, seconds: u64 },
    Reply { chat: ChatId, text: &'a str },
}

/// NDJSON gateway over any async writer.
///
/// The writer sits behind a `tokio::sync::Mutex` because it is held across
/// `.await` points while a line is flushed.
pub struct ConsoleGateway {
    endpoint: EndpointId,
    writer: Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl ConsoleGateway {
    /// Creates a gateway writing to `writer`.
    #[must_use]
    pub fn new(endpoint: EndpointId, writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            endpoint,
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    /// Creates a gateway writing to the process stdout.
    #[must_use]
    pub fn stdout(endpoint: EndpointId) -> Self {
        Self::new(endpoint, Box::new(tokio::io::stdout()))
    }

    /// Writes a free-form reply from the command layer.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Io` if the line cannot be written.
    pub async fn reply(&self, chat: ChatId, text: &str) -> Result<(), ChatError> {
        self.write_line(&ConsoleLine::Reply { chat, text }).await
    }

    async fn write_line(&self, line: &ConsoleLine<'_>) -> Result<(), ChatError> {
        let mut buf = serde_json::to_string(line)
            .map_err(|e| ChatError::Io(std::io::Error::other(e.to_string())))?;
        buf.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(buf.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConsoleGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleGateway")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ChatGateway for ConsoleGateway {
    fn endpoint(&self) -> EndpointId {
        self.endpoint.clone()
    }

    async fn notify(&self, chat: ChatId, notice: &Notice) -> Result<(), ChatError> {
        debug!(%chat, ?notice, "console notice");
        self.write_line(&ConsoleLine::Notice {
            chat,
            text: notice.to_string(),
        })
        .await
    }

    async fn restrict(
        &self,
        chat: ChatId,
        user: UserId,
        duration: Duration,
    ) -> Result<(), ChatError> {
        self.write_line(&ConsoleLine::Restrict {
            chat,
            user,
            seconds: duration.as_secs(),
        })
        .await
    }
}
