//! In-memory chat gateway.
//!
//! Records every notice and restriction in order. Restriction failures and
//! restriction latency can be injected to exercise the session's fault path
//! and its concurrent restrictions.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{ChatGateway, ChatId, EndpointId, Notice, UserId};
use crate::error::ChatError;

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// A notice was sent.
    Notice(ChatId, Notice),
    /// A restriction was applied.
    Restrict(ChatId, UserId, Duration),
}

/// Gateway that keeps everything it is asked to do in memory.
#[derive(Debug)]
pub struct MemoryGateway {
    endpoint: EndpointId,
    transcript: Mutex<Vec<Transcript>>,
    fail_restrictions: AtomicBool,
    restrict_latency: Mutex<Duration>,
}

impl MemoryGateway {
    /// Creates an empty gateway for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: EndpointId::new(endpoint),
            transcript: Mutex::new(Vec::new()),
            fail_restrictions: AtomicBool::new(false),
            restrict_latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Makes every subsequent `restrict` call fail.
    pub fn fail_restrictions(&self, fail: bool) {
        self.fail_restrictions.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `restrict` call take `latency` before it is
    /// recorded.
    pub fn set_restrict_latency(&self, latency: Duration) {
        if let Ok(mut l) = self.restrict_latency.lock() {
            *l = latency;
        }
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn transcript(&self) -> Vec<Transcript> {
        self.transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Returns the notices sent so far.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.transcript()
            .into_iter()
            .filter_map(|t| match t {
                Transcript::Notice(_, n) => Some(n),
                Transcript::Restrict(..) => None,
            })
            .collect()
    }

    /// Returns `(user, duration)` for each restriction applied so far.
    #[must_use]
    pub fn restrictions(&self) -> Vec<(UserId, Duration)> {
        self.transcript()
            .into_iter()
            .filter_map(|t| match t {
                Transcript::Restrict(_, user, d) => Some((user, d)),
                Transcript::Notice(..) => None,
            })
            .collect()
    }

    fn record(&self, entry: Transcript) {
        if let Ok(mut t) = self.transcript.lock() {
            t.push(entry);
        }
    }
}

#[async_trait::async_trait]
impl ChatGateway for MemoryGateway {
    fn endpoint(&self) -> EndpointId {
        self.endpoint.clone()
    }

    async fn notify(&self, chat: ChatId, notice: &Notice) -> Result<(), ChatError> {
        self.record(Transcript::Notice(chat, notice.clone()));
        Ok(())
    }

    async fn restrict(
        &self,
        chat: ChatId,
        user: UserId,
        duration: Duration,
    ) -> Result<(), ChatError> {
        if self.fail_restrictions.load(Ordering::SeqCst) {
            return Err(ChatError::RestrictFailed {
                chat: chat.0,
                user: user.0,
                reason: "restrictions disabled".to_string(),
            });
        }
        let latency = self
            .restrict_latency
            .lock()
            .map(|l| *l)
            .unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.record(Transcript::Restrict(chat, user, duration));
        Ok(())
    }
}
