//! Process-wide store of live duel sessions.
//!
//! At most one session exists per `(endpoint, chat)` key. Every operation
//! holds the registry's single mutex for its whole critical section, so a
//! check-then-insert in [`SessionRegistry::create`] cannot interleave with
//! another creation or with a session removing itself.

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chat::{ChatGateway, ChatId, EndpointId, UserId};
use crate::config::DuelConfig;
use crate::observability::EventEmitter;
use crate::observability::metrics;

use super::delay::{GraceDelay, RandomGrace};
use super::session::{DuelSession, SessionParams};

/// Registry key: one live session per endpoint and chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Endpoint the session runs on
    pub endpoint: EndpointId,
    /// Chat context
    pub chat: ChatId,
}

impl SessionKey {
    /// Creates a new key.
    #[must_use]
    pub const fn new(endpoint: EndpointId, chat: ChatId) -> Self {
        Self { endpoint, chat }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.endpoint, self.chat)
    }
}

/// The part of the registry sessions hold a weak reference to.
#[derive(Debug, Default)]
pub(crate) struct RegistryShared {
    sessions: Mutex<IndexMap<SessionKey, Arc<DuelSession>>>,
}

impl RegistryShared {
    /// Removes `session` if it is the one registered under its key.
    pub(crate) async fn remove(&self, session: &DuelSession) -> bool {
        let key = session.key();
        let mut sessions = self.sessions.lock().await;

        let registered = sessions
            .get(&key)
            .is_some_and(|current| current.id() == session.id());
        if !registered {
            warn!(
                session_id = %session.id(),
                key = %key,
                "session not registered, nothing to remove"
            );
            return false;
        }

        sessions.shift_remove(&key);
        metrics::set_duels_active(sessions.len());
        debug!(session_id = %session.id(), key = %key, "session removed");
        true
    }
}

/// Owner of all live sessions.
///
/// Cloning is cheap and every clone sees the same sessions.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    shared: Arc<RegistryShared>,
    config: Arc<DuelConfig>,
    delay: Arc<dyn GraceDelay>,
    events: Arc<EventEmitter>,
}

impl SessionRegistry {
    /// Creates a registry with random grace periods and no event output.
    #[must_use]
    pub fn new(config: DuelConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(RandomGrace),
            Arc::new(EventEmitter::noop()),
        )
    }

    /// Creates a registry with explicit collaborators.
    #[must_use]
    pub fn with_parts(
        config: DuelConfig,
        delay: Arc<dyn GraceDelay>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared::default()),
            config: Arc::new(config),
            delay,
            events,
        }
    }

    /// The configuration every new session is created with.
    #[must_use]
    pub fn config(&self) -> &DuelConfig {
        &self.config
    }

    /// Creates and starts a session, unless the gateway's endpoint already
    /// has one in `chat`.
    ///
    /// Returns `None` for a duplicate; the existing session is untouched.
    pub async fn create(
        &self,
        gateway: Arc<dyn ChatGateway>,
        chat: ChatId,
        challenger: UserId,
        challenged: UserId,
    ) -> Option<Arc<DuelSession>> {
        let key = SessionKey::new(gateway.endpoint(), chat);
        let mut sessions = self.shared.sessions.lock().await;

        if sessions.contains_key(&key) {
            debug!(key = %key, %challenger, %challenged, "duel already running");
            metrics::record_duel_rejected();
            return None;
        }

        let session = DuelSession::new(SessionParams {
            config: Arc::clone(&self.config),
            gateway,
            delay: Arc::clone(&self.delay),
            events: Arc::clone(&self.events),
            registry: Arc::downgrade(&self.shared),
            chat,
            challenger,
            challenged,
        });
        sessions.insert(key, Arc::clone(&session));
        metrics::record_duel_created();
        metrics::set_duels_active(sessions.len());

        // Spawned while locked: the session cannot try to remove itself
        // before it is registered.
        session.start();
        Some(session)
    }

    /// Returns the live session for `(endpoint, chat)`, if any.
    pub async fn get(&self, endpoint: &EndpointId, chat: ChatId) -> Option<Arc<DuelSession>> {
        let key = SessionKey::new(endpoint.clone(), chat);
        self.shared.sessions.lock().await.get(&key).cloned()
    }

    /// Removes `session` if it is still the one registered under its key,
    /// then aborts it.
    ///
    /// A removed session can no longer be reached through [`get`], so it is
    /// never left running: it finishes as abandoned without restricting
    /// anyone. A session that is absent, or that was replaced by a newer
    /// one, keeps the registry untouched and a warning is logged.
    ///
    /// [`get`]: Self::get
    pub async fn remove(&self, session: &DuelSession) -> bool {
        let removed = self.shared.remove(session).await;
        session.abort();
        removed
    }

    /// Maps each chat with a live duel to its `(challenger, challenged)`.
    ///
    /// Sessions of different endpoints in the same chat collapse onto one
    /// entry; the most recently created wins.
    pub async fn list_active_participants(&self) -> IndexMap<ChatId, (UserId, UserId)> {
        self.shared
            .sessions
            .lock()
            .await
            .values()
            .map(|s| (s.chat(), s.participants()))
            .collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.shared.sessions.lock().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.shared.sessions.lock().await.is_empty()
    }

    /// Waits until every session live at the time of the call has finished
    /// on its own.
    pub async fn drain(&self) {
        let sessions = self.snapshot().await;
        if sessions.is_empty() {
            return;
        }

        info!(count = sessions.len(), "waiting for live duels to resolve");
        join_all(sessions.iter().map(|s| s.finished())).await;
    }

    /// Aborts every live session and waits until all of them have finished.
    pub async fn shutdown(&self) {
        let sessions = self.snapshot().await;
        if sessions.is_empty() {
            return;
        }

        info!(count = sessions.len(), "aborting live duels");
        for session in &sessions {
            session.abort();
        }
        join_all(sessions.iter().map(|s| s.finished())).await;
    }

    async fn snapshot(&self) -> Vec<Arc<DuelSession>> {
        self.shared.sessions.lock().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chat::MemoryGateway;
    use crate::duel::delay::FixedGrace;
    use crate::duel::outcome::DuelOutcome;

    const A: UserId = UserId(10);
    const B: UserId = UserId(20);

    fn registry() -> SessionRegistry {
        SessionRegistry::with_parts(
            DuelConfig::default(),
            Arc::new(FixedGrace(20)),
            Arc::new(EventEmitter::noop()),
        )
    }

    fn gateway(endpoint: &str) -> Arc<dyn ChatGateway> {
        Arc::new(MemoryGateway::new(endpoint))
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_duplicate_key() {
        let reg = registry();
        let gw = gateway("bot");

        let first = reg.create(Arc::clone(&gw), ChatId(1), A, B).await;
        assert!(first.is_some());
        assert!(reg.create(Arc::clone(&gw), ChatId(1), A, UserId(30)).await.is_none());
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_per_endpoint_and_chat() {
        let reg = registry();

        assert!(reg.create(gateway("bot"), ChatId(1), A, B).await.is_some());
        assert!(reg.create(gateway("bot"), ChatId(2), A, B).await.is_some());
        assert!(reg.create(gateway("other"), ChatId(1), A, B).await.is_some());
        assert_eq!(reg.len().await, 3);

        let found = reg.get(&EndpointId::new("other"), ChatId(1)).await;
        assert_eq!(found.map(|s| s.endpoint().clone()), Some(EndpointId::new("other")));
        assert!(reg.get(&EndpointId::new("bot"), ChatId(3)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_session_deregisters_itself() {
        let reg = registry();
        let s = reg.create(gateway("bot"), ChatId(1), A, B).await.unwrap();

        assert_eq!(s.finished().await, DuelOutcome::NoAcceptance);
        assert!(reg.is_empty().await);
        assert!(reg.create(gateway("bot"), ChatId(1), A, B).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_is_idempotent() {
        let reg = registry();
        let s = reg.create(gateway("bot"), ChatId(1), A, B).await.unwrap();

        assert!(reg.remove(&s).await);
        assert!(!reg.remove(&s).await);
        assert!(reg.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_session_does_not_evict_successor() {
        let reg = registry();
        let old = reg.create(gateway("bot"), ChatId(1), A, B).await.unwrap();
        reg.remove(&old).await;

        let new = reg.create(gateway("bot"), ChatId(1), A, B).await.unwrap();
        assert!(!reg.remove(&old).await);
        assert_eq!(
            reg.get(&EndpointId::new("bot"), ChatId(1)).await.map(|s| s.id()),
            Some(new.id())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removed_session_is_abandoned_not_left_running() {
        let reg = registry();
        let mem = Arc::new(MemoryGateway::new("bot"));
        let gw: Arc<dyn ChatGateway> = Arc::clone(&mem) as Arc<dyn ChatGateway>;

        let old = reg.create(Arc::clone(&gw), ChatId(1), A, B).await.unwrap();
        assert!(reg.remove(&old).await);
        let new = reg
            .create(Arc::clone(&gw), ChatId(1), UserId(30), UserId(40))
            .await
            .unwrap();

        assert_eq!(old.finished().await, DuelOutcome::Abandoned);
        assert_eq!(new.finished().await, DuelOutcome::NoAcceptance);

        let mut restricted: Vec<UserId> = mem.restrictions().into_iter().map(|(u, _)| u).collect();
        restricted.sort();
        assert_eq!(restricted, vec![UserId(30), UserId(40)]);
        assert!(reg.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn lists_participants_by_chat() {
        let reg = registry();
        reg.create(gateway("bot"), ChatId(1), A, B).await;
        reg.create(gateway("bot"), ChatId(2), UserId(30), UserId(40)).await;

        let active = reg.list_active_participants().await;
        assert_eq!(active.len(), 2);
        assert_eq!(active[&ChatId(1)], (A, B));
        assert_eq!(active[&ChatId(2)], (UserId(30), UserId(40)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_everything() {
        let reg = registry();
        let s1 = reg.create(gateway("bot"), ChatId(1), A, B).await.unwrap();
        let s2 = reg.create(gateway("bot"), ChatId(2), A, B).await.unwrap();
        s2.accept();
        tokio::time::sleep(Duration::from_secs(1)).await;

        reg.shutdown().await;

        assert!(reg.is_empty().await);
        assert_eq!(s1.outcome(), Some(DuelOutcome::Abandoned));
        assert_eq!(s2.outcome(), Some(DuelOutcome::Abandoned));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_natural_resolution() {
        let reg = registry();
        let s = reg.create(gateway("bot"), ChatId(1), A, B).await.unwrap();

        reg.drain().await;

        assert!(reg.is_empty().await);
        assert_eq!(s.outcome(), Some(DuelOutcome::NoAcceptance));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_create_registers_one_session() {
        let reg = registry();
        let gw = gateway("bot");

        let mut handles = vec![];
        for i in 0..32_i64 {
            let reg = reg.clone();
            let gw = Arc::clone(&gw);
            handles.push(tokio::spawn(async move {
                reg.create(gw, ChatId(1), UserId(i), UserId(100 + i)).await
            }));
        }

        let mut created = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(reg.len().await, 1);
        reg.shutdown().await;
    }
}
