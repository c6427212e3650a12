//! A single duel's state machine.
//!
//! Each [`DuelSession`] owns one lifecycle task that walks through
//! `AwaitingAcceptance -> Racing -> Finished`. The task races three
//! [`SignalSlot`]s against their deadlines:
//!
//! - `acceptance`: opened at construction, fulfilled by [`DuelSession::accept`]
//! - `early`: opened for the grace period, fulfilled by a premature
//!   [`DuelSession::act`] (the caller fouls)
//! - `timely`: opened after "go", fulfilled by the first
//!   [`DuelSession::act`] (the caller wins)
//!
//! Whatever path the lifecycle takes, it ends in a single `finish` that
//! cancels every slot, deregisters the session and publishes the outcome.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chat::{ChatGateway, ChatId, EndpointId, Notice, UserId};
use crate::config::DuelConfig;
use crate::error::DuelError;
use crate::observability::metrics;
use crate::observability::{Event, EventEmitter};

use super::delay::GraceDelay;
use super::outcome::{DuelOutcome, IgnoreReason, SignalOutcome};
use super::registry::{RegistryShared, SessionKey};
use super::slot::{SignalSlot, WaitOutcome};

// ============================================================================
// Stage
// ============================================================================

/// Lifecycle stage of a session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Waiting for the challenged participant to accept.
    AwaitingAcceptance = 0,
    /// Accepted; grace period or shot window in progress.
    Racing = 1,
    /// Resolved or abandoned.
    Finished = 2,
}

impl Stage {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AwaitingAcceptance,
            1 => Self::Racing,
            _ => Self::Finished,
        }
    }

    /// Snake-case name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingAcceptance => "awaiting_acceptance",
            Self::Racing => "racing",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Construction parameters
// ============================================================================

/// Everything a session needs from its creator.
pub(crate) struct SessionParams {
    pub config: Arc<DuelConfig>,
    pub gateway: Arc<dyn ChatGateway>,
    pub delay: Arc<dyn GraceDelay>,
    pub events: Arc<EventEmitter>,
    pub registry: Weak<RegistryShared>,
    pub chat: ChatId,
    pub challenger: UserId,
    pub challenged: UserId,
}

// ============================================================================
// DuelSession
// ============================================================================

/// One duel between two participants in one chat context.
pub struct DuelSession {
    id: Uuid,
    endpoint: EndpointId,
    chat: ChatId,
    challenger: UserId,
    challenged: UserId,

    stage: AtomicU8,
    timed_out: AtomicBool,
    accepted: AtomicBool,
    finished: AtomicBool,

    acceptance: SignalSlot<()>,
    early: SignalSlot<UserId>,
    timely: SignalSlot<UserId>,

    outcome: watch::Sender<Option<DuelOutcome>>,

    config: Arc<DuelConfig>,
    gateway: Arc<dyn ChatGateway>,
    delay: Arc<dyn GraceDelay>,
    events: Arc<EventEmitter>,
    registry: Weak<RegistryShared>,
}

impl DuelSession {
    /// Builds a session whose acceptance window is already open.
    ///
    /// The lifecycle does not run until [`start`](Self::start) is called.
    pub(crate) fn new(params: SessionParams) -> Arc<Self> {
        let SessionParams {
            config,
            gateway,
            delay,
            events,
            registry,
            chat,
            challenger,
            challenged,
        } = params;

        let acceptance = SignalSlot::new("acceptance");
        // Open before anyone can see the session, so an immediate accept lands.
        acceptance.open();
        let (outcome, _) = watch::channel(None);

        Arc::new(Self {
            id: Uuid::new_v4(),
            endpoint: gateway.endpoint(),
            chat,
            challenger,
            challenged,
            stage: AtomicU8::new(Stage::AwaitingAcceptance as u8),
            timed_out: AtomicBool::new(false),
            accepted: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            acceptance,
            early: SignalSlot::new("early"),
            timely: SignalSlot::new("timely"),
            outcome,
            config,
            gateway,
            delay,
            events,
            registry,
        })
    }

    /// Spawns the lifecycle task.
    pub(crate) fn start(self: &Arc<Self>) {
        info!(
            session_id = %self.id,
            endpoint = %self.endpoint,
            chat = %self.chat,
            challenger = %self.challenger,
            challenged = %self.challenged,
            "duel created"
        );
        self.events.emit(Event::DuelCreated {
            timestamp: Utc::now(),
            session_id: self.id.to_string(),
            endpoint: self.endpoint.clone(),
            chat: self.chat,
            challenger: self.challenger,
            challenged: self.challenged,
        });

        let session = Arc::clone(self);
        tokio::spawn(async move { session.run().await });
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Random identifier used in logs and events.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Endpoint the session runs on.
    #[must_use]
    pub const fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Chat context the session runs in.
    #[must_use]
    pub const fn chat(&self) -> ChatId {
        self.chat
    }

    /// The participant who issued the challenge.
    #[must_use]
    pub const fn challenger(&self) -> UserId {
        self.challenger
    }

    /// The participant who was challenged.
    #[must_use]
    pub const fn challenged(&self) -> UserId {
        self.challenged
    }

    /// `(challenger, challenged)`.
    #[must_use]
    pub const fn participants(&self) -> (UserId, UserId) {
        (self.challenger, self.challenged)
    }

    /// Whether `user` is one of the two participants.
    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        user == self.challenger || user == self.challenged
    }

    /// Registry key of this session.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.endpoint.clone(), self.chat)
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::SeqCst))
    }

    /// Whether a timeout path has been taken.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Whether the challenge was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::SeqCst)
    }

    /// The outcome, once the session has finished.
    #[must_use]
    pub fn outcome(&self) -> Option<DuelOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits until the session has finished and returns its outcome.
    ///
    /// Returns immediately for a session that already finished.
    pub async fn finished(&self) -> DuelOutcome {
        let mut rx = self.outcome.subscribe();
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone())
            .unwrap_or(DuelOutcome::Abandoned)
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    /// Delivers the challenged participant's acceptance.
    ///
    /// Only the first call while the acceptance window is open has any
    /// effect. Who is allowed to accept is the caller's decision.
    pub fn accept(&self) -> SignalOutcome {
        if let Some(reason) = self.ignore_reason() {
            debug!(session_id = %self.id, ?reason, "accept ignored");
            return SignalOutcome::Ignored(reason);
        }
        if self.acceptance.fulfill(()) {
            self.accepted.store(true, Ordering::SeqCst);
            info!(session_id = %self.id, chat = %self.chat, "duel accepted");
            SignalOutcome::Accepted
        } else {
            debug!(session_id = %self.id, "accept ignored: window not open");
            SignalOutcome::Ignored(IgnoreReason::NotOpen)
        }
    }

    /// Delivers a shot from `user`.
    ///
    /// During the grace period the shot is a foul; after "go" the first shot
    /// wins. Outside both windows, or from a non-participant, it does nothing.
    pub fn act(&self, user: UserId) -> SignalOutcome {
        if let Some(reason) = self.ignore_reason() {
            debug!(session_id = %self.id, %user, ?reason, "shot ignored");
            return SignalOutcome::Ignored(reason);
        }
        if !self.is_participant(user) {
            debug!(session_id = %self.id, %user, "shot ignored: not a participant");
            return SignalOutcome::Ignored(IgnoreReason::NotParticipant);
        }

        if self.early.fulfill(user) {
            self.advance(Stage::Finished);
            info!(session_id = %self.id, chat = %self.chat, %user, "fired before go");
            return SignalOutcome::Fouled;
        }
        if self.timely.fulfill(user) {
            self.advance(Stage::Finished);
            info!(session_id = %self.id, chat = %self.chat, %user, "fired after go");
            return SignalOutcome::Fired;
        }

        debug!(session_id = %self.id, %user, stage = %self.stage(), "shot ignored: no window open");
        SignalOutcome::Ignored(IgnoreReason::NotOpen)
    }

    /// Cancels every pending wait. The session finishes as
    /// [`DuelOutcome::Abandoned`] without restricting anyone, unless it had
    /// already resolved.
    pub fn abort(&self) {
        let acceptance = self.acceptance.cancel();
        let early = self.early.cancel();
        let timely = self.timely.cancel();
        debug!(session_id = %self.id, acceptance, early, timely, "abort requested");
    }

    fn ignore_reason(&self) -> Option<IgnoreReason> {
        if self.is_timed_out() {
            Some(IgnoreReason::TimedOut)
        } else if self.stage() == Stage::Finished {
            Some(IgnoreReason::Finished)
        } else {
            None
        }
    }

    fn advance(&self, stage: Stage) {
        let previous = Stage::from_u8(self.stage.fetch_max(stage as u8, Ordering::SeqCst));
        if previous < stage {
            debug!(session_id = %self.id, from = %previous, to = %stage, "stage advanced");
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    async fn run(self: Arc<Self>) {
        let outcome = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.fault(&e),
            Err(payload) => self.fault(&DuelError::Panicked(panic_message(payload.as_ref()))),
        };
        self.finish(outcome).await;
    }

    fn fault(&self, e: &DuelError) -> DuelOutcome {
        error!(
            session_id = %self.id,
            chat = %self.chat,
            stage = %self.stage(),
            error = %e,
            "duel lifecycle failed"
        );
        DuelOutcome::Faulted {
            reason: e.to_string(),
        }
    }

    async fn drive(&self) -> Result<DuelOutcome, DuelError> {
        match self.acceptance.wait(self.config.accept_duration()).await {
            WaitOutcome::Fulfilled(()) => {}
            WaitOutcome::TimedOut => return self.resolve_no_acceptance().await,
            WaitOutcome::Cancelled => return Ok(DuelOutcome::Abandoned),
        }

        self.advance(Stage::Racing);
        self.events.emit(Event::DuelAccepted {
            timestamp: Utc::now(),
            session_id: self.id.to_string(),
            chat: self.chat,
        });

        let grace = self.config.grace;
        let units = self.delay.pick(grace.min, grace.max);
        metrics::record_grace_units(units);
        self.events.emit(Event::GraceStarted {
            timestamp: Utc::now(),
            session_id: self.id.to_string(),
            chat: self.chat,
            grace_units: units,
        });
        debug!(session_id = %self.id, grace_units = units, "grace period started");

        // Shots fired while the rules are still being announced are fouls.
        if !self.early.open() {
            return Ok(DuelOutcome::Abandoned);
        }
        self.gateway
            .notify(
                self.chat,
                &Notice::Rules {
                    nickname: self.config.nickname.clone(),
                    max_grace: self.config.units(grace.max),
                },
            )
            .await?;

        match self.early.wait(self.config.units(units)).await {
            WaitOutcome::Fulfilled(fouler) => return self.resolve_foul(fouler).await,
            WaitOutcome::TimedOut => {}
            WaitOutcome::Cancelled => return Ok(DuelOutcome::Abandoned),
        }

        self.gateway.notify(self.chat, &Notice::Go).await?;
        if !self.timely.open() {
            return Ok(DuelOutcome::Abandoned);
        }

        match self.timely.wait(self.config.shot_duration()).await {
            WaitOutcome::Fulfilled(winner) => self.resolve_win(winner).await,
            WaitOutcome::TimedOut => self.resolve_stalemate().await,
            WaitOutcome::Cancelled => Ok(DuelOutcome::Abandoned),
        }
    }

    async fn resolve_no_acceptance(&self) -> Result<DuelOutcome, DuelError> {
        self.timed_out.store(true, Ordering::SeqCst);
        let penalty = self.config.penalties.no_response;
        info!(session_id = %self.id, chat = %self.chat, "challenge not accepted");

        self.gateway
            .notify(
                self.chat,
                &Notice::NoAcceptance {
                    window: self.config.accept_duration(),
                    penalty,
                },
            )
            .await?;
        self.restrict_both(penalty).await?;
        Ok(DuelOutcome::NoAcceptance)
    }

    async fn resolve_foul(&self, fouler: UserId) -> Result<DuelOutcome, DuelError> {
        let bystander = self.opponent_of(fouler);
        let penalties = self.config.penalties;

        self.gateway
            .notify(
                self.chat,
                &Notice::Foul {
                    fouler,
                    fouler_penalty: penalties.foul,
                    bystander_penalty: penalties.foul_bystander,
                },
            )
            .await?;
        self.restrict(fouler, penalties.foul).await?;
        self.restrict(bystander, penalties.foul_bystander).await?;
        Ok(DuelOutcome::Foul { fouler, bystander })
    }

    async fn resolve_win(&self, winner: UserId) -> Result<DuelOutcome, DuelError> {
        let loser = self.opponent_of(winner);
        let penalty = self.config.penalties.loser;

        self.gateway
            .notify(
                self.chat,
                &Notice::Winner {
                    winner,
                    loser_penalty: penalty,
                },
            )
            .await?;
        self.restrict(loser, penalty).await?;
        Ok(DuelOutcome::Win { winner, loser })
    }

    async fn resolve_stalemate(&self) -> Result<DuelOutcome, DuelError> {
        self.timed_out.store(true, Ordering::SeqCst);
        let penalty = self.config.penalties.stalemate;
        info!(session_id = %self.id, chat = %self.chat, "nobody fired");

        self.gateway
            .notify(
                self.chat,
                &Notice::NoShot {
                    window: self.config.shot_duration(),
                    penalty,
                },
            )
            .await?;
        if let Some(penalty) = penalty {
            self.restrict_both(penalty).await?;
        }
        Ok(DuelOutcome::Stalemate)
    }

    const fn opponent_of(&self, user: UserId) -> UserId {
        if user.0 == self.challenger.0 {
            self.challenged
        } else {
            self.challenger
        }
    }

    async fn restrict(&self, user: UserId, duration: Duration) -> Result<(), DuelError> {
        debug!(session_id = %self.id, chat = %self.chat, %user, ?duration, "restricting");
        self.gateway.restrict(self.chat, user, duration).await?;
        metrics::record_restriction();
        Ok(())
    }

    /// Restricts both participants concurrently and waits for both calls.
    async fn restrict_both(&self, duration: Duration) -> Result<(), DuelError> {
        let (first, second) = tokio::join!(
            self.restrict(self.challenger, duration),
            self.restrict(self.challenged, duration)
        );
        first.and(second)
    }

    /// Terminal cleanup. Only the first call has any effect.
    pub(crate) async fn finish(&self, outcome: DuelOutcome) {
        if self.finished.swap(true, Ordering::SeqCst) {
            debug!(session_id = %self.id, "finish already ran");
            return;
        }

        self.acceptance.cancel();
        self.early.cancel();
        self.timely.cancel();
        self.advance(Stage::Finished);

        info!(
            session_id = %self.id,
            chat = %self.chat,
            outcome = outcome.label(),
            "duel finished"
        );
        metrics::record_duel_resolved(&outcome);
        self.events.emit(Event::DuelResolved {
            timestamp: Utc::now(),
            session_id: self.id.to_string(),
            chat: self.chat,
            outcome: outcome.clone(),
        });

        match self.registry.upgrade() {
            Some(registry) => {
                registry.remove(self).await;
            }
            None => warn!(session_id = %self.id, "registry dropped before session finished"),
        }

        self.outcome.send_replace(Some(outcome));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl fmt::Debug for DuelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuelSession")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("chat", &self.chat)
            .field("challenger", &self.challenger)
            .field("challenged", &self.challenged)
            .field("stage", &self.stage())
            .field("timed_out", &self.is_timed_out())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MemoryGateway;
    use crate::duel::delay::FixedGrace;
    use crate::error::ChatError;

    const A: UserId = UserId(10);
    const B: UserId = UserId(20);

    fn session_with(
        gateway: Arc<dyn ChatGateway>,
        grace: u64,
        events: Arc<EventEmitter>,
    ) -> Arc<DuelSession> {
        let session = DuelSession::new(SessionParams {
            config: Arc::new(DuelConfig::default()),
            gateway,
            delay: Arc::new(FixedGrace(grace)),
            events,
            registry: Weak::new(),
            chat: ChatId(1),
            challenger: A,
            challenged: B,
        });
        session.start();
        session
    }

    fn session(gateway: &Arc<MemoryGateway>, grace: u64) -> Arc<DuelSession> {
        let gateway: Arc<dyn ChatGateway> = Arc::clone(gateway) as Arc<dyn ChatGateway>;
        session_with(gateway, grace, Arc::new(EventEmitter::noop()))
    }

    /// Lets spawned tasks run up to their next timer.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn stage_round_trips_through_u8() {
        for stage in [Stage::AwaitingAcceptance, Stage::Racing, Stage::Finished] {
            assert_eq!(Stage::from_u8(stage as u8), stage);
        }
        assert!(Stage::AwaitingAcceptance < Stage::Racing);
        assert!(Stage::Racing < Stage::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_is_effective_once() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        assert_eq!(s.accept(), SignalOutcome::Accepted);
        assert_eq!(s.accept(), SignalOutcome::Ignored(IgnoreReason::NotOpen));
        assert!(s.is_accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn act_before_acceptance_is_ignored() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        assert_eq!(s.act(A), SignalOutcome::Ignored(IgnoreReason::NotOpen));
        assert_eq!(s.stage(), Stage::AwaitingAcceptance);
    }

    #[tokio::test(start_paused = true)]
    async fn win_path() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        s.accept();
        settle().await;
        assert_eq!(s.stage(), Stage::Racing);

        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(gw.notices().last(), Some(&Notice::Go));

        assert_eq!(s.act(B), SignalOutcome::Fired);
        assert_eq!(
            s.finished().await,
            DuelOutcome::Win {
                winner: B,
                loser: A
            }
        );
        assert_eq!(gw.restrictions(), vec![(A, Duration::from_secs(180))]);
        assert_eq!(s.stage(), Stage::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn foul_path_restricts_sequentially() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        s.accept();
        settle().await;
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(s.act(A), SignalOutcome::Fouled);
        assert_eq!(s.act(B), SignalOutcome::Ignored(IgnoreReason::Finished));
        assert_eq!(
            s.finished().await,
            DuelOutcome::Foul {
                fouler: A,
                bystander: B
            }
        );
        assert_eq!(
            gw.restrictions(),
            vec![(A, Duration::from_secs(600)), (B, Duration::from_secs(60))]
        );
        assert!(!gw.notices().contains(&Notice::Go));
    }

    #[tokio::test(start_paused = true)]
    async fn no_acceptance_restricts_both() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        assert_eq!(s.finished().await, DuelOutcome::NoAcceptance);
        assert!(s.is_timed_out());
        let mut restricted = gw.restrictions();
        restricted.sort();
        assert_eq!(
            restricted,
            vec![(A, Duration::from_secs(300)), (B, Duration::from_secs(300))]
        );
        assert_eq!(s.accept(), SignalOutcome::Ignored(IgnoreReason::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn stalemate_restricts_both_concurrently() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        gw.set_restrict_latency(Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let s = session(&gw, 5);

        s.accept();
        assert_eq!(s.finished().await, DuelOutcome::Stalemate);
        // grace 5s + shot window 10s + one restriction latency
        assert_eq!(started.elapsed(), Duration::from_secs(16));
        let mut restricted = gw.restrictions();
        restricted.sort();
        assert_eq!(
            restricted,
            vec![(A, Duration::from_secs(300)), (B, Duration::from_secs(300))]
        );
        assert!(matches!(
            gw.notices().last(),
            Some(Notice::NoShot {
                penalty: Some(p),
                ..
            }) if *p == Duration::from_secs(300)
        ));
        assert_eq!(s.act(A), SignalOutcome::Ignored(IgnoreReason::TimedOut));
    }

    #[test]
    fn only_applied_restrictions_are_counted() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                let gw = Arc::new(MemoryGateway::new("bot"));
                gw.fail_restrictions(true);
                let outcome = session(&gw, 20).finished().await;
                assert!(matches!(outcome, DuelOutcome::Faulted { .. }), "{outcome:?}");
            });
        });
        assert!(
            !handle.render().contains("quickdraw_restrictions_total"),
            "{}",
            handle.render()
        );

        ::metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                let gw = Arc::new(MemoryGateway::new("bot"));
                let outcome = session(&gw, 20).finished().await;
                assert_eq!(outcome, DuelOutcome::NoAcceptance);
            });
        });
        assert!(
            handle.render().contains("quickdraw_restrictions_total 2"),
            "{}",
            handle.render()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_participant_cannot_shoot() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        s.accept();
        settle().await;
        assert_eq!(
            s.act(UserId(99)),
            SignalOutcome::Ignored(IgnoreReason::NotParticipant)
        );
        s.abort();
        assert_eq!(s.finished().await, DuelOutcome::Abandoned);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_before_acceptance_restricts_nobody() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let s = session(&gw, 20);

        s.abort();
        assert_eq!(s.finished().await, DuelOutcome::Abandoned);
        assert!(gw.transcript().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restriction_failure_faults_and_finishes() {
        let gw = Arc::new(MemoryGateway::new("bot"));
        gw.fail_restrictions(true);
        let s = session(&gw, 20);

        let outcome = s.finished().await;
        assert!(matches!(outcome, DuelOutcome::Faulted { .. }), "{outcome:?}");
        assert_eq!(s.stage(), Stage::Finished);
    }

    #[derive(Debug)]
    struct PanickingGateway;

    #[async_trait::async_trait]
    impl ChatGateway for PanickingGateway {
        fn endpoint(&self) -> EndpointId {
            EndpointId::new("panic")
        }

        async fn notify(&self, _chat: ChatId, _notice: &Notice) -> Result<(), ChatError> {
            panic!("gateway exploded");
        }

        async fn restrict(
            &self,
            _chat: ChatId,
            _user: UserId,
            _duration: Duration,
        ) -> Result<(), ChatError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panic_in_lifecycle_is_caught() {
        let s = session_with(
            Arc::new(PanickingGateway),
            20,
            Arc::new(EventEmitter::noop()),
        );
        s.accept();

        match s.finished().await {
            DuelOutcome::Faulted { reason } => assert!(reason.contains("gateway exploded")),
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finish_runs_once() {
        let events = Arc::new(EventEmitter::noop());
        let gw: Arc<dyn ChatGateway> = Arc::new(MemoryGateway::new("bot"));
        let s = session_with(gw, 20, Arc::clone(&events));

        s.abort();
        assert_eq!(s.finished().await, DuelOutcome::Abandoned);
        // created + resolved
        assert_eq!(events.event_count(), 2);

        s.finish(DuelOutcome::Stalemate).await;
        assert_eq!(events.event_count(), 2);
        assert_eq!(s.outcome(), Some(DuelOutcome::Abandoned));
    }
}
