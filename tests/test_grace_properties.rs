//! Property tests: how a shot is classified depends only on when it lands
//! relative to the grace period and the shot window.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use quickdraw::chat::{ChatGateway, ChatId, MemoryGateway, Notice, UserId};
use quickdraw::config::DuelConfig;
use quickdraw::duel::{
    DuelOutcome, FixedGrace, GraceDelay, IgnoreReason, RandomGrace, SessionRegistry,
    SignalOutcome,
};
use quickdraw::observability::EventEmitter;

const A: UserId = UserId(10);
const B: UserId = UserId(20);
const HALF_UNIT: Duration = Duration::from_millis(500);

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

async fn run_tasks() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Accepts a duel with a fixed grace period, then fires `shooter` at
/// `half_units` half-units after the rules were announced.
fn shoot_at(
    grace: u64,
    half_units: u64,
    shooter: UserId,
) -> (SignalOutcome, DuelOutcome, Vec<Notice>) {
    paused_runtime().block_on(async {
        let gw = Arc::new(MemoryGateway::new("bot"));
        let reg = SessionRegistry::with_parts(
            DuelConfig::default(),
            Arc::new(FixedGrace(grace)),
            Arc::new(EventEmitter::noop()),
        );
        let session = reg
            .create(Arc::clone(&gw) as Arc<dyn ChatGateway>, ChatId(1), A, B)
            .await
            .unwrap();
        session.accept();
        run_tasks().await;

        for _ in 0..half_units {
            tokio::time::advance(HALF_UNIT).await;
            run_tasks().await;
        }

        let signal = session.act(shooter);
        let outcome = session.finished().await;
        (signal, outcome, gw.notices())
    })
}

fn is_resolution(notice: &Notice) -> bool {
    !matches!(notice, Notice::Rules { .. } | Notice::Go)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn shot_is_classified_by_timing(
        grace in 5_u64..=60,
        extra in 0_u64..=72,
        shooter_is_a in any::<bool>(),
    ) {
        let shooter = if shooter_is_a { A } else { B };
        let other = if shooter_is_a { B } else { A };
        // Shots land on half units so they never tie with a deadline
        let whole = extra.min(grace + 12);
        let (signal, outcome, notices) = shoot_at(grace, 2 * whole + 1, shooter);

        if whole < grace {
            prop_assert_eq!(signal, SignalOutcome::Fouled);
            prop_assert_eq!(outcome, DuelOutcome::Foul { fouler: shooter, bystander: other });
            prop_assert!(!notices.contains(&Notice::Go));
        } else if whole < grace + 10 {
            prop_assert_eq!(signal, SignalOutcome::Fired);
            prop_assert_eq!(outcome, DuelOutcome::Win { winner: shooter, loser: other });
        } else {
            prop_assert_eq!(signal, SignalOutcome::Ignored(IgnoreReason::TimedOut));
            prop_assert_eq!(outcome, DuelOutcome::Stalemate);
        }

        prop_assert_eq!(notices.iter().filter(|n| is_resolution(n)).count(), 1);
    }

    #[test]
    fn random_grace_stays_within_bounds(min in 0_u64..1000, span in 0_u64..1000) {
        let max = min + span;
        let picked = RandomGrace.pick(min, max);
        prop_assert!((min..=max).contains(&picked));
    }
}
