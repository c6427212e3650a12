//! Metrics collection for `quickdraw`.
//!
//! Prometheus-compatible duel metrics. Every recording function is a silent
//! no-op until [`init_metrics`] installs a recorder.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::duel::DuelOutcome;
use crate::error::QuickdrawError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `QuickdrawError::Io` if the recorder or HTTP listener
/// cannot be installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), QuickdrawError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| QuickdrawError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_counter!(
        "quickdraw_duels_created_total",
        "Duel sessions successfully created"
    );
    describe_counter!(
        "quickdraw_duels_rejected_total",
        "Duel creations rejected because the chat already had a duel"
    );
    describe_counter!(
        "quickdraw_duels_resolved_total",
        "Duel sessions finished, by outcome"
    );
    describe_gauge!("quickdraw_duels_active", "Duel sessions currently registered");
    describe_counter!(
        "quickdraw_restrictions_total",
        "Restrictions requested from the chat gateway"
    );
    describe_histogram!(
        "quickdraw_grace_period_units",
        "Randomly chosen grace period length in protocol units"
    );
}

/// Records a successful session creation.
pub fn record_duel_created() {
    counter!("quickdraw_duels_created_total").increment(1);
}

/// Records a creation rejected as a duplicate.
pub fn record_duel_rejected() {
    counter!("quickdraw_duels_rejected_total").increment(1);
}

/// Records a finished session.
pub fn record_duel_resolved(outcome: &DuelOutcome) {
    counter!("quickdraw_duels_resolved_total", "outcome" => outcome.label()).increment(1);
}

/// Sets the number of registered sessions.
#[allow(clippy::cast_precision_loss)]
pub fn set_duels_active(count: usize) {
    gauge!("quickdraw_duels_active").set(count as f64);
}

/// Records a restriction request.
pub fn record_restriction() {
    counter!("quickdraw_restrictions_total").increment(1);
}

/// Records the chosen grace period length.
#[allow(clippy::cast_precision_loss)]
pub fn record_grace_units(units: u64) {
    histogram!("quickdraw_grace_period_units").record(units as f64);
}
