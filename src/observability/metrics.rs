//! Metrics collection and exposition.
//!
//! # Metrics
//! - `master_elected` (gauge): 1 while this master leads
//! - `master_frameworks` (gauge): registered frameworks
//! - `master_agents` (gauge): registered agents
//! - `master_outstanding_offers` (gauge): offers not yet accepted or declined
//! - `master_offers_total` (counter): offers by outcome (offered, accepted, declined)
//! - `master_leader_changes_total` (counter): leader updates reported by the detector
//!
//! Updates are no-ops until a recorder is installed.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder for the process.
///
/// Returns the rendering handle, or `None` if another recorder was already
/// installed.
pub fn init_recorder() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Metrics recorder not installed");
                None
            }
        })
        .clone()
}

pub fn set_leading(leading: bool) {
    ::metrics::gauge!("master_elected").set(if leading { 1.0 } else { 0.0 });
}

pub fn set_frameworks(count: usize) {
    ::metrics::gauge!("master_frameworks").set(count as f64);
}

pub fn set_agents(count: usize) {
    ::metrics::gauge!("master_agents").set(count as f64);
}

pub fn set_outstanding_offers(count: usize) {
    ::metrics::gauge!("master_outstanding_offers").set(count as f64);
}

pub fn record_offer_outcome(outcome: &'static str) {
    ::metrics::counter!("master_offers_total", "outcome" => outcome).increment(1);
}

pub fn record_leader_change() {
    ::metrics::counter!("master_leader_changes_total").increment(1);
}
