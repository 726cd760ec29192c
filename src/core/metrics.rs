use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

pub(crate) const VIOLATIONS_TOTAL: &str = "proctor_violations_total";
pub(crate) const STATE_TRANSITIONS_TOTAL: &str = "proctor_state_transitions_total";
pub(crate) const SUBMISSIONS_TOTAL: &str = "proctor_submissions_total";
pub(crate) const SUBMISSION_LATENCY_SECONDS: &str = "proctor_submission_latency_seconds";

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder when enabled in settings.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe_proctor_metrics();
    Ok(())
}

fn describe_proctor_metrics() {
    describe_counter!(VIOLATIONS_TOTAL, "Proctoring violations recorded, by kind");
    describe_counter!(STATE_TRANSITIONS_TOTAL, "Session status transitions, by target status");
    describe_counter!(SUBMISSIONS_TOTAL, "Submission attempts, by mode and outcome");
    describe_histogram!(
        SUBMISSION_LATENCY_SECONDS,
        Unit::Seconds,
        "Time spent waiting for the exam backend to accept a submission"
    );
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proctor_metrics_render_with_help_text() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_proctor_metrics();
            metrics::counter!(VIOLATIONS_TOTAL, "kind" => "tabSwitch").increment(2);
            metrics::counter!(SUBMISSIONS_TOTAL, "mode" => "auto", "status" => "accepted")
                .increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("# HELP proctor_violations_total Proctoring violations recorded"));
        assert!(rendered.contains("proctor_violations_total{kind=\"tabSwitch\"} 2"));
        assert!(rendered.contains("# HELP proctor_submissions_total Submission attempts"));
    }
}
