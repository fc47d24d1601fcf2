//! Metric names.
//!
//! All metrics are emitted through the `metrics` facade; the harness installs
//! no exporter, so they are no-ops unless the embedding process installs a
//! recorder.
//!
//! # Naming
//!
//! - prefix: `harness_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)
//!
//! ```ignore
//! use harness_core::metrics::{LABEL_OUTCOME, SCENARIOS_FINISHED_TOTAL};
//!
//! metrics::counter!(SCENARIOS_FINISHED_TOTAL, LABEL_OUTCOME => "passed").increment(1);
//! ```

/// Outcome label key (passed, failed, timed_out, panicked)
pub const LABEL_OUTCOME: &str = "outcome";

/// Transport label key (memory, websocket, sim1h, sim2h)
pub const LABEL_TRANSPORT: &str = "transport";

// ─── Registry ──────────────────────────────────────────────────────

/// Scenarios registered for the current run (gauge)
pub const SCENARIOS_REGISTERED: &str = "harness_scenarios_registered";

// ─── Execution ─────────────────────────────────────────────────────

/// Finished scenarios (counter, labels: outcome, transport)
pub const SCENARIOS_FINISHED_TOTAL: &str = "harness_scenarios_finished_total";

/// Scenarios that passed their soft timeout (counter)
pub const SCENARIO_SOFT_TIMEOUTS_TOTAL: &str = "harness_scenario_soft_timeouts_total";

/// Scenario wall time (histogram, seconds)
pub const SCENARIO_DURATION_SECONDS: &str = "harness_scenario_duration_seconds";

/// Failed assertions across all scenarios (counter)
pub const ASSERTIONS_FAILED_TOTAL: &str = "harness_assertions_failed_total";

// ─── Conductors ────────────────────────────────────────────────────

/// Calls dispatched to memory conductors (counter)
pub const CONDUCTOR_CALLS_TOTAL: &str = "harness_conductor_calls_total";

/// Conductors spawned by sessions (counter)
pub const CONDUCTORS_SPAWNED_TOTAL: &str = "harness_conductors_spawned_total";

/// Register metric descriptions with the installed recorder.
///
/// Call after installing a recorder; harmless without one.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_gauge!(SCENARIOS_REGISTERED, "Scenarios registered for the run");
    describe_counter!(SCENARIOS_FINISHED_TOTAL, "Finished scenarios by outcome");
    describe_counter!(
        SCENARIO_SOFT_TIMEOUTS_TOTAL,
        "Scenarios still running at the soft timeout"
    );
    describe_histogram!(
        SCENARIO_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Scenario wall time"
    );
    describe_counter!(ASSERTIONS_FAILED_TOTAL, "Failed assertions");
    describe_counter!(CONDUCTOR_CALLS_TOTAL, "Calls dispatched to memory conductors");
    describe_counter!(CONDUCTORS_SPAWNED_TOTAL, "Conductors spawned by sessions");
}
