//! E2E test scenarios.

mod failure_isolation;
mod mixed_results;
mod transport_override;
