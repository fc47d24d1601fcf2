//! E2E tests for harness-runner.
//!
//! These drive the full bootstrap (transport resolution, middleware, suites,
//! run) against the in-process conductor backend.
//!
//! # Test Structure
//!
//! - `helpers/` -- Shared test utilities (bootstrap builder, scenario factories)
//! - `scenarios/` -- Test files organized by behavior
//!
//! # Running
//!
//! ```bash
//! cargo test -p harness-runner --test e2e
//! ```

mod helpers;
mod scenarios;
