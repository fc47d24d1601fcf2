//! Scenario harness runner library.
//!
//! Exposes the bootstrap and the built-in suites for integration testing.
//! In production, `harness-runner` is used as a binary (main.rs).

pub mod bootstrap;
pub mod cli;
pub mod logging;
pub mod suites;
