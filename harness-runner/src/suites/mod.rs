//! Built-in scenario suites.
//!
//! Each suite registers its scenarios through [`Registrar`]; the bootstrap
//! calls them in the order [`default_suites`] returns.

use harness_core::error::HarnessError;
use harness_core::scenario::Registrar;

pub mod conductor;
pub mod transport;

/// Registration function of a suite.
pub type RegisterFn = fn(&mut dyn Registrar) -> Result<(), HarnessError>;

/// A named group of scenarios.
#[derive(Clone, Copy)]
pub struct Suite {
    pub name: &'static str,
    pub register: RegisterFn,
}

impl Suite {
    pub const fn new(name: &'static str, register: RegisterFn) -> Self {
        Self { name, register }
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Suites registered by a default run, in registration order.
pub fn default_suites() -> Vec<Suite> {
    vec![
        Suite::new("transport", transport::register),
        Suite::new("conductor", conductor::register),
    ]
}
