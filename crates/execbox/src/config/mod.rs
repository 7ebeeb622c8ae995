//! Configuration for execution environments
//!
//! Environments are configured once at creation time and then overridden
//! per call. The type system keeps the two layers separate:
//! [`EnvironmentConfig`] holds the defaults an [`crate::Environment`] is
//! born with, [`ExecOptions`] holds the per-call overrides, and
//! [`EffectiveOptions`] is the merged view handed to engines and executors.

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::validate;
