//! Process-wide tracing setup.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{Format, init};
