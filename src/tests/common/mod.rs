//! Common Test Utilities
//!
//! Pipeline builders and phase-waiting helpers shared across test modules.

pub mod fixtures;

pub use fixtures::*;
