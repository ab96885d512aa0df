//! Crate Test Suites
//!
//! Unit tests live beside their modules. This tree holds the shared mocks
//! and fixtures, end-to-end pipeline runs, and property tests.

pub mod common;

mod integration;
mod property;
