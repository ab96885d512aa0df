//! End-to-end pipeline runs against the hand-written mocks.

mod pipeline_integration;
