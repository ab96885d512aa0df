//! Property-based tests for the generation flow
//!
//! Property tests verify invariants that hold for all inputs rather than
//! for hand-picked cases.
//!
//! ## Running Property Tests
//!
//! ```sh
//! cargo test property --release
//! ```
//!
//! ## Test Modules
//!
//! - `retry_policy_props`: backoff schedule
//!   - Delay for attempt k is base * 2^(k-1) when uncapped
//!   - Delays never decrease and never exceed the cap
//!   - Never retries at or beyond max attempts, never retries permanent errors
//!
//! - `input_validator_props`: length bounds
//!   - Accepts exactly the inputs whose trimmed length is within bounds
//!   - Whitespace-only input is always Empty
//!
//! - `reveal_props`: segmentation and scheduling
//!   - Units concatenate back to the source text
//!   - Indices are sequential from zero
//!   - Skipping to the end releases each unit exactly once
//!
//! - `phase_machine_props`: transitions
//!   - Terminal phases absorb every event
//!   - Attempt numbers stay within 1..=max_attempts
//!   - Revealed count never exceeds the total

mod input_validator_props;
mod phase_machine_props;
mod retry_policy_props;
mod reveal_props;
