/// genflow - Generation Flow State Machine
///
/// Phase-based controller for long-running, retryable generation tasks:
/// input validation, safety moderation with a crisis interrupt, generation
/// with backoff, and paced progressive reveal.

pub mod config;
pub mod core;

#[cfg(test)]
mod tests;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
