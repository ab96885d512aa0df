//! Property-based tests for progressive reveal
//!
//! Tests invariants:
//! - Units concatenate back to the source text
//! - Indices are sequential from zero
//! - Delays are one of the two configured pauses
//! - Skipping to the end releases each unit exactly once

use proptest::prelude::*;
use std::time::Duration;

use crate::core::flow::reveal::segment;
use crate::core::flow::{CancellationToken, RevealConfig, RevealGranularity, RevealScheduler};

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z ,.!?\n]{0,200}"
}

fn arb_granularity() -> impl Strategy<Value = RevealGranularity> {
    prop_oneof![
        Just(RevealGranularity::Word),
        Just(RevealGranularity::Sentence),
        (1usize..8).prop_map(RevealGranularity::Chunk),
    ]
}

fn config(granularity: RevealGranularity) -> RevealConfig {
    RevealConfig {
        granularity,
        unit_delay: Duration::from_millis(80),
        pause_delay: Duration::from_millis(400),
    }
}

proptest! {
    #[test]
    fn units_reassemble_source(text in arb_text(), granularity in arb_granularity()) {
        let config = config(granularity);
        let units = segment(&text, &config);

        let joined: String = units.iter().map(|u| u.text.as_str()).collect();
        prop_assert_eq!(joined.as_str(), text.trim_start());

        for (i, unit) in units.iter().enumerate() {
            prop_assert_eq!(unit.index, i);
            prop_assert!(!unit.text.trim().is_empty());
            prop_assert!(unit.delay == config.unit_delay || unit.delay == config.pause_delay);
        }
    }

    #[test]
    fn skip_releases_each_unit_once(
        text in arb_text(),
        granularity in arb_granularity(),
        advance in 0usize..10,
    ) {
        let mut scheduler =
            RevealScheduler::from_text(&text, &config(granularity), CancellationToken::new());
        let total = scheduler.total();

        let mut released = Vec::new();
        for _ in 0..advance {
            if let Some(unit) = scheduler.advance() {
                released.push(unit.index);
            }
        }
        released.extend(scheduler.skip_to_end().iter().map(|u| u.index));

        prop_assert_eq!(released, (0..total).collect::<Vec<_>>());
        prop_assert!(scheduler.skip_to_end().is_empty());
        prop_assert!(scheduler.is_complete());
        prop_assert!(scheduler.advance().is_none());
    }
}
