//! Property-based tests for the phase machine
//!
//! Tests invariants:
//! - Terminal phases absorb every event
//! - Attempt numbers stay within 1..=max_attempts
//! - Revealed count never exceeds the total
//! - Rejected events leave the phase unchanged

use proptest::prelude::*;
use std::time::Duration;

use crate::core::flow::{
    CrisisSupport, GenerationError, GenerationOutput, OperationalError, PhaseEvent, PhaseMachine,
    PhaseState, PolicyError, ValidationError,
};

fn arb_event() -> impl Strategy<Value = PhaseEvent> {
    prop_oneof![
        Just(PhaseEvent::Start),
        Just(PhaseEvent::ValidationPassed),
        Just(PhaseEvent::ValidationFailed(ValidationError::Empty)),
        Just(PhaseEvent::InputCleared),
        Just(PhaseEvent::CrisisDetected(CrisisSupport::standard())),
        Just(PhaseEvent::PolicyViolation(PolicyError::PolicyRefused {
            reason: "violence".to_string()
        })),
        Just(PhaseEvent::GenerationSucceeded),
        Just(PhaseEvent::TransientFailure(GenerationError::timeout())),
        Just(PhaseEvent::PermanentFailure(GenerationError::permanent("bad request"))),
        Just(PhaseEvent::OperationalFailure(OperationalError::TimedOut {
            after: Duration::from_secs(120)
        })),
        (0usize..6).prop_map(|total_units| PhaseEvent::OutputCleared { total_units }),
        Just(PhaseEvent::RevealAdvanced),
        Just(PhaseEvent::RevealSkipped),
        Just(PhaseEvent::RevealFinished(GenerationOutput::new("Amen."))),
        Just(PhaseEvent::Dismiss),
        Just(PhaseEvent::Cancel),
    ]
}

proptest! {
    #[test]
    fn phases_respect_bounds(
        max_attempts in 1u32..5,
        events in prop::collection::vec(arb_event(), 0..60),
    ) {
        let mut machine = PhaseMachine::new(max_attempts);
        let mut settled: Option<PhaseState> = None;

        for event in events {
            let before = machine.state().clone();
            let accepted = machine.apply(event).is_ok();

            if let Some(terminal) = &settled {
                prop_assert!(!accepted);
                prop_assert_eq!(machine.state(), terminal);
                continue;
            }
            if !accepted {
                prop_assert_eq!(machine.state(), &before);
            }

            match machine.state() {
                PhaseState::Generating { attempt } => {
                    prop_assert!(*attempt >= 1 && *attempt <= max_attempts);
                }
                PhaseState::Revealing { revealed, total } => prop_assert!(revealed <= total),
                state if state.is_terminal() => settled = Some(state.clone()),
                _ => {}
            }
        }

        prop_assert_eq!(machine.history().last(), Some(machine.state()));
    }
}
