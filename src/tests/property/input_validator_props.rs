//! Property-based tests for the input validator
//!
//! Tests invariants:
//! - Accepts exactly the inputs whose trimmed length is within bounds
//! - Whitespace-only input is always Empty
//! - Consistent results for same input

use proptest::prelude::*;

use crate::core::flow::{FlowInput, InputValidator, ValidationError};

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?'\u{e9}\u{fc}\u{4e2d}]{0,80}"
}

proptest! {
    #[test]
    fn accepts_iff_within_bounds(
        text in arb_text(),
        min_len in 1usize..10,
        extra in 0usize..60,
    ) {
        let validator = InputValidator::new(min_len, min_len + extra);
        let input = FlowInput::new(text.clone());
        let len = text.trim().chars().count();

        let result = validator.validate(&input);
        let within = len > 0 && len >= validator.min_len() && len <= validator.max_len();
        prop_assert_eq!(result.is_ok(), within);

        match result {
            Err(ValidationError::TooShort { actual, .. })
            | Err(ValidationError::TooLong { actual, .. }) => prop_assert_eq!(actual, len),
            _ => {}
        }
    }

    #[test]
    fn whitespace_is_empty(spaces in "[ \t\n\r]{0,20}") {
        prop_assert_eq!(
            InputValidator::default().validate(&FlowInput::new(spaces)),
            Err(ValidationError::Empty)
        );
    }

    #[test]
    fn validation_is_deterministic(text in arb_text()) {
        let validator = InputValidator::default();
        let input = FlowInput::new(text);
        prop_assert_eq!(validator.validate(&input), validator.validate(&input));
    }
}
