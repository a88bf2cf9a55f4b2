//! Step protocol for a brick run.
//!
//! The protocol is a fixed table of eight steps with forward edges plus a
//! single backward edge for the coverage retry. The table is pure data; an
//! illegal transition indicates a commissioner bug, never an operator error.

use crate::core::errors::TransitionError;

/// First step of every run.
pub const FIRST_STEP: u8 = 1;
/// Terminal step; once reached no further transitions are legal.
pub const LAST_STEP: u8 = 8;

/// Legal `(from, to)` step transitions.
///
/// Forward edges `n -> n+1` for `n` in 1..=7, plus `6 -> 5`: a coverage
/// shortfall sends the run back to test implementation exactly once.
const TRANSITIONS: &[(u8, u8)] = &[
    (1, 2),
    (2, 3),
    (3, 4),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (6, 5),
];

/// Human-readable name for a step.
pub fn step_name(step: u8) -> &'static str {
    match step {
        1 => "Enumerate Required Functions",
        2 => "Select One Function",
        3 => "Implement the Function",
        4 => "Define Test Coverage",
        5 => "Implement Tests",
        6 => "Confirm Coverage",
        7 => "Build Verification UI",
        8 => "Pause and Report",
        _ => "Unknown",
    }
}

/// Whether the step is terminal.
pub fn is_terminal(step: u8) -> bool {
    step == LAST_STEP
}

/// Validate a step transition against the protocol table.
pub fn validate_transition(current: u8, next: u8) -> Result<(), TransitionError> {
    if TRANSITIONS.contains(&(current, next)) {
        return Ok(());
    }
    Err(TransitionError { current, next })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every forward edge n -> n+1 for n in 1..=7 is legal.
    #[test]
    fn forward_transitions_are_legal() {
        for current in 1..=7u8 {
            validate_transition(current, current + 1).expect("forward edge");
        }
    }

    /// The coverage retry edge 6 -> 5 is the only legal backward edge.
    #[test]
    fn coverage_retry_edge_is_legal() {
        validate_transition(6, 5).expect("retry edge");
    }

    /// Every pair other than the forward edges and (6, 5) is rejected.
    #[test]
    fn all_other_pairs_are_rejected() {
        for current in 0..=9u8 {
            for next in 0..=9u8 {
                let forward = (1..=7).contains(&current) && next == current + 1;
                let retry = current == 6 && next == 5;
                let result = validate_transition(current, next);
                if forward || retry {
                    assert!(result.is_ok(), "expected ({current}, {next}) legal");
                } else {
                    let err = result.expect_err("expected illegal transition");
                    assert_eq!(err, TransitionError { current, next });
                }
            }
        }
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(step_name(1), "Enumerate Required Functions");
        assert_eq!(step_name(8), "Pause and Report");
        assert_eq!(step_name(9), "Unknown");
    }

    #[test]
    fn only_step_eight_is_terminal() {
        for step in 1..=7u8 {
            assert!(!is_terminal(step));
        }
        assert!(is_terminal(8));
    }
}
