//! Transition validation for execution states.

use crate::error::ExecutionError;
use crate::record::ExecutionState;

/// Checks a state move against the execution lifecycle.
///
/// On rejection the error names both states, so callers can surface the
/// attempted move verbatim.
pub fn validate_execution_transition(
    from: ExecutionState,
    to: ExecutionState,
) -> Result<(), ExecutionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ExecutionError::invalid_transition(from, to))
    }
}
