//! Budget ceiling checks for a brick run.
//!
//! Each check compares a monotonic counter against its configured ceiling and
//! returns a [`BudgetExceededError`] naming the config key, so the halt report
//! can say exactly what to raise. Checks are pure; the orchestrator supplies
//! the current counters.

use crate::core::errors::BudgetExceededError;

/// Reject once elapsed wall time reaches `max_brick_wall_time_secs`.
pub fn check_wall_time(elapsed_secs: f64, max_secs: u64) -> Result<(), BudgetExceededError> {
    if elapsed_secs >= max_secs as f64 {
        return Err(BudgetExceededError {
            ceiling: "max_brick_wall_time_secs",
            configured: max_secs,
        });
    }
    Ok(())
}

/// Reject once the file-change counter has gone past `max_file_changes`.
pub fn check_file_changes(changed: u32, max: u32) -> Result<(), BudgetExceededError> {
    if changed > max {
        return Err(BudgetExceededError {
            ceiling: "max_file_changes",
            configured: max as u64,
        });
    }
    Ok(())
}

/// Reject when one more file write would go past `max_file_changes`.
///
/// Called before every write so a zero budget halts before the first write.
pub fn reserve_file_change(changed: u32, max: u32) -> Result<(), BudgetExceededError> {
    if changed.checked_add(1).is_none_or(|next| next > max) {
        return Err(BudgetExceededError {
            ceiling: "max_file_changes",
            configured: max as u64,
        });
    }
    Ok(())
}

/// Reject once `max_calls_per_brick` model calls have been attempted.
pub fn check_call_budget(made: u32, max: u32) -> Result<(), BudgetExceededError> {
    if made >= max {
        return Err(BudgetExceededError {
            ceiling: "max_calls_per_brick",
            configured: max as u64,
        });
    }
    Ok(())
}
