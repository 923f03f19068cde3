//! Process termination for unrecoverable defects.
//!
//! Errors that indicate a programming bug (a broken invariant, a handler
//! failing in a way no caller can act on) must not be swallowed by the task
//! that observed them. They are escalated here, which normally exits the
//! process so a supervisor can restart it.
//!
//! Tests call [`disable_system_exit`] so that a termination is recorded and
//! can be asserted on instead of killing the test binary.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

static SYSTEM_EXIT_DISABLED: AtomicBool = AtomicBool::new(false);
static FIRST_EXIT: Mutex<Option<ExitRecord>> = Mutex::new(None);

/// A recorded termination request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    /// Requested exit status.
    pub status: i32,
    /// Message describing why the process was terminated.
    pub message: String,
}

/// Record terminations instead of exiting the process.
pub fn disable_system_exit() {
    SYSTEM_EXIT_DISABLED.store(true, Ordering::SeqCst);
}

/// Whether [`terminate`] has been called since the last clear.
pub fn is_terminated() -> bool {
    FIRST_EXIT.lock().is_some()
}

/// The first termination recorded since the last clear.
pub fn first_exit() -> Option<ExitRecord> {
    FIRST_EXIT.lock().clone()
}

/// Forget any recorded termination.
pub fn clear_first_exit() {
    *FIRST_EXIT.lock() = None;
}

/// Terminate the process with `status`.
///
/// When system exit is disabled the call is recorded (only the first one is
/// kept) and returns normally.
pub fn terminate(status: i32, message: impl Into<String>, cause: &dyn std::error::Error) {
    let message = message.into();
    tracing::error!(status, error = %cause, "{}", message);

    {
        let mut first = FIRST_EXIT.lock();
        if first.is_none() {
            *first = Some(ExitRecord {
                status,
                message: message.clone(),
            });
        }
    }

    if SYSTEM_EXIT_DISABLED.load(Ordering::SeqCst) {
        return;
    }
    std::process::exit(status);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_first_exit_when_disabled() {
        disable_system_exit();
        clear_first_exit();

        let cause = std::io::Error::other("boom");
        terminate(1, "worker failed", &cause);
        terminate(2, "second failure", &cause);

        let first = first_exit().expect("exit should be recorded");
        assert_eq!(first.status, 1);
        assert_eq!(first.message, "worker failed");
        assert!(is_terminated());

        clear_first_exit();
        assert!(!is_terminated());
    }
}
