//! Ctrl-C handling and exit statuses for the headless runner.
//!
//! The first SIGINT/SIGTERM asks the runner to stop the core and print its
//! final telemetry. A second one exits immediately with status 130.

use std::sync::atomic::{AtomicU32, Ordering};

static SIGNALS: AtomicU32 = AtomicU32::new(0);

const FORCED_EXIT: i32 = 130;

/// How a headless run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ran until the time limit or a stop request.
    Completed,
    /// The ROM could not be found, loaded or started.
    Failed,
    /// Bad command line.
    Usage,
    /// The core stopped on an execution fault.
    Faulted,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Usage => 2,
            RunOutcome::Faulted => 3,
        }
    }
}

pub fn stop_requested() -> bool {
    SIGNALS.load(Ordering::SeqCst) > 0
}

/// Counts one stop request; returns true once the caller should exit hard.
fn record_signal() -> bool {
    SIGNALS.fetch_add(1, Ordering::SeqCst) >= 1
}

#[cfg(unix)]
pub fn install() {
    use std::os::raw::c_int;
    const SIGINT: c_int = 2;
    const SIGTERM: c_int = 15;

    extern "C" {
        fn signal(sig: c_int, handler: extern "C" fn(c_int)) -> usize;
        fn _exit(status: c_int) -> !;
    }

    extern "C" fn on_signal(_sig: c_int) {
        if record_signal() {
            // SAFETY: `_exit` is async-signal-safe.
            unsafe { _exit(FORCED_EXIT) }
        }
    }

    // SAFETY: the handler touches only an atomic and `_exit`.
    unsafe {
        signal(SIGINT, on_signal);
        signal(SIGTERM, on_signal);
    }
}

#[cfg(windows)]
pub fn install() {
    type HandlerRoutine = extern "system" fn(u32) -> i32;
    extern "system" {
        fn SetConsoleCtrlHandler(handler: Option<HandlerRoutine>, add: i32) -> i32;
    }
    extern "system" fn on_ctrl(_ctrl_type: u32) -> i32 {
        if record_signal() {
            std::process::exit(FORCED_EXIT);
        }
        1
    }
    // SAFETY: registers a handler that only counts requests.
    unsafe {
        SetConsoleCtrlHandler(Some(on_ctrl), 1);
    }
}

#[cfg(not(any(unix, windows)))]
pub fn install() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_signal_forces_exit() {
        assert!(!stop_requested());
        assert!(!record_signal());
        assert!(stop_requested());
        assert!(record_signal());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            RunOutcome::Completed,
            RunOutcome::Failed,
            RunOutcome::Usage,
            RunOutcome::Faulted,
        ]
        .map(RunOutcome::exit_code);
        assert_eq!(codes, [0, 1, 2, 3]);
    }
}
