//! Close Context (spec §3): the terminal cause of a session, written once
//! by whichever path first detects a fatal condition, read by `Stop` to
//! shape the final `on-close` callback.

use parking_lot::Mutex;

use crate::error::Operation;

#[derive(Debug, Clone, Copy)]
struct Cause {
    fire: bool,
    operation: Operation,
    code: i32,
}

impl Default for Cause {
    fn default() -> Self {
        Self {
            fire: false,
            operation: Operation::Unknown,
            code: 0,
        }
    }
}

/// Thread-safe, write-once-per-session record of why a session is closing.
#[derive(Debug, Default)]
pub struct CloseContext {
    inner: Mutex<Cause>,
}

impl CloseContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first fatal cause observed. Subsequent calls are ignored:
    /// the first detector wins, matching the original's single `m_ccContext`.
    pub fn record(&self, operation: Operation, code: i32) {
        let mut guard = self.inner.lock();
        if guard.fire {
            return;
        }
        guard.fire = true;
        guard.operation = operation;
        guard.code = code;
    }

    /// Clears the context. Called at `Start` (pre-attempt), and again if a
    /// `Start` fails before its own CAS left `stopped` — there `stop_session`
    /// never runs, so nothing else would clear a cause this same failed
    /// attempt just recorded.
    pub fn reset(&self) {
        *self.inner.lock() = Cause::default();
    }

    /// Returns `(fire, operation, code)` for `Stop` to shape the final
    /// `on-close` callback.
    pub fn snapshot(&self) -> (bool, Operation, i32) {
        let guard = self.inner.lock();
        (guard.fire, guard.operation, guard.code)
    }
}
