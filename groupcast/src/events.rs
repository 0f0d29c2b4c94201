//! The six boolean signals of spec §5 (*Signals*). `ManualEvent`s stay set
//! until explicitly reset; `AutoEvent`s clear themselves the moment a waiter
//! observes them, mirroring Win32 manual-reset vs. auto-reset event objects.
//!
//! The network loop additionally needs to be woken out of an `mio::Poll`
//! wait; it registers an `mio::Waker` with [`Signals`] so that setting any
//! of `stop`/`send_ready`/`unpause` also breaks it out of the poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
pub struct ManualEvent {
    flag: AtomicBool,
}

impl ManualEvent {
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct AutoEvent {
    flag: AtomicBool,
}

impl AutoEvent {
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Reads and clears the flag in one step — the "auto-reset" behaviour.
    pub fn test_and_clear(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// All signals for one session, plus the plumbing to wake both worker loops.
#[derive(Default)]
pub struct Signals {
    pub stop: ManualEvent,
    pub send_ready: AutoEvent,
    pub unpause: ManualEvent,
    pub received: AutoEvent,
    pub wait_stopped: ManualEvent,

    processor_mu: Mutex<()>,
    processor_cv: Condvar,
    network_waker: Mutex<Option<Arc<mio::Waker>>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_network_waker(&self, waker: Arc<mio::Waker>) {
        *self.network_waker.lock() = Some(waker);
    }

    pub fn detach_network_waker(&self) {
        self.network_waker.lock().take();
    }

    fn wake_network(&self) {
        if let Some(waker) = self.network_waker.lock().as_ref() {
            let _ = waker.wake();
        }
    }

    fn wake_processor(&self) {
        let _guard = self.processor_mu.lock();
        self.processor_cv.notify_all();
    }

    pub fn signal_stop(&self) {
        self.stop.set();
        self.wake_network();
        self.wake_processor();
    }

    pub fn signal_send_ready(&self) {
        self.send_ready.set();
        self.wake_network();
    }

    pub fn signal_unpause(&self) {
        self.unpause.set();
        self.wake_network();
        self.wake_processor();
    }

    pub fn reset_unpause(&self) {
        self.unpause.reset();
    }

    pub fn signal_received(&self) {
        self.received.set();
        self.wake_processor();
    }

    /// Blocks the processor loop until `stop`, `received`, or `unpause` is
    /// set, or `timeout` elapses.
    pub fn wait_processor(&self, timeout: Duration) {
        if self.stop.is_set() || self.received.is_set() || self.unpause.is_set() {
            return;
        }
        let mut guard = self.processor_mu.lock();
        self.processor_cv.wait_for(&mut guard, timeout);
    }

    /// Resets every signal back to its initial (unset) state — part of
    /// `Reset` in spec §4.D `Stop` step 6.
    pub fn reset_all(&self) {
        self.stop.reset();
        self.send_ready.test_and_clear();
        self.unpause.reset();
        self.received.test_and_clear();
        // wait_stopped is set, not reset, by Reset — see Signals::mark_stopped.
    }

    /// Sets the `wait` event (spec §5): basis of the external `Wait`.
    pub fn mark_stopped(&self) {
        let _guard = self.processor_mu.lock();
        self.wait_stopped.set();
        self.processor_cv.notify_all();
    }

    pub fn mark_starting(&self) {
        self.wait_stopped.reset();
    }

    /// External `Wait(ms)` (spec §4.H): returns whether the session reached
    /// `stopped` within the timeout.
    pub fn wait_for_stop(&self, timeout: Option<Duration>) -> bool {
        if self.wait_stopped.is_set() {
            return true;
        }
        let mut guard = self.processor_mu.lock();
        match timeout {
            Some(d) => {
                self.processor_cv.wait_for(&mut guard, d);
            }
            None => loop {
                if self.wait_stopped.is_set() {
                    break;
                }
                self.processor_cv.wait(&mut guard);
            },
        }
        self.wait_stopped.is_set()
    }
}
