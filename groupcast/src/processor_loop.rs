//! Processor Loop (spec §4.F): waits on {worker-stop, received, unpause},
//! drains the receive FIFO to the listener's `on_receive` callback in
//! arrival order.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{stop_session, Session};
use crate::error::Operation;

/// Poll interval used while parked in the condvar wait — bounds how long a
/// spurious wakeup (or a signal delivered between the flag check and the
/// wait call) can delay reacting to `stop`.
const WAIT_SLICE: Duration = Duration::from_millis(200);

pub(crate) fn run(session: Arc<Session>) {
    loop {
        if session.signals.stop.is_set() {
            break;
        }

        session.signals.wait_processor(WAIT_SLICE);

        if session.signals.stop.is_set() {
            break;
        }

        let received = session.signals.received.test_and_clear();
        let unpausing = session.signals.unpause.is_set();

        if (received || unpausing) && !process_data(&session) {
            break;
        }
    }

    // worker-stop exit: don't self-call Stop, Stop is already running.
    if !session.signals.stop.is_set() {
        stop_session(&session, Some(std::thread::current().id()));
    }
}

/// `ProcessData`: pops buffers from the receive FIFO in order, firing
/// `on_receive` for each. A listener `Error` return is fatal (spec §4.F).
fn process_data(session: &Arc<Session>) -> bool {
    while let Some(buf) = session.recv_fifo.pop_front() {
        if session.is_paused() {
            // Buffers queued before a pause are discarded by PauseReceive
            // itself; this guards the narrow race of a pause landing
            // between the FIFO pop and the listener callback.
            return true;
        }

        if !session.deliver_received(&buf) {
            session.close_ctx.record(Operation::Receive, 0);
            tracing::warn!(
                connection_id = session.connection_id(),
                "on_receive vetoed; closing session"
            );
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    // Exercised end-to-end via tests/scenarios.rs using a real CastClient;
    // the loop's internals have no pure-function surface worth unit-testing
    // in isolation beyond what buffer_pool/fifo already cover.
}
