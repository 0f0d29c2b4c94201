//! Listener ABI (spec §4.H, §6): the polymorphic collaborator the core fires
//! into on both worker threads. Modelled as a trait object, the idiomatic
//! Rust stand-in for the spec's "interface/trait with fn pointers" note
//! (§9 Design Notes, *Polymorphism*).

use std::net::SocketAddr;

use crate::error::Operation;

/// Handle result of a listener callback (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    Ok,
    Ignore,
    Error,
}

impl HandleResult {
    pub fn is_error(self) -> bool {
        matches!(self, HandleResult::Error)
    }
}

/// The six callbacks a [`crate::client::CastClient`] fires. Each receives the
/// connection id; socket/data arguments are callback-specific. Default
/// implementations return `Ok` so implementors only override what they need,
/// matching the "ignore means no-op" posture of spec §4.H.
pub trait CastListener: Send + Sync {
    fn on_prepare_connect(&self, connection_id: u64, local_addr: SocketAddr) -> HandleResult {
        let _ = (connection_id, local_addr);
        HandleResult::Ok
    }

    fn on_connect(&self, connection_id: u64) -> HandleResult {
        let _ = connection_id;
        HandleResult::Ok
    }

    /// Synthetic for UDP — fired immediately after `on_connect` (spec §4.D step 7).
    fn on_handshake(&self, connection_id: u64) -> HandleResult {
        let _ = connection_id;
        HandleResult::Ok
    }

    /// An `Error` return here is logged, not fatal (spec §4.H table).
    fn on_send(&self, connection_id: u64, data: &[u8]) -> HandleResult {
        let _ = (connection_id, data);
        HandleResult::Ok
    }

    /// An `Error` return here is fatal: it closes the session with
    /// `(receive, cancelled)` (spec §4.F).
    fn on_receive(&self, connection_id: u64, data: &[u8]) -> HandleResult {
        let _ = (connection_id, data);
        HandleResult::Ok
    }

    fn on_close(&self, connection_id: u64, operation: Operation, code: i32) -> HandleResult {
        let _ = (connection_id, operation, code);
        HandleResult::Ok
    }
}

/// A listener that answers every callback with `Ok` and does nothing else.
/// Useful for callers that only want `Send`/`Wait` without per-datagram hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl CastListener for NullListener {}
