//! Lifecycle State Machine (spec §3, §4.D): `stopped -> starting -> started
//! -> stopping -> stopped`. Transitions are CAS'd under a spin lock — here,
//! a tight `parking_lot::Mutex` stands in for the spec's dedicated spin
//! lock, since parking_lot's mutex is itself spin-then-park and uncontended
//! transitions are the overwhelmingly common case.

use parking_lot::Mutex;

use crate::error::CastError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

#[derive(Default)]
pub struct StateMachine {
    inner: Mutex<ServiceState>,
}

impl Default for ServiceState {
    fn default() -> Self {
        ServiceState::Stopped
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ServiceState {
        *self.inner.lock()
    }

    pub fn has_started(&self) -> bool {
        matches!(
            self.current(),
            ServiceState::Starting | ServiceState::Started
        )
    }

    /// `stopped -> starting`, the only legal entry into a new session.
    pub fn cas_start(&self) -> Result<(), CastError> {
        let mut guard = self.inner.lock();
        if *guard != ServiceState::Stopped {
            return Err(CastError::IllegalState);
        }
        *guard = ServiceState::Starting;
        Ok(())
    }

    /// `starting -> started`, fired once the worker threads are spawned.
    pub fn cas_started(&self) -> Result<(), CastError> {
        let mut guard = self.inner.lock();
        if *guard != ServiceState::Starting {
            return Err(CastError::IllegalState);
        }
        *guard = ServiceState::Started;
        Ok(())
    }

    /// `starting/started -> stopping`. Fails if the session never started.
    pub fn cas_stopping(&self) -> Result<(), CastError> {
        let mut guard = self.inner.lock();
        if !matches!(*guard, ServiceState::Starting | ServiceState::Started) {
            return Err(CastError::IllegalState);
        }
        *guard = ServiceState::Stopping;
        Ok(())
    }

    /// `stopping -> stopped`, the terminal edge fired by `Reset`.
    pub fn set_stopped(&self) {
        *self.inner.lock() = ServiceState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_edges_only() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), ServiceState::Stopped);
        sm.cas_start().unwrap();
        assert!(sm.has_started());
        sm.cas_started().unwrap();
        sm.cas_stopping().unwrap();
        sm.set_stopped();
        assert_eq!(sm.current(), ServiceState::Stopped);
    }

    #[test]
    fn double_start_is_illegal() {
        let sm = StateMachine::new();
        sm.cas_start().unwrap();
        assert!(sm.cas_start().is_err());
    }

    #[test]
    fn stop_before_start_is_illegal() {
        let sm = StateMachine::new();
        assert!(sm.cas_stopping().is_err());
    }
}
