//! Configuration (spec §6). All setters assert `stopped`; value *validation*
//! happens at `Start` time per spec §4.D step 1, not here — this mirrors
//! `ENSURE_HAS_STOPPED()` guarding setters in the original `UdpCast.h` while
//! leaving range checks to the start sequence.

use crate::error::CastError;

/// Socket address-reuse policy (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReuseAddressPolicy {
    None,
    AddrOnly,
    #[default]
    AddrAndPort,
}

/// Join a multicast group, or enable broadcast (spec §6, §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastMode {
    #[default]
    Multicast,
    Broadcast,
}

pub const DEFAULT_MAX_DATAGRAM_SIZE: u32 = 4096;
pub const MAX_UDP_DATAGRAM_SIZE: u32 = 65_507;
pub const RECEIVE_FIFO_CAP: usize = 300_000;

/// Mutable configuration for a not-yet-started [`crate::client::CastClient`].
///
/// Every setter returns `Result<&mut Self, CastError>` so callers can chain
/// them and get `IllegalState` back immediately if called after `Start`.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) reuse_address_policy: ReuseAddressPolicy,
    pub(crate) max_datagram_size: u32,
    pub(crate) free_buffer_pool_size: usize,
    pub(crate) free_buffer_pool_hold: usize,
    pub(crate) cast_mode: CastMode,
    pub(crate) multicast_ttl: u8,
    pub(crate) multicast_loop: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reuse_address_policy: ReuseAddressPolicy::default(),
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            free_buffer_pool_size: 60,
            free_buffer_pool_hold: 10,
            cast_mode: CastMode::default(),
            multicast_ttl: 1,
            multicast_loop: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_stopped(&self, stopped: bool) -> Result<(), CastError> {
        if !stopped {
            return Err(CastError::IllegalState);
        }
        Ok(())
    }

    pub fn set_reuse_address_policy(
        &mut self,
        stopped: bool,
        policy: ReuseAddressPolicy,
    ) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.reuse_address_policy = policy;
        Ok(self)
    }

    pub fn set_max_datagram_size(
        &mut self,
        stopped: bool,
        size: u32,
    ) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.max_datagram_size = size;
        Ok(self)
    }

    pub fn set_free_buffer_pool_size(
        &mut self,
        stopped: bool,
        size: usize,
    ) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.free_buffer_pool_size = size;
        Ok(self)
    }

    pub fn set_free_buffer_pool_hold(
        &mut self,
        stopped: bool,
        hold: usize,
    ) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.free_buffer_pool_hold = hold;
        Ok(self)
    }

    pub fn set_cast_mode(&mut self, stopped: bool, mode: CastMode) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.cast_mode = mode;
        Ok(self)
    }

    pub fn set_multicast_ttl(&mut self, stopped: bool, ttl: u8) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.multicast_ttl = ttl;
        Ok(self)
    }

    pub fn set_multicast_loop(
        &mut self,
        stopped: bool,
        enable: bool,
    ) -> Result<&mut Self, CastError> {
        self.ensure_stopped(stopped)?;
        self.multicast_loop = enable;
        Ok(self)
    }

    /// Parameter validation, spec §4.D step 1. Runs at `Start`, not at setter time.
    pub fn validate(&self) -> Result<(), CastError> {
        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_UDP_DATAGRAM_SIZE {
            return Err(CastError::InvalidParam("max-datagram-size out of range"));
        }

        // free_buffer_pool_size / hold are usize: "non-negative" is automatic,
        // but hold must not exceed size or eviction never triggers.
        if self.free_buffer_pool_hold > self.free_buffer_pool_size {
            return Err(CastError::InvalidParam(
                "free-buffer-pool-hold exceeds free-buffer-pool-size",
            ));
        }

        Ok(())
    }

    pub fn max_datagram_size(&self) -> u32 {
        self.max_datagram_size
    }

    pub fn cast_mode(&self) -> CastMode {
        self.cast_mode
    }
}
