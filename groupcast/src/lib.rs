//! `groupcast`: an asynchronous UDP group-cast (multicast/broadcast) client
//! engine.
//!
//! A single [`CastClient`](client::CastClient) joins one multicast group (or
//! enables broadcast) and exchanges datagrams with peers on that group. The
//! engine is a two-thread state machine: a network thread that owns the
//! non-blocking socket and drains a bounded send queue, and a processor
//! thread that drains a bounded receive queue into a caller-supplied
//! [`CastListener`](listener::CastListener). See each module for the piece
//! of the design it covers.

pub mod address;
pub mod buffer_pool;
pub mod client;
pub mod close_context;
pub mod config;
pub mod error;
pub mod events;
pub mod fifo;
pub mod listener;
mod network_loop;
mod processor_loop;
pub mod state;

pub use client::CastClient;
pub use config::{CastMode, Config, ReuseAddressPolicy};
pub use error::{CastError, ErrorKind, Operation};
pub use listener::{CastListener, HandleResult, NullListener};
