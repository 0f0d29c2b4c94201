//! Error kinds surfaced by the public contract (spec §7).

use std::io;

/// The operation a [`crate::close_context::CloseContext`] blames for a fatal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Unknown,
    Connect,
    Send,
    Receive,
    Close,
}

/// Error kinds enumerated in spec §7.
#[derive(Debug, thiserror::Error)]
pub enum CastError {
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    #[error("datagram exceeds the configured max-datagram-size")]
    IncorrectSize,

    #[error("illegal state transition")]
    IllegalState,

    #[error("operation requires state=started and connected=true")]
    InvalidState,

    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("failed to bind socket: {0}")]
    SocketBind(#[source] io::Error),

    #[error("failed to configure socket (multicast/broadcast options): {0}")]
    SocketPrepare(#[source] io::Error),

    #[error("protocol not supported")]
    ProtocolNotSupported,

    #[error("address family not supported")]
    AddressFamilyNotSupported,

    #[error("failed to join/connect: {0}")]
    ConnectServer(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    WorkerThreadCreate(#[source] io::Error),

    #[error("receive path failed: {0}")]
    Receive(#[source] io::Error),

    #[error("send path failed: {0}")]
    Send(#[source] io::Error),

    #[error("close failed: {0}")]
    Close(#[source] io::Error),

    #[error("cancelled by listener or receive-FIFO overflow")]
    Cancelled,

    #[error("unknown error")]
    Unknown,
}

/// The enum surface `GetLastError` returns (spec §7): a `Copy` snapshot of
/// `CastError`'s discriminant without its `io::Error` payload, so callers
/// can stash and compare it without holding the error alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParam,
    IncorrectSize,
    IllegalState,
    InvalidState,
    SocketCreate,
    SocketBind,
    SocketPrepare,
    ProtocolNotSupported,
    AddressFamilyNotSupported,
    ConnectServer,
    WorkerThreadCreate,
    Receive,
    Send,
    Close,
    Cancelled,
    Unknown,
}

impl CastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CastError::InvalidParam(_) => ErrorKind::InvalidParam,
            CastError::IncorrectSize => ErrorKind::IncorrectSize,
            CastError::IllegalState => ErrorKind::IllegalState,
            CastError::InvalidState => ErrorKind::InvalidState,
            CastError::SocketCreate(_) => ErrorKind::SocketCreate,
            CastError::SocketBind(_) => ErrorKind::SocketBind,
            CastError::SocketPrepare(_) => ErrorKind::SocketPrepare,
            CastError::ProtocolNotSupported => ErrorKind::ProtocolNotSupported,
            CastError::AddressFamilyNotSupported => ErrorKind::AddressFamilyNotSupported,
            CastError::ConnectServer(_) => ErrorKind::ConnectServer,
            CastError::WorkerThreadCreate(_) => ErrorKind::WorkerThreadCreate,
            CastError::Receive(_) => ErrorKind::Receive,
            CastError::Send(_) => ErrorKind::Send,
            CastError::Close(_) => ErrorKind::Close,
            CastError::Cancelled => ErrorKind::Cancelled,
            CastError::Unknown => ErrorKind::Unknown,
        }
    }

    /// Platform error code posted alongside `kind()` to the last-error slot.
    pub fn code(&self) -> i32 {
        match self {
            CastError::SocketCreate(e)
            | CastError::SocketBind(e)
            | CastError::SocketPrepare(e)
            | CastError::ConnectServer(e)
            | CastError::WorkerThreadCreate(e)
            | CastError::Receive(e)
            | CastError::Send(e)
            | CastError::Close(e) => e.raw_os_error().unwrap_or(-1),
            _ => 0,
        }
    }

    /// Maps an error to the `(operation, code)` pair recorded in the close context.
    ///
    /// `code` mirrors the platform error code surface of spec §7: the raw OS error
    /// number where one exists, `0` for conditions with no underlying `io::Error`.
    pub fn as_close_cause(&self) -> (Operation, i32) {
        match self {
            CastError::ConnectServer(e) | CastError::SocketPrepare(e) => {
                (Operation::Connect, e.raw_os_error().unwrap_or(-1))
            }
            CastError::Send(e) => (Operation::Send, e.raw_os_error().unwrap_or(-1)),
            CastError::Receive(e) => (Operation::Receive, e.raw_os_error().unwrap_or(-1)),
            CastError::Close(e) => (Operation::Close, e.raw_os_error().unwrap_or(-1)),
            CastError::Cancelled => (Operation::Receive, 0),
            _ => (Operation::Unknown, 0),
        }
    }
}

/// True for the UDP "reset family" errors that spec §4.E treats as benign:
/// a peer that has gone away does not make the local session's receive path fatal.
pub fn is_benign_udp_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
    ) || err.raw_os_error() == Some(libc_msgsize_errno())
}

#[cfg(unix)]
fn libc_msgsize_errno() -> i32 {
    libc::EMSGSIZE
}

#[cfg(not(unix))]
fn libc_msgsize_errno() -> i32 {
    // No platform EMSGSIZE constant available off Unix; never matches.
    i32::MIN
}
