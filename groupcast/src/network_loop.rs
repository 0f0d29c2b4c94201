//! Network Loop (spec §4.E): owns the socket, waits on the 4-way event set
//! {worker-stop, socket-readiness, send-buffer-ready, unpause}, and drives
//! `ReadData`/`SendData`.

use std::io;
use std::sync::Arc;

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Token};

use crate::client::{stop_session, Session};
use crate::config::RECEIVE_FIFO_CAP;
use crate::error::{is_benign_udp_error, CastError, Operation};

pub const SOCKET_TOKEN: Token = Token(0);
pub const WAKE_TOKEN: Token = Token(1);

pub(crate) fn run(session: Arc<Session>, mut socket: MioUdpSocket, mut poll: mio::Poll) {
    let mut events = Events::with_capacity(128);

    'outer: loop {
        if session.signals.stop.is_set() {
            break;
        }

        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            session.record_fatal(&CastError::Receive(e));
            break;
        }

        if session.signals.stop.is_set() {
            break;
        }

        for event in events.iter() {
            if event.token() != SOCKET_TOKEN {
                continue;
            }

            // error first, then read, then write, then close (spec §4.E).
            if event.is_error() {
                let code = socket_error_code(&socket);
                session.close_ctx.record(Operation::Connect, code);
                break 'outer;
            }

            if event.is_readable() && !read_data(&session, &socket) {
                break 'outer;
            }

            if event.is_writable() && !send_data(&session, &socket) {
                break 'outer;
            }

            if event.is_read_closed() || event.is_write_closed() {
                session.close_ctx.record(Operation::Close, 0);
                break 'outer;
            }
        }

        if session.signals.send_ready.test_and_clear() && !send_data(&session, &socket) {
            break;
        }

        if session.signals.unpause.is_set() && !read_data(&session, &socket) {
            break;
        }
    }

    session.signals.detach_network_waker();

    // worker-stop exit: don't self-call Stop, Stop is already running.
    if !session.signals.stop.is_set() {
        stop_session(&session, Some(std::thread::current().id()));
    }
}

fn socket_error_code(socket: &MioUdpSocket) -> i32 {
    socket.take_error().ok().flatten().and_then(|e| e.raw_os_error()).unwrap_or(-1)
}

/// `ReadData` (spec §4.E): loops `recvfrom` into freshly picked receive
/// buffers until `WouldBlock`, pause, or a fatal error.
fn read_data(session: &Arc<Session>, socket: &MioUdpSocket) -> bool {
    loop {
        if session.is_paused() {
            return true;
        }

        let mut buf = session.recv_pool.lock().pick_free();
        let dst = buf.full_mut();

        match socket.recv_from(dst) {
            Ok((len, _peer)) => {
                buf.set_len(len);
                tracing::trace!(target: "wire", len, "received datagram");

                session.recv_fifo.push_back(buf);
                let fifo_len = session.recv_fifo.size();
                session.note_received_watermark(fifo_len);

                if fifo_len == 1 {
                    session.signals.signal_received();
                }

                if fifo_len > RECEIVE_FIFO_CAP {
                    session.close_ctx.record(Operation::Receive, 0);
                    tracing::error!(cap = RECEIVE_FIFO_CAP, "receive FIFO exceeded hard cap");
                    return false;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
            Err(e) if is_benign_udp_error(&e) => continue,
            Err(e) => {
                session.record_fatal(&CastError::Receive(e));
                return false;
            }
        }
    }
}

/// `SendData` (spec §4.E): pops the send FIFO's head and writes the whole
/// datagram; on `WouldBlock`, pushes the head back to the front to
/// preserve ordering and stops.
fn send_data(session: &Arc<Session>, socket: &MioUdpSocket) -> bool {
    let Some(cast_addr) = *session.cast_addr.lock() else {
        return true;
    };

    loop {
        let Some(buf) = session.send_fifo.pop_front() else {
            return true;
        };

        match socket.send_to(&buf, cast_addr) {
            Ok(written) => {
                // Partial writes are impossible for datagrams (spec §4.E).
                session.add_pending(-(std::cmp::max(written, 1) as i64));
                session.note_datagram_sent(&buf);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                session.send_fifo.push_front(buf);
                return true;
            }
            Err(e) => {
                session.record_fatal(&CastError::Send(e));
                return false;
            }
        }
    }
}
