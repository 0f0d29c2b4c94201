//! Public Contract (spec §4.H) and the shared session state both worker
//! loops operate on. `CastClient` is the handle callers hold; `Session` is
//! the `Arc`-shared innards the network and processor threads close over,
//! mirroring the handle/inner split of `phoenix-channel`'s `PhoenixChannel`.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use mio::net::UdpSocket as MioUdpSocket;
use opentelemetry::metrics::{Counter, UpDownCounter};
use parking_lot::Mutex;

use crate::address;
use crate::buffer_pool::BufferPool;
use crate::close_context::CloseContext;
use crate::config::Config;
use crate::error::{CastError, ErrorKind, Operation};
use crate::events::Signals;
use crate::fifo::Fifo;
use crate::listener::{CastListener, HandleResult};
use crate::network_loop;
use crate::processor_loop;
use crate::state::StateMachine;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

struct Metrics {
    pending_bytes: UpDownCounter<i64>,
    datagrams_sent: Counter<u64>,
    datagrams_received: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = opentelemetry::global::meter("groupcast");
        Self {
            pending_bytes: meter
                .i64_up_down_counter("groupcast.pending_bytes")
                .with_description("Logical bytes queued for send but not yet written.")
                .with_unit("By")
                .build(),
            datagrams_sent: meter
                .u64_counter("groupcast.datagrams_sent")
                .with_description("Datagrams successfully written to the socket.")
                .build(),
            datagrams_received: meter
                .u64_counter("groupcast.datagrams_received")
                .with_description("Datagrams delivered to the receive listener.")
                .build(),
        }
    }
}

/// The `Arc`-shared innards closed over by both worker threads. Buffer
/// pools live behind a `Mutex` (rather than directly in `Session`) because
/// a `CastClient` may be started more than once in its lifetime (spec's
/// Connection ID is "stable for the lifetime of the session", implying a
/// client outlives individual sessions) — each `Start` rebuilds them sized
/// to the then-current config.
pub(crate) struct Session {
    pub(crate) config: Config,
    pub(crate) listener: Arc<dyn CastListener>,
    connection_id: AtomicU64,

    pub(crate) send_pool: Mutex<BufferPool>,
    pub(crate) recv_pool: Mutex<BufferPool>,
    pub(crate) send_fifo: Fifo,
    pub(crate) recv_fifo: Fifo,

    pending: AtomicI64,
    pub(crate) signals: Signals,
    pub(crate) close_ctx: CloseContext,

    connected: AtomicBool,
    /// Set once `on_connect` has fired (and was not vetoed); read by
    /// `stop_session` to decide whether a graceful stop owes a default
    /// `on_close(Close, 0)` (spec §8 invariant 1).
    connect_fired: AtomicBool,
    paused: AtomicBool,
    state: StateMachine,

    local_addr: Mutex<Option<SocketAddr>>,
    pub(crate) cast_addr: Mutex<Option<SocketAddr>>,
    remote_host: Mutex<String>,

    recv_watermark: AtomicU64,
    recv_counter: AtomicU64,

    metrics: Metrics,
    last_error: Mutex<(ErrorKind, i32)>,

    // Stored independently, each as soon as its own spawn succeeds, so a
    // processor-spawn failure still leaves the already-running network
    // thread reachable for `stop_session` to signal and join (rather than
    // losing track of it until both spawns succeed).
    network_worker: Mutex<Option<(JoinHandle<()>, ThreadId)>>,
    processor_worker: Mutex<Option<(JoinHandle<()>, ThreadId)>>,
}

impl Session {
    fn fire(&self, result: HandleResult, on_error_op: Operation) -> Result<(), CastError> {
        match result {
            HandleResult::Ok | HandleResult::Ignore => Ok(()),
            HandleResult::Error => {
                self.close_ctx.record(on_error_op, 0);
                Err(CastError::Cancelled)
            }
        }
    }

    pub(crate) fn connection_id(&self) -> u64 {
        self.connection_id.load(Ordering::Relaxed)
    }

    pub(crate) fn record_fatal(&self, err: &CastError) {
        let (op, code) = err.as_close_cause();
        tracing::warn!(operation = ?op, code, error = %err, "cast session hit a fatal error");
        self.close_ctx.record(op, code);
    }

    pub(crate) fn set_last_error(&self, err: &CastError) {
        *self.last_error.lock() = (err.kind(), err.code());
    }

    /// Adds `delta` to the pending counter; signals `send_ready` on the
    /// `0 -> >0` transition (spec §3).
    pub(crate) fn add_pending(&self, delta: i64) {
        let prev = self.pending.fetch_add(delta, Ordering::SeqCst);
        self.metrics.pending_bytes.add(delta, &[]);
        if prev <= 0 && prev + delta > 0 {
            self.signals.signal_send_ready();
        }
    }

    pub(crate) fn note_datagram_sent(&self, data: &[u8]) {
        self.metrics.datagrams_sent.add(1, &[]);
        // An on-send veto is logged, never fatal (spec §4.H table).
        if self.listener.on_send(self.connection_id(), data) == HandleResult::Error {
            tracing::warn!(connection_id = self.connection_id(), "listener vetoed on_send");
            debug_assert!(false, "on_send veto observed in a debug build");
        }
    }

    /// Delivers one received datagram to the listener. Returns `false` if
    /// the listener vetoed it (fatal per spec §4.F).
    pub(crate) fn deliver_received(&self, data: &[u8]) -> bool {
        self.metrics.datagrams_received.add(1, &[]);
        self.fire(self.listener.on_receive(self.connection_id(), data), Operation::Receive)
            .is_ok()
    }

    pub(crate) fn note_received_watermark(&self, fifo_len: usize) {
        self.recv_watermark.fetch_max(fifo_len as u64, Ordering::Relaxed);
        if self.recv_counter.fetch_add(1, Ordering::Relaxed) % 2000 == 1999 {
            tracing::debug!(
                watermark = self.recv_watermark.load(Ordering::Relaxed),
                "receive FIFO watermark"
            );
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// The public handle: `Start`, `Stop`, `Send`, `SendPackets`, `PauseReceive`,
/// `Wait`, and the query operations of spec §4.H.
pub struct CastClient {
    session: Arc<Session>,
}

impl CastClient {
    pub fn new(config: Config, listener: Arc<dyn CastListener>) -> Self {
        Self {
            session: Arc::new(Session {
                config,
                listener,
                connection_id: AtomicU64::new(0),
                send_pool: Mutex::new(BufferPool::new(0, 0, 0, "send")),
                recv_pool: Mutex::new(BufferPool::new(0, 0, 0, "recv")),
                send_fifo: Fifo::new(),
                recv_fifo: Fifo::new(),
                pending: AtomicI64::new(0),
                signals: Signals::new(),
                close_ctx: CloseContext::new(),
                connected: AtomicBool::new(false),
                connect_fired: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                state: StateMachine::new(),
                local_addr: Mutex::new(None),
                cast_addr: Mutex::new(None),
                remote_host: Mutex::new(String::new()),
                recv_watermark: AtomicU64::new(0),
                recv_counter: AtomicU64::new(0),
                metrics: Metrics::new(),
                last_error: Mutex::new((ErrorKind::Unknown, 0)),
                network_worker: Mutex::new(None),
                processor_worker: Mutex::new(None),
            }),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.session.connection_id()
    }

    pub fn is_connected(&self) -> bool {
        self.session.connected.load(Ordering::SeqCst)
    }

    pub fn has_started(&self) -> bool {
        self.session.state.has_started()
    }

    pub fn is_pause_receive(&self) -> bool {
        self.session.is_paused()
    }

    pub fn get_pending_data_length(&self) -> i64 {
        self.session.pending.load(Ordering::SeqCst)
    }

    pub fn get_local_address(&self) -> Option<SocketAddr> {
        *self.session.local_addr.lock()
    }

    pub fn get_remote_host(&self) -> String {
        self.session.remote_host.lock().clone()
    }

    pub fn get_last_error(&self) -> (ErrorKind, i32) {
        *self.session.last_error.lock()
    }

    pub fn receive_watermark(&self) -> u64 {
        self.session.recv_watermark.load(Ordering::Relaxed)
    }

    /// `Start(rem, port, [bind], [src])` — spec §4.D.
    pub fn start(
        &mut self,
        remote: &str,
        port: u16,
        bind: Option<SocketAddr>,
        source: Option<IpAddr>,
    ) -> bool {
        match try_start(&self.session, remote, port, bind, source) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Start failed");
                self.session.set_last_error(&err);

                // `IllegalState` is unique to the leading `cas_start` CAS:
                // it means this call never left `stopped` alone (another
                // session may already be live on this same `Session`), so
                // there is nothing of this call's own to unwind.
                if !matches!(err, CastError::IllegalState) {
                    // spec §4.D: "any failure triggering Stop". Record the
                    // failure as the close cause up front — `record` is
                    // first-write-wins, so an earlier listener veto's cause
                    // (already recorded via `Session::fire`) survives — then
                    // unwind through the real Stop sequence: it joins
                    // whichever worker thread(s) were already spawned and
                    // clears `connected`/the network waker along the way.
                    let (op, code) = err.as_close_cause();
                    self.session.close_ctx.record(op, code);
                    if !stop_session(&self.session, None) {
                        // Nothing to unwind: state never left `stopped`
                        // (e.g. parameter validation failed before Start's
                        // own CAS).
                        self.session.close_ctx.reset();
                    }
                }
                false
            }
        }
    }

    /// `Stop()` — spec §4.D. Safe to call from the caller thread or (via the
    /// worker loops' internal `stop_from_worker`) from within a worker.
    pub fn stop(&mut self) -> bool {
        stop_session(&self.session, None)
    }

    /// `Send(buffer)` — spec §4.G.
    pub fn send(&self, data: &[u8]) -> bool {
        self.run_send(data)
    }

    /// `SendPackets(vec)` — assembles one logical datagram from multiple
    /// slices, spec §4.G. The aggregate-length check yields `IncorrectSize`
    /// rather than `Send`'s `InvalidParam`, per spec §8 scenario S2.
    pub fn send_packets(&self, packets: &[&[u8]]) -> bool {
        let total: usize = packets.iter().map(|p| p.len()).sum();
        if total > self.session.config.max_datagram_size() as usize {
            self.session.set_last_error(&CastError::IncorrectSize);
            return false;
        }

        let mut buf = Vec::with_capacity(total);
        for p in packets {
            buf.extend_from_slice(p);
        }
        self.run_send(&buf)
    }

    fn run_send(&self, data: &[u8]) -> bool {
        match send_one(&self.session, data) {
            Ok(()) => true,
            Err(err) => {
                self.session.set_last_error(&err);
                false
            }
        }
    }

    /// `PauseReceive(bool)` — spec §4.H.
    pub fn pause_receive(&self, pause: bool) -> bool {
        if !self.session.connected.load(Ordering::SeqCst) {
            return false;
        }

        if pause {
            self.session.paused.store(true, Ordering::SeqCst);
            self.session.signals.reset_unpause();
            // Discard buffers already queued at the pause transition.
            self.session.recv_fifo.clear();
            tracing::debug!(connection_id = self.connection_id(), "receive paused");
        } else {
            self.session.paused.store(false, Ordering::SeqCst);
            self.session.signals.signal_unpause();
            tracing::debug!(connection_id = self.connection_id(), "receive resumed");
        }
        true
    }

    /// `Wait(ms)` — blocks until stopped or the timeout elapses; returns
    /// whether the session is `stopped`.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.session.signals.wait_for_stop(timeout)
    }
}

fn try_start(
    session: &Arc<Session>,
    remote: &str,
    port: u16,
    bind: Option<SocketAddr>,
    source: Option<IpAddr>,
) -> Result<(), CastError> {
    // 1. parameter validation
    session.config.validate()?;

    // 2. CAS stopped -> starting
    session.state.cas_start()?;

    // 3. pool prep, close-context reset, connection-id allocation
    let max_size = session.config.max_datagram_size() as usize;
    let pool_size = session.config.free_buffer_pool_size;
    let pool_hold = session.config.free_buffer_pool_hold;
    *session.send_pool.lock() = BufferPool::new(max_size, pool_size, pool_hold, "send");
    *session.recv_pool.lock() = BufferPool::new(max_size, pool_size, pool_hold, "recv");
    session.close_ctx.reset();
    session
        .connection_id
        .store(NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
    *session.remote_host.lock() = remote.to_string();
    session.signals.mark_starting();

    // 4. socket creation and bind
    let bound = address::create_and_bind(&session.config, remote, port, bind)?;
    *session.local_addr.lock() = Some(bound.local_addr);
    *session.cast_addr.lock() = Some(bound.cast_addr);

    // 5. prepare-connect listener; abort on error
    session
        .fire(
            session.listener.on_prepare_connect(session.connection_id(), bound.local_addr),
            Operation::Connect,
        )
        .map_err(|_| CastError::Cancelled)?;

    // 6. group join / broadcast enable; subscribe to read/write/close readiness
    address::configure_cast(&bound, &session.config, source)?;

    let std_socket: std::net::UdpSocket = bound.socket.into();
    let mut mio_socket = MioUdpSocket::from_std(std_socket);

    let mut poll = mio::Poll::new().map_err(CastError::SocketPrepare)?;
    poll.registry()
        .register(
            &mut mio_socket,
            network_loop::SOCKET_TOKEN,
            mio::Interest::READABLE.add(mio::Interest::WRITABLE),
        )
        .map_err(CastError::SocketPrepare)?;
    let waker = Arc::new(
        mio::Waker::new(poll.registry(), network_loop::WAKE_TOKEN).map_err(CastError::SocketPrepare)?,
    );
    session.signals.attach_network_waker(waker);

    session.connected.store(true, Ordering::SeqCst);

    // 7. connect listener, then synthetic handshake listener
    session
        .fire(session.listener.on_connect(session.connection_id()), Operation::Connect)
        .map_err(|_| CastError::Cancelled)?;
    session.connect_fired.store(true, Ordering::SeqCst);
    session
        .fire(session.listener.on_handshake(session.connection_id()), Operation::Connect)
        .map_err(|_| CastError::Cancelled)?;

    // 8. spawn network thread, then processor thread. Each handle is
    // stashed on Session as soon as its own spawn succeeds, so a processor
    // spawn failure still leaves the network thread (already polling
    // `mio_socket`) reachable for teardown instead of leaking it.
    let net_session = session.clone();
    let network = std::thread::Builder::new()
        .name("groupcast-net".into())
        .spawn(move || network_loop::run(net_session, mio_socket, poll))
        .map_err(CastError::WorkerThreadCreate)?;
    let network_id = network.thread().id();
    *session.network_worker.lock() = Some((network, network_id));

    let proc_session = session.clone();
    let processor = std::thread::Builder::new()
        .name("groupcast-proc".into())
        .spawn(move || processor_loop::run(proc_session))
        .map_err(CastError::WorkerThreadCreate)?;
    let processor_id = processor.thread().id();
    *session.processor_worker.lock() = Some((processor, processor_id));

    // 9. CAS starting -> started
    session.state.cas_started()?;
    tracing::debug!(connection_id = session.connection_id(), "cast session started");

    Ok(())
}

fn send_one(session: &Arc<Session>, data: &[u8]) -> Result<(), CastError> {
    if data.len() > session.config.max_datagram_size() as usize {
        return Err(CastError::InvalidParam("send length exceeds max-datagram-size"));
    }
    if !session.state.has_started() || !session.connected.load(Ordering::SeqCst) {
        return Err(CastError::InvalidState);
    }

    let buf = session.send_pool.lock().pick_initialised(data);
    session.send_fifo.push_back(buf);
    session.add_pending(std::cmp::max(data.len() as i64, 1));

    tracing::trace!(target: "wire", len = data.len(), "queued outgoing datagram");
    Ok(())
}

/// Shared `Stop` body for both the public contract and worker-initiated
/// self-stops. `calling_thread` is `Some(id)` when invoked from inside one
/// of the worker threads, so that thread is skipped when joining (spec
/// §4.D step 2, §5 *Cancellation*: avoids a worker joining itself).
pub(crate) fn stop_session(session: &Arc<Session>, calling_thread: Option<ThreadId>) -> bool {
    if session.state.cas_stopping().is_err() {
        return false;
    }

    session.signals.signal_stop();

    if let Some((handle, id)) = session.network_worker.lock().take() {
        if calling_thread != Some(id) {
            let _ = handle.join();
        }
    }
    if let Some((handle, id)) = session.processor_worker.lock().take() {
        if calling_thread != Some(id) {
            let _ = handle.join();
        }
    }

    session.connected.store(false, Ordering::SeqCst);

    // A graceful stop — no fatal worker error, no listener veto, no Start
    // failure already recorded a cause — still owes exactly one on_close
    // iff on_connect fired (spec §8 invariant 1): record the default
    // (Close, 0) cause. `record` is first-write-wins, so any cause already
    // recorded by a fatal path takes priority over this default.
    if session.connect_fired.swap(false, Ordering::SeqCst) {
        session.close_ctx.record(Operation::Close, 0);
    }

    let (fire, operation, code) = session.close_ctx.snapshot();
    if fire {
        let _ = session.listener.on_close(session.connection_id(), operation, code);
    }
    tracing::debug!(
        connection_id = session.connection_id(),
        fired_close = fire,
        ?operation,
        code,
        "cast session stopped"
    );

    // Teardown + Reset (spec §4.D step 6): pools, FIFOs, signals, state.
    session.send_pool.lock().clear();
    session.recv_pool.lock().clear();
    session.send_fifo.clear();
    session.recv_fifo.clear();
    session.pending.store(0, Ordering::SeqCst);
    session.paused.store(false, Ordering::SeqCst);
    session.recv_watermark.store(0, Ordering::Relaxed);
    session.recv_counter.store(0, Ordering::Relaxed);
    session.signals.detach_network_waker();
    session.signals.reset_all();
    session.state.set_stopped();
    session.signals.mark_stopped();

    true
}
