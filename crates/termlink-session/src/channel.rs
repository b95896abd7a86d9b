//! The session channel: sole owner of the connection handle and the session
//! state machine.
//!
//! Every caller (user input, resize reports, transport callbacks) goes
//! through one mutex, so a state transition and a submission can never race
//! each other into sending on a released handle. Nothing here blocks on I/O:
//! transmission pushes a frame onto the transport's unbounded outbound queue.
//! Inbound bytes are handed to the surface after that mutex is released, so
//! a surface stuck writing to a paused terminal cannot stall submissions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::error::{BackpressureError, Evicted, TransportError};
use crate::geometry::Geometry;
use crate::protocol::ControlFrame;
use crate::surface::{lock_surface, SharedSurface};
use crate::transport::{Frame, Link};

/// Default bound on submissions buffered while connecting.
pub const DEFAULT_MAX_BUFFERED: usize = 256;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Handshake in progress; submissions are buffered.
    Connecting,
    /// Live in both directions.
    Open,
    /// Orderly shutdown requested by either side; in-flight data drains.
    Closing,
    /// Orderly shutdown finished.
    Closed,
    /// The transport failed; nothing was drained.
    Failed,
}

impl SessionState {
    /// `Closed` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something to send to the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Opaque terminal bytes (keystrokes, pastes, device responses).
    Raw(Vec<u8>),
    /// An encoded control message.
    Control(ControlFrame),
}

impl Payload {
    fn resize_geometry(&self) -> Option<Geometry> {
        match self {
            Payload::Control(frame) => frame.message().geometry(),
            Payload::Raw(_) => None,
        }
    }

    fn describe(&self) -> Evicted {
        match self {
            Payload::Raw(bytes) => Evicted::Raw { len: bytes.len() },
            Payload::Control(frame) => Evicted::Control {
                geometry: frame.message().geometry(),
            },
        }
    }

    fn into_frame(self) -> Frame {
        match self {
            Payload::Raw(bytes) => Frame::Data(bytes),
            Payload::Control(frame) => Frame::Control(frame.into_wire()),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Raw(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Raw(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Raw(text.as_bytes().to_vec())
    }
}

impl From<ControlFrame> for Payload {
    fn from(frame: ControlFrame) -> Self {
        Payload::Control(frame)
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Handed to the transport.
    Transmitted,
    /// Held until the connection is ready.
    Buffered,
    /// Held, but the buffer was full and an older submission was dropped.
    Evicted(BackpressureError),
    /// The session is closing or over; the submission was discarded.
    Dropped,
}

/// Running counters for a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Data and control frames handed to the transport.
    pub transmitted: u64,
    /// Submissions held while connecting.
    pub buffered: u64,
    /// Buffered submissions dropped under backpressure.
    pub evicted: u64,
    /// Submissions discarded because the session was closing or over.
    pub dropped: u64,
    /// Inbound bytes delivered to the surface.
    pub inbound_bytes: u64,
    /// Inbound bytes discarded after shutdown began.
    pub discarded_inbound_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How many submissions to hold while connecting, not counting the
    /// initial resize report.
    pub max_buffered: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }
}

struct ChannelInner {
    state: SessionState,
    /// Released (set to `None`) on `Closed` and `Failed`.
    link: Option<Link>,
    /// The first resize report, pinned ahead of everything else until flushed.
    initial_resize: Option<ControlFrame>,
    initial_resize_seen: bool,
    pending: VecDeque<Payload>,
    max_buffered: usize,
    sink: SharedSurface,
    stats: ChannelStats,
    failure: Option<TransportError>,
    state_tx: watch::Sender<SessionState>,
}

impl ChannelInner {
    fn transition(&mut self, next: SessionState) {
        log::debug!("session {} -> {}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
    }

    fn release(&mut self) {
        self.link = None;
        self.pending.clear();
        self.initial_resize = None;
    }

    fn fail(&mut self, err: TransportError) {
        if self.state.is_terminal() {
            return;
        }
        log::error!("session failed: {err}");
        self.failure = Some(err);
        self.release();
        self.transition(SessionState::Failed);
    }

    /// Push a frame onto the transport queue. A vanished writer fails the session.
    fn transmit(&mut self, frame: Frame) -> bool {
        let Some(link) = self.link.as_ref() else {
            return false;
        };
        let counted = !matches!(frame, Frame::Close);
        if link.send(frame).is_err() {
            self.fail(TransportError::LinkClosed);
            return false;
        }
        if counted {
            self.stats.transmitted += 1;
        }
        true
    }

    fn buffer(&mut self, payload: Payload) -> SubmitOutcome {
        self.stats.buffered += 1;

        if !self.initial_resize_seen {
            if let Payload::Control(frame) = payload {
                if frame.is_resize() {
                    self.initial_resize_seen = true;
                    self.initial_resize = Some(frame);
                    return SubmitOutcome::Buffered;
                }
                self.pending.push_back(Payload::Control(frame));
                return self.enforce_bound();
            }
        }

        self.pending.push_back(payload);
        self.enforce_bound()
    }

    /// Drop the oldest buffered submission once the buffer is over its bound.
    /// The pinned initial resize lives outside `pending` and is never a victim.
    fn enforce_bound(&mut self) -> SubmitOutcome {
        if self.pending.len() <= self.max_buffered {
            return SubmitOutcome::Buffered;
        }

        let Some(evicted) = self.pending.pop_front() else {
            return SubmitOutcome::Buffered;
        };

        self.stats.evicted += 1;
        let err = BackpressureError {
            capacity: self.max_buffered,
            evicted: evicted.describe(),
        };
        log::warn!("{err}");
        SubmitOutcome::Evicted(err)
    }
}

/// Handle to a session's channel. Cheap to clone; all clones share one state
/// machine.
#[derive(Clone)]
pub struct SessionChannel {
    inner: Arc<Mutex<ChannelInner>>,
    // Keeps inbound deliveries in arrival order once `inner` is released.
    delivery: Arc<Mutex<()>>,
}

impl SessionChannel {
    /// Create a channel in `Connecting` state.
    ///
    /// Returns the receiving end of the outbound queue, which the transport
    /// task drains once the connection is ready. Inbound bytes are delivered
    /// to `sink`.
    pub fn new(config: ChannelConfig, sink: SharedSurface) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (link, outbound) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Connecting);

        let inner = ChannelInner {
            state: SessionState::Connecting,
            link: Some(link),
            initial_resize: None,
            initial_resize_seen: false,
            pending: VecDeque::new(),
            max_buffered: config.max_buffered,
            sink,
            stats: ChannelStats::default(),
            failure: None,
            state_tx,
        };

        (
            Self {
                inner: Arc::new(Mutex::new(inner)),
                delivery: Arc::new(Mutex::new(())),
            },
            outbound,
        )
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lock().state_tx.subscribe()
    }

    pub fn stats(&self) -> ChannelStats {
        self.lock().stats
    }

    /// Why the session failed, if it did.
    pub fn failure(&self) -> Option<TransportError> {
        self.lock().failure.clone()
    }

    /// Number of submissions currently held for the connection.
    pub fn buffered_len(&self) -> usize {
        let inner = self.lock();
        inner.pending.len() + usize::from(inner.initial_resize.is_some())
    }

    /// Queue or transmit `payload` according to the current state.
    ///
    /// Never blocks and never fails: backpressure and shutdown are reported
    /// through the returned outcome and the channel's counters.
    pub fn submit(&self, payload: impl Into<Payload>) -> SubmitOutcome {
        let payload = payload.into();
        let mut inner = self.lock();

        match inner.state {
            SessionState::Connecting => inner.buffer(payload),
            SessionState::Open => {
                if payload.resize_geometry().is_some() {
                    inner.initial_resize_seen = true;
                }
                if inner.transmit(payload.into_frame()) {
                    SubmitOutcome::Transmitted
                } else {
                    inner.stats.dropped += 1;
                    SubmitOutcome::Dropped
                }
            }
            SessionState::Closing | SessionState::Closed | SessionState::Failed => {
                inner.stats.dropped += 1;
                SubmitOutcome::Dropped
            }
        }
    }

    /// The transport finished its handshake.
    ///
    /// Flushes buffered submissions (the initial resize first, then the rest
    /// in submission order). Returns `false` if the channel was no longer
    /// connecting, in which case the transport should shut down.
    pub fn on_ready(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != SessionState::Connecting {
            log::debug!("transport ready but session is {}", inner.state);
            return false;
        }

        inner.transition(SessionState::Open);

        let initial = inner.initial_resize.take().map(Payload::Control);
        let pending = std::mem::take(&mut inner.pending);
        for payload in initial.into_iter().chain(pending) {
            if !inner.transmit(payload.into_frame()) {
                break;
            }
        }

        inner.state == SessionState::Open
    }

    /// Bytes arrived from the remote PTY.
    ///
    /// Delivered to the surface in arrival order unless shutdown has begun.
    pub fn on_inbound_data(&self, bytes: &[u8]) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let len = bytes.len() as u64;

        let sink = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Connecting | SessionState::Open => {
                    inner.stats.inbound_bytes += len;
                    Arc::clone(&inner.sink)
                }
                SessionState::Closing | SessionState::Closed | SessionState::Failed => {
                    inner.stats.discarded_inbound_bytes += len;
                    return;
                }
            }
        };

        // The surface may block on its output; the channel lock is not held here.
        lock_surface(&sink).sink_inbound_bytes(bytes);
    }

    /// The peer started an orderly shutdown.
    pub fn on_remote_close(&self) {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Open => inner.transition(SessionState::Closing),
            SessionState::Connecting => {
                inner.release();
                inner.transition(SessionState::Closed);
            }
            _ => {}
        }
    }

    /// The connection ended in an orderly way.
    pub fn on_closed(&self) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.release();
        inner.transition(SessionState::Closed);
    }

    /// The transport failed. The handle is released without draining.
    pub fn on_transport_error(&self, err: TransportError) {
        self.lock().fail(err);
    }

    /// Request an orderly shutdown. Idempotent.
    ///
    /// While still connecting there is nothing to drain, so buffered
    /// submissions are discarded and the channel closes immediately.
    pub fn close(&self) {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Connecting => {
                inner.release();
                inner.transition(SessionState::Closed);
            }
            SessionState::Open => {
                inner.transition(SessionState::Closing);
                inner.transmit(Frame::Close);
            }
            SessionState::Closing | SessionState::Closed | SessionState::Failed => {}
        }
    }

    /// Wait until the session reaches `Closed` or `Failed`.
    pub async fn terminated(&self) -> SessionState {
        let mut rx = self.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }
}
