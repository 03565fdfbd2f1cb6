use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use tracing::{trace, warn};

use crate::protocol::HttpError;

/// Requests an inbound body makes of the read side of its transport.
///
/// The transport binding is the only consumer of these signals and so the
/// only code that pauses or resumes reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    /// Stop reading: the consumer paused or the queue reached its high-water mark.
    Pause,
    /// Reading may continue.
    Resume,
    /// Set (or clear) the transport idle timeout.
    Timeout(Option<Duration>),
    /// A message finished parsing, the next pipelined one may start.
    MessageComplete { keep_alive: bool },
}

pub(crate) type FlowSender = mpsc::UnboundedSender<FlowSignal>;
pub type FlowReceiver = mpsc::UnboundedReceiver<FlowSignal>;

pub(crate) fn flow_channel() -> (FlowSender, FlowReceiver) {
    mpsc::unbounded()
}

type TimeoutCallback = Box<dyn FnOnce() + Send>;

/// Creates the producer and consumer halves of one message body.
pub(crate) fn body_channel(flow: FlowSender, high_water_mark: usize) -> (BodySender, BodyReceiver) {
    let state = BodyState {
        chunks: VecDeque::new(),
        buffered: 0,
        complete: false,
        error: None,
        failed: false,
        detached: false,
        paused: false,
        throttled: false,
        high_water_mark,
        waker: None,
        on_timeout: None,
        flow,
    };

    let shared = Arc::new(Mutex::new(state));
    (BodySender { shared: Arc::clone(&shared) }, BodyReceiver { shared })
}

struct BodyState {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    complete: bool,
    error: Option<HttpError>,
    // stays set after the error was taken
    failed: bool,
    // the consumer was dropped
    detached: bool,
    paused: bool,
    // a `Pause` was sent and not yet released
    throttled: bool,
    high_water_mark: usize,
    waker: Option<Waker>,
    on_timeout: Option<TimeoutCallback>,
    flow: FlowSender,
}

impl BodyState {
    fn send(&self, signal: FlowSignal) {
        if self.flow.unbounded_send(signal).is_err() {
            trace!(?signal, "transport binding gone, flow signal dropped");
        }
    }

    fn update_flow(&mut self) {
        if self.complete {
            // the binding resumes reading itself once the message completes
            self.throttled = false;
            return;
        }

        let hold = !self.detached && (self.paused || self.buffered >= self.high_water_mark);
        if hold == self.throttled {
            return;
        }

        self.throttled = hold;
        self.send(if hold { FlowSignal::Pause } else { FlowSignal::Resume });
    }

    fn take_waker(&mut self) -> Option<Waker> {
        self.waker.take()
    }
}

fn lock(shared: &Mutex<BodyState>) -> MutexGuard<'_, BodyState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer half, owned by the parser adapter while a body is in flight.
pub(crate) struct BodySender {
    shared: Arc<Mutex<BodyState>>,
}

impl BodySender {
    /// Queues body bytes for the consumer. Returns `false` when the body is
    /// already complete, in which case the bytes are dropped.
    pub fn push(&self, bytes: Bytes) -> bool {
        let waker = {
            let mut state = lock(&self.shared);
            if state.complete {
                warn!(len = bytes.len(), "body already complete, dropping late bytes");
                return false;
            }

            if state.detached {
                trace!(len = bytes.len(), "body consumer dropped, discarding bytes");
                return true;
            }

            state.buffered += bytes.len();
            state.chunks.push_back(bytes);
            state.update_flow();
            state.take_waker()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Marks the end of the body.
    pub fn complete(&self) {
        let waker = {
            let mut state = lock(&self.shared);
            state.complete = true;
            state.update_flow();
            state.take_waker()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Ends the body with an error that the consumer observes after the bytes
    /// already queued. Ignored once the body is complete.
    pub fn fail(&self, error: HttpError) {
        let waker = {
            let mut state = lock(&self.shared);
            if state.complete {
                trace!(cause = %error, "body already complete, error not delivered");
                return;
            }
            state.error = Some(error);
            state.failed = true;
            state.complete = true;
            state.update_flow();
            state.take_waker()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Runs the consumer's timeout callback, if one was registered.
    pub fn fire_timeout(&self) -> bool {
        let callback = lock(&self.shared).on_timeout.take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.shared).complete
    }
}

impl fmt::Debug for BodySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared);
        f.debug_struct("BodySender").field("buffered", &state.buffered).field("complete", &state.complete).finish()
    }
}

/// Consumer half of a message body.
///
/// Bytes come out in the order they were pushed. Dropping the receiver
/// discards whatever is queued and releases any pause it held.
pub struct BodyReceiver {
    shared: Arc<Mutex<BodyState>>,
}

impl BodyReceiver {
    /// Takes every queued byte at once, `None` when nothing is queued.
    pub fn read(&self) -> Option<Bytes> {
        let mut state = lock(&self.shared);
        let bytes = match state.chunks.len() {
            0 => return None,
            1 => state.chunks.pop_front()?,
            _ => {
                let mut joined = BytesMut::with_capacity(state.buffered);
                for chunk in state.chunks.drain(..) {
                    joined.extend_from_slice(&chunk);
                }
                joined.freeze()
            }
        };

        state.buffered = 0;
        state.update_flow();
        Some(bytes)
    }

    /// Polls for the next queued chunk, then the error if the body failed,
    /// then the end of the body.
    pub fn poll_chunk(&self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, HttpError>>> {
        let mut state = lock(&self.shared);
        if let Some(chunk) = state.chunks.pop_front() {
            state.buffered -= chunk.len();
            state.update_flow();
            return Poll::Ready(Some(Ok(chunk)));
        }

        if let Some(error) = state.error.take() {
            return Poll::Ready(Some(Err(error)));
        }

        if state.complete {
            return Poll::Ready(None);
        }

        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Whether the body ended with an error.
    pub fn is_failed(&self) -> bool {
        lock(&self.shared).failed
    }

    /// Takes the error that ended the body, so it is delivered once.
    pub fn take_error(&self) -> Option<HttpError> {
        lock(&self.shared).error.take()
    }

    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        state.paused = true;
        state.update_flow();
    }

    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        state.paused = false;
        state.update_flow();
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared).paused
    }

    /// Asks the binding to arm the transport timeout and stores `on_timeout`
    /// to run when it fires. `None` clears both.
    pub fn set_timeout<F>(&self, timeout: Option<Duration>, on_timeout: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = lock(&self.shared);
        state.on_timeout = timeout.map(|_| Box::new(on_timeout) as TimeoutCallback);
        state.send(FlowSignal::Timeout(timeout));
    }

    /// Whether the end of the body has been seen (bytes may still be queued).
    pub fn is_complete(&self) -> bool {
        lock(&self.shared).complete
    }

    /// Whether every byte has been read and no more will arrive.
    pub fn is_drained(&self) -> bool {
        let state = lock(&self.shared);
        state.complete && state.chunks.is_empty() && state.error.is_none()
    }

    pub fn buffered_len(&self) -> usize {
        lock(&self.shared).buffered
    }
}

impl Drop for BodyReceiver {
    fn drop(&mut self) {
        let mut state = lock(&self.shared);
        state.detached = true;
        state.chunks.clear();
        state.buffered = 0;
        state.on_timeout = None;
        state.waker = None;
        state.update_flow();
    }
}

impl fmt::Debug for BodyReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared);
        f.debug_struct("BodyReceiver")
            .field("buffered", &state.buffered)
            .field("complete", &state.complete)
            .field("paused", &state.paused)
            .finish()
    }
}
