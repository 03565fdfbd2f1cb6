use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::connection::Transport;

#[derive(Debug, Default)]
struct Recorded {
    writes: Vec<Bytes>,
    pending: usize,
    high_water_mark: Option<usize>,
    paused: bool,
    pause_count: usize,
    resume_count: usize,
    timeout: Option<Duration>,
    ended: bool,
    destroyed: bool,
}

/// A transport that records everything done to it.
///
/// Clones share the same record, so a test keeps one handle and gives the
/// other to the pipeline. Written bytes count as pending until
/// [`MemoryTransport::drain`] is called; with a high-water mark set, writes
/// report backpressure once the pending count reaches it.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        let transport = Self::default();
        transport.lock().high_water_mark = Some(high_water_mark);
        transport
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every write in order, including the bytes passed to `end`.
    pub fn writes(&self) -> Vec<Bytes> {
        self.lock().writes.clone()
    }

    /// All written bytes concatenated.
    pub fn output(&self) -> Bytes {
        let recorded = self.lock();
        let mut output = BytesMut::new();
        for write in &recorded.writes {
            output.extend_from_slice(write);
        }
        output.freeze()
    }

    /// Forgets the recorded writes and pending bytes, as if the peer read them.
    pub fn drain(&self) -> Bytes {
        let output = self.output();
        let mut recorded = self.lock();
        recorded.writes.clear();
        recorded.pending = 0;
        output
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn pause_count(&self) -> usize {
        self.lock().pause_count
    }

    pub fn resume_count(&self) -> usize {
        self.lock().resume_count
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.lock().timeout
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }
}

impl Transport for MemoryTransport {
    fn write(&self, bytes: Bytes) -> bool {
        let mut recorded = self.lock();
        if recorded.ended || recorded.destroyed {
            trace!(len = bytes.len(), "write after close ignored");
            return false;
        }

        recorded.pending += bytes.len();
        recorded.writes.push(bytes);
        recorded.high_water_mark.is_none_or(|mark| recorded.pending < mark)
    }

    fn end(&self, bytes: Option<Bytes>) {
        let mut recorded = self.lock();
        if recorded.ended || recorded.destroyed {
            return;
        }
        if let Some(bytes) = bytes {
            recorded.pending += bytes.len();
            recorded.writes.push(bytes);
        }
        recorded.ended = true;
    }

    fn pause(&self) {
        let mut recorded = self.lock();
        recorded.paused = true;
        recorded.pause_count += 1;
    }

    fn resume(&self) {
        let mut recorded = self.lock();
        recorded.paused = false;
        recorded.resume_count += 1;
    }

    fn set_timeout(&self, timeout: Option<Duration>) {
        self.lock().timeout = timeout;
    }

    fn destroy(&self) {
        self.lock().destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_record() {
        let transport = MemoryTransport::with_high_water_mark(4);
        let handle = transport.clone();

        assert!(handle.write(Bytes::from_static(b"ab")));
        assert!(!handle.write(Bytes::from_static(b"cd")));
        assert_eq!(transport.output(), Bytes::from_static(b"abcd"));

        assert_eq!(transport.drain(), Bytes::from_static(b"abcd"));
        assert!(handle.write(Bytes::from_static(b"e")));

        handle.end(Some(Bytes::from_static(b"f")));
        assert!(!handle.write(Bytes::from_static(b"g")));
        assert!(transport.is_ended());
        assert_eq!(transport.output(), Bytes::from_static(b"ef"));
    }
}
