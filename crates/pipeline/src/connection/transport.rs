use std::io;
use std::time::Duration;

use bytes::Bytes;

/// A duplex byte connection as seen by the pipeline.
///
/// Implementations are cheap handles onto one underlying connection: the
/// transport binding keeps one and every attached outbound message keeps a
/// clone, so all methods take `&self`.
pub trait Transport {
    /// Hands bytes to the connection.
    ///
    /// Returns `false` when the connection buffered them past its high-water
    /// mark. The bytes are still accepted, the caller should just slow down.
    fn write(&self, bytes: Bytes) -> bool;

    /// Writes the optional last bytes, then half-closes the write side once
    /// everything queued before has gone out.
    fn end(&self, bytes: Option<Bytes>);

    /// Stops delivering `Data` events until [`Transport::resume`].
    fn pause(&self);

    fn resume(&self);

    /// Arms the idle timeout, `None` disarms it.
    fn set_timeout(&self, timeout: Option<Duration>);

    /// Tears the connection down immediately, dropping queued writes.
    fn destroy(&self);
}

/// Notifications a transport delivers to its binding.
///
/// `Connect` carries the handle the binding keeps for the connection's lifetime.
#[derive(Debug)]
pub enum TransportEvent<T> {
    Connect(T),
    Data(Bytes),
    /// The peer half-closed its write side.
    End,
    Error(io::Error),
    Timeout,
    Close,
}
