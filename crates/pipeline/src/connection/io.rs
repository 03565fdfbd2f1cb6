use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::config::PipelineConfig;
use crate::connection::{Transport, TransportBinding, TransportEvent};
use crate::handler::MessageHandler;
use crate::protocol::{HttpError, OutgoingMessage, SendError, TransportError};

#[derive(Debug)]
enum Command {
    Write(Bytes),
    End(Option<Bytes>),
    // wakes the driver after the read side was resumed
    Resume,
    SetTimeout(Option<Duration>),
    Destroy,
}

#[derive(Debug)]
struct Shared {
    pending: AtomicUsize,
    paused: AtomicBool,
    closed: AtomicBool,
    high_water_mark: usize,
}

/// [`Transport`] handle onto a connection run by an [`IoDriver`].
///
/// Writes are queued to the driver task; `write` reports backpressure once
/// the bytes not yet written to the socket reach the write high-water mark.
#[derive(Debug, Clone)]
pub struct IoTransport {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl IoTransport {
    fn send(&self, command: Command) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            trace!(?command, "connection closed, command dropped");
            return false;
        }
        if self.commands.send(command).is_err() {
            trace!("driver gone, command dropped");
            return false;
        }
        true
    }

    /// Bytes handed to `write` that have not reached the socket yet.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Transport for IoTransport {
    fn write(&self, bytes: Bytes) -> bool {
        let len = bytes.len();
        let pending = self.shared.pending.fetch_add(len, Ordering::AcqRel) + len;
        if !self.send(Command::Write(bytes)) {
            self.shared.pending.fetch_sub(len, Ordering::AcqRel);
            return false;
        }
        pending < self.shared.high_water_mark
    }

    fn end(&self, bytes: Option<Bytes>) {
        if let Some(bytes) = &bytes {
            self.shared.pending.fetch_add(bytes.len(), Ordering::AcqRel);
        }
        self.send(Command::End(bytes));
    }

    fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            self.send(Command::Resume);
        }
    }

    fn set_timeout(&self, timeout: Option<Duration>) {
        self.send(Command::SetTimeout(timeout));
    }

    fn destroy(&self) {
        self.send(Command::Destroy);
    }
}

/// Runs a [`TransportBinding`] over an async reader and writer.
///
/// The driver owns the I/O halves. It reads while the binding lets it,
/// forwards received bytes to the binding, writes what [`IoTransport`]
/// handles queue, and reports an idle timeout when neither happens for the
/// configured duration.
pub struct IoDriver<R, W, H> {
    reader: R,
    writer: W,
    binding: TransportBinding<IoTransport, H>,
    transport: IoTransport,
    commands: mpsc::UnboundedReceiver<Command>,
    read_buffer_size: usize,
    timeout: Option<Duration>,
    connected: bool,
}

impl<R, W, H> std::fmt::Debug for IoDriver<R, W, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoDriver")
            .field("transport", &self.transport)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("timeout", &self.timeout)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl<R, W, H> IoDriver<R, W, H>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: MessageHandler<IoTransport>,
{
    pub fn new(reader: R, writer: W, binding: TransportBinding<IoTransport, H>, config: &PipelineConfig) -> Self {
        let (sender, commands) = mpsc::unbounded_channel();
        let shared = Shared {
            pending: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            high_water_mark: config.write_high_water_mark(),
        };
        let transport = IoTransport { commands: sender, shared: Arc::new(shared) };

        Self {
            reader,
            writer,
            binding,
            transport,
            commands,
            read_buffer_size: config.read_buffer_size(),
            timeout: None,
            connected: false,
        }
    }

    /// A handle onto the connection, for outbound messages created outside the binding.
    pub fn transport(&self) -> IoTransport {
        self.transport.clone()
    }

    pub fn binding(&self) -> &TransportBinding<IoTransport, H> {
        &self.binding
    }

    pub fn binding_mut(&mut self) -> &mut TransportBinding<IoTransport, H> {
        &mut self.binding
    }

    /// Connects the binding to this driver's transport and flushes `outgoing`.
    ///
    /// [`IoDriver::run`] connects on its own when this was not called.
    pub fn connect(&mut self, outgoing: Option<&mut OutgoingMessage<IoTransport>>) {
        if self.connected {
            return;
        }
        self.connected = true;
        self.binding.on_connect(self.transport.clone(), outgoing);
    }

    /// Drives the connection until it is ended, destroyed or the peer closes it.
    ///
    /// # Errors
    ///
    /// Returns the parse error that abandoned the connection, or the I/O error
    /// that broke it.
    pub async fn run(mut self) -> Result<(), HttpError> {
        self.connect(None);

        let result = self.drive().await;
        self.transport.shared.closed.store(true, Ordering::Release);
        if let Err(e) = &result {
            error!(cause = %e, "connection failed");
        }
        self.binding.on_close(None);
        result
    }

    async fn drive(&mut self) -> Result<(), HttpError> {
        let mut buffer = BytesMut::with_capacity(self.read_buffer_size);
        let mut eof = false;

        loop {
            let reading = !eof && !self.transport.shared.paused.load(Ordering::Acquire);
            let timeout = self.timeout.unwrap_or_default();
            buffer.reserve(self.read_buffer_size);

            select! {
                biased;

                command = self.commands.recv() => {
                    // the driver keeps a sender, the channel never closes
                    let Some(command) = command else { return Ok(()) };
                    if !self.execute(command).await? {
                        return Ok(());
                    }
                }

                signal = self.binding.next_flow_signal() => {
                    if let Some(signal) = signal {
                        self.binding.apply_flow(signal);
                    }
                }

                read = self.reader.read_buf(&mut buffer), if reading => {
                    match read {
                        Ok(0) => {
                            eof = true;
                            info!("peer closed its write side");
                            self.binding.handle_event(TransportEvent::End, None)?;
                            if self.finish_after_eof().await? {
                                return Ok(());
                            }
                        }
                        Ok(len) => {
                            trace!(len, "read from connection");
                            let data = buffer.split().freeze();
                            self.binding.handle_event(TransportEvent::Data(data), None)?;
                        }
                        Err(e) => {
                            let error = TransportError::from(&e);
                            self.binding.handle_event(TransportEvent::Error(e), None)?;
                            return Err(error.into());
                        }
                    }
                }

                () = tokio::time::sleep(timeout), if self.timeout.is_some() => {
                    debug!(?timeout, "connection idle");
                    self.binding.handle_event(TransportEvent::Timeout, None)?;
                }
            }
        }
    }

    /// Writes what was queued before the peer closed, then ends the write
    /// side when no inbound message is left unfinished.
    async fn finish_after_eof(&mut self) -> Result<bool, HttpError> {
        while let Ok(command) = self.commands.try_recv() {
            if !self.execute(command).await? {
                return Ok(true);
            }
        }

        if self.binding.is_idle() {
            self.writer.shutdown().await.map_err(SendError::io)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns `false` once the connection must stop.
    async fn execute(&mut self, command: Command) -> Result<bool, HttpError> {
        match command {
            Command::Write(bytes) => {
                self.write_out(&bytes).await?;
                Ok(true)
            }
            Command::End(bytes) => {
                if let Some(bytes) = bytes {
                    self.write_out(&bytes).await?;
                }
                self.writer.flush().await.map_err(SendError::io)?;
                self.writer.shutdown().await.map_err(SendError::io)?;
                debug!("connection ended");
                Ok(false)
            }
            Command::Resume => Ok(true),
            Command::SetTimeout(timeout) => {
                self.timeout = timeout;
                Ok(true)
            }
            Command::Destroy => {
                info!("connection destroyed");
                Ok(false)
            }
        }
    }

    async fn write_out(&mut self, bytes: &Bytes) -> Result<(), HttpError> {
        let result = self.writer.write_all(bytes).await;
        self.transport.shared.pending.fetch_sub(bytes.len(), Ordering::AcqRel);
        result.map_err(|e| SendError::io(e).into())
    }
}
