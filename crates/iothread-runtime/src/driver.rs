//! `BaseIoThread`: the connection driver.
//!
//! Owns one transport and runs its event loop. The loop waits on four
//! sources at once:
//!
//! | source            | action                                          |
//! |-------------------|-------------------------------------------------|
//! | caller's token    | `stop()`, return `Cancelled`                    |
//! | pump data         | forward to the inbound queue (backpressure)     |
//! | pump error        | forward to the error sink, return `Read(err)`   |
//! | outbound queue    | write to the transport; failures are dropped    |
//!
//! Read failures end the connection. Write failures do not: the item is
//! dropped and the loop keeps going, so outbound delivery is at-most-once.
//! Cancellation returns at once: outbound items still queued at that point
//! are never written.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use iothread_core::{
    ConnectionId, IoThread, IoThreadError, Result, Session, Transport, TransportError,
};
use iothread_settings::ChannelSettings;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::channels::{Downstream, DriverChannels, channels};
use crate::input::{InputPump, PumpEvents};
use crate::metrics::{
    IOTHREAD_ACTIVE, IOTHREAD_INBOUND_FRAMES_TOTAL, IOTHREAD_OUTBOUND_FRAMES_TOTAL,
    IOTHREAD_READ_ERRORS_TOTAL, IOTHREAD_STARTED_TOTAL, IOTHREAD_WRITE_FAILURES_TOTAL,
};

/// The base [`IoThread`] implementation.
pub struct BaseIoThread<T: Transport> {
    id: ConnectionId,
    transport: Arc<T>,
    session: Arc<Session>,
    inbound: mpsc::Sender<Bytes>,
    outbound: Mutex<Option<mpsc::Receiver<T::Outbound>>>,
    errors: mpsc::Sender<TransportError>,
    reading: AtomicBool,
}

impl<T: Transport> BaseIoThread<T> {
    /// Create a driver over `transport` using existing conduit ends.
    pub fn new(
        id: impl Into<ConnectionId>,
        transport: Arc<T>,
        channels: DriverChannels<T::Outbound>,
    ) -> Self {
        Self {
            id: id.into(),
            transport,
            session: Arc::new(Session::new()),
            inbound: channels.inbound,
            outbound: Mutex::new(Some(channels.outbound)),
            errors: channels.errors,
            reading: AtomicBool::new(false),
        }
    }

    /// Create a driver together with fresh conduits sized by `settings`.
    pub fn with_channels(
        id: impl Into<ConnectionId>,
        transport: Arc<T>,
        settings: &ChannelSettings,
    ) -> (Self, Downstream<T::Outbound>) {
        let (driver_side, downstream) = channels(settings);
        (Self::new(id, transport, driver_side), downstream)
    }

    /// The session bound to this connection.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The transport this connection drives.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Read one payload, run `execute` on it, and write back the response.
    ///
    /// For request/response exchanges that do not need the full loop. The
    /// write follows the loop's policy: a failure is logged and swallowed.
    /// Fails with [`IoThreadError::AlreadyStarted`] while the loop (or
    /// another `run_once`) owns the read side.
    pub async fn run_once<F, Fut>(&self, cancel: CancellationToken, execute: F) -> Result<()>
    where
        F: FnOnce(Bytes, Arc<Session>) -> Fut + Send,
        Fut: Future<Output = T::Outbound> + Send,
    {
        if self.reading.swap(true, Ordering::SeqCst) {
            return Err(IoThreadError::AlreadyStarted);
        }
        // released even if this future is dropped mid-exchange
        let _release = ReadRelease(&self.reading);
        self.exchange_once(&cancel, execute).await
    }

    async fn exchange_once<F, Fut>(&self, cancel: &CancellationToken, execute: F) -> Result<()>
    where
        F: FnOnce(Bytes, Arc<Session>) -> Fut + Send,
        Fut: Future<Output = T::Outbound> + Send,
    {
        let payload = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(IoThreadError::Cancelled),
            read = self.transport.read(cancel) => read.map_err(IoThreadError::Read)?,
        };
        counter!(IOTHREAD_INBOUND_FRAMES_TOTAL).increment(1);

        let response = execute(payload, self.session.clone()).await;
        self.write_outbound(cancel, response).await;
        Ok(())
    }

    #[instrument(skip_all, fields(conn_id = %self.id))]
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        if self.reading.swap(true, Ordering::SeqCst) {
            return Err(IoThreadError::AlreadyStarted);
        }
        let Some(mut outbound) = self.outbound.lock().take() else {
            return Err(IoThreadError::AlreadyStarted);
        };

        debug!("starting io thread");
        counter!(IOTHREAD_STARTED_TOTAL).increment(1);
        gauge!(IOTHREAD_ACTIVE).increment(1.0);
        let _active = ActiveGauge;

        // the pump lives in a child scope, cancelled on every exit path
        let pump_token = cancel.child_token();
        let _pump_guard = pump_token.clone().drop_guard();
        let (pump, PumpEvents { mut data, mut error }) =
            InputPump::new(self.transport.clone(), pump_token);
        let _pump = tokio::spawn(pump.run());

        let mut outbound_open = true;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(self.cancelled()),
                Some(payload) = data.recv() => {
                    self.forward_inbound(&cancel, payload).await?;
                }
                read_error = &mut error => {
                    return Err(self.read_failed(&cancel, &mut data, read_error).await);
                }
                item = outbound.recv(), if outbound_open => match item {
                    Some(item) => self.write_outbound(&cancel, item).await,
                    None => {
                        debug!("outbound queue closed, continuing with inbound only");
                        outbound_open = false;
                    }
                },
            }
        }
    }

    fn cancelled(&self) -> IoThreadError {
        if let Err(err) = self.stop() {
            warn!(error = %err, "error stopping io thread");
        }
        IoThreadError::Cancelled
    }

    /// Deliver one payload downstream, waiting for queue space.
    async fn forward_inbound(&self, cancel: &CancellationToken, payload: Bytes) -> Result<()> {
        trace!(len = payload.len(), "forwarding inbound payload");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(self.cancelled()),
            sent = self.inbound.send(payload) => match sent {
                Ok(()) => {
                    counter!(IOTHREAD_INBOUND_FRAMES_TOTAL).increment(1);
                    Ok(())
                }
                Err(_) => {
                    warn!("downstream inbound queue closed");
                    Err(IoThreadError::InboundClosed)
                }
            },
        }
    }

    /// Handle the pump's terminal event and produce the loop's exit error.
    async fn read_failed(
        &self,
        cancel: &CancellationToken,
        data: &mut mpsc::Receiver<Bytes>,
        read_error: std::result::Result<TransportError, oneshot::error::RecvError>,
    ) -> IoThreadError {
        let Ok(err) = read_error else {
            // the pump only exits silently when cancelled or if it panicked
            if cancel.is_cancelled() {
                return self.cancelled();
            }
            warn!("input pump exited without reporting an error");
            return IoThreadError::PumpExited;
        };

        // payloads handed off before the failure go downstream first
        while let Ok(payload) = data.try_recv() {
            if let Err(exit) = self.forward_inbound(cancel, payload).await {
                return exit;
            }
        }

        debug!(error = %err, "read error in io thread, connection closed possibly");
        counter!(IOTHREAD_READ_ERRORS_TOTAL).increment(1);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            sent = self.errors.send(err.clone()) => {
                if sent.is_err() {
                    debug!("error sink closed, dropping read error");
                }
            }
        }
        IoThreadError::Read(err)
    }

    async fn write_outbound(&self, cancel: &CancellationToken, item: T::Outbound) {
        match self.transport.write(cancel, item).await {
            Ok(()) => {
                counter!(IOTHREAD_OUTBOUND_FRAMES_TOTAL).increment(1);
                trace!("wrote response to client");
            }
            Err(err) => {
                counter!(IOTHREAD_WRITE_FAILURES_TOTAL).increment(1);
                debug!(error = %err, "error while sending response to the client");
            }
        }
    }
}

#[async_trait]
impl<T: Transport> IoThread for BaseIoThread<T> {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.run(cancel).await
    }

    fn stop(&self) -> Result<()> {
        debug!(conn_id = %self.id, "stopping io thread");
        self.session.expire();
        Ok(())
    }
}

struct ReadRelease<'a>(&'a AtomicBool);

impl Drop for ReadRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ActiveGauge;

impl Drop for ActiveGauge {
    fn drop(&mut self) {
        gauge!(IOTHREAD_ACTIVE).decrement(1.0);
    }
}
