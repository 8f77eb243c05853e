//! `EchoServer`: a TCP accept loop with one `BaseIoThread` per connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use iothread_core::{ConnectionId, IoThread, IoThreadError};
use iothread_runtime::{BaseIoThread, Downstream, ShutdownCoordinator, StreamTransport};
use iothread_settings::IoThreadSettings;
use metrics::counter;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::errors::{Result, ServerError};

/// Connections accepted and handed to a driver (counter).
pub const CONNECTIONS_ACCEPTED_TOTAL: &str = "iothread_connections_accepted_total";
/// Connections refused because the server was full (counter).
pub const CONNECTIONS_REJECTED_TOTAL: &str = "iothread_connections_rejected_total";

type TcpTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

/// Echo server: every inbound payload is written back to its sender.
pub struct EchoServer {
    settings: Arc<IoThreadSettings>,
    shutdown: ShutdownCoordinator,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl EchoServer {
    /// Create a server from validated settings.
    pub fn new(settings: IoThreadSettings) -> Self {
        let capacity = settings.server.max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            settings: Arc::new(settings),
            shutdown: ShutdownCoordinator::new(),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// The settings this server runs with.
    pub fn settings(&self) -> &IoThreadSettings {
        &self.settings
    }

    /// The shutdown coordinator tracking every connection task.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Number of connections currently open.
    pub fn connection_count(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Bind the configured host and port.
    pub async fn bind(&self) -> Result<TcpListener> {
        let server = &self.settings.server;
        let addr = format!("{}:{}", server.host, server.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Accept connections until shutdown begins.
    ///
    /// Connections over `max_connections` are closed immediately. Accept
    /// errors are logged and the loop continues.
    pub async fn serve(&self, listener: TcpListener) {
        let token = self.shutdown.token();
        info!(
            max_connections = self.settings.server.max_connections,
            "accepting connections"
        );

        loop {
            let accepted = tokio::select! {
                () = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
                warn!(%peer, "connection limit reached, rejecting");
                drop(stream);
                continue;
            };

            counter!(CONNECTIONS_ACCEPTED_TOTAL).increment(1);
            let conn_id = ConnectionId::new();
            let span = info_span!("connection", conn_id = %conn_id, %peer);
            let _ = self.shutdown.spawn(
                serve_connection(
                    conn_id,
                    stream,
                    self.settings.clone(),
                    token.child_token(),
                    permit,
                )
                .instrument(span),
            );
        }
        info!("accept loop stopped");
    }

    /// Stop accepting, cancel every connection, and wait for them to finish.
    pub async fn graceful_shutdown(&self) -> bool {
        let timeout = Duration::from_secs(self.settings.server.shutdown_timeout_secs);
        self.shutdown.graceful_shutdown(timeout).await
    }
}

async fn serve_connection(
    conn_id: ConnectionId,
    stream: TcpStream,
    settings: Arc<IoThreadSettings>,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let (thread, downstream) = open_driver(conn_id, stream, &settings);
    info!(session_id = %thread.session().id(), "connection opened");

    let echo = tokio::spawn(echo(downstream).in_current_span());
    match thread.start(cancel).await {
        Err(err) if err.is_peer_closed() => debug!("peer closed connection"),
        Err(IoThreadError::Cancelled) => debug!("connection cancelled"),
        Err(err) => warn!(error = %err, "connection ended with error"),
        Ok(()) => {}
    }

    // dropping the driver closes inbound, which ends the echo task
    drop(thread);
    if let Err(err) = echo.await {
        warn!(error = %err, "echo task failed");
    }
    info!("connection closed");
}

/// Wrap an accepted socket in a driver. The session stays pending: the echo
/// protocol has no authentication step.
fn open_driver(
    conn_id: ConnectionId,
    stream: TcpStream,
    settings: &IoThreadSettings,
) -> (BaseIoThread<TcpTransport>, Downstream<Bytes>) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "failed to set TCP_NODELAY");
    }
    let transport = Arc::new(StreamTransport::tcp(stream, &settings.transport));
    BaseIoThread::with_channels(conn_id, transport, &settings.channels)
}

/// Write every inbound payload back until the connection ends.
async fn echo(downstream: Downstream<Bytes>) {
    let Downstream {
        mut inbound,
        outbound,
        mut errors,
    } = downstream;

    while let Some(payload) = inbound.recv().await {
        if outbound.send(payload).await.is_err() {
            break;
        }
    }
    if let Ok(err) = errors.try_recv() {
        debug!(error = %err, "read error delivered to processor");
    }
}
