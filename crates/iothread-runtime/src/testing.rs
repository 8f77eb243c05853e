//! A scripted in-memory [`Transport`] for tests.
//!
//! Reads are fed through a [`ReadFeed`]; when the feed is empty a read waits
//! (until cancelled), which models a peer that has nothing to say. Writes are
//! recorded, and individual writes can be scripted to fail.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use iothread_core::{Transport, TransportError};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

type ReadResult = Result<Bytes, TransportError>;

/// Pushes read results into a [`ScriptedTransport`].
#[derive(Clone)]
pub struct ReadFeed {
    tx: mpsc::UnboundedSender<ReadResult>,
}

impl ReadFeed {
    /// Queue a payload for a future read.
    pub fn data(&self, payload: impl Into<Bytes>) {
        let _ = self.tx.send(Ok(payload.into()));
    }

    /// Queue a read failure.
    pub fn fail(&self, err: TransportError) {
        let _ = self.tx.send(Err(err));
    }
}

/// In-memory transport with scripted reads and recorded writes.
pub struct ScriptedTransport {
    reads: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReadResult>>,
    reads_started: AtomicUsize,
    write_script: Mutex<VecDeque<Result<(), TransportError>>>,
    written: Mutex<Vec<Bytes>>,
    write_attempts: watch::Sender<usize>,
}

impl ScriptedTransport {
    /// Create a transport and the feed that drives its reads.
    pub fn new() -> (Arc<Self>, ReadFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (write_attempts, _) = watch::channel(0);
        let transport = Arc::new(Self {
            reads: tokio::sync::Mutex::new(rx),
            reads_started: AtomicUsize::new(0),
            write_script: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            write_attempts,
        });
        (transport, ReadFeed { tx })
    }

    /// Script the outcome of the next unscripted write. Writes with no
    /// scripted outcome succeed.
    pub fn script_write(&self, outcome: Result<(), TransportError>) {
        self.write_script.lock().push_back(outcome);
    }

    /// Number of reads begun so far.
    pub fn reads_started(&self) -> usize {
        self.reads_started.load(Ordering::SeqCst)
    }

    /// Payloads whose write succeeded, in write order.
    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }

    /// Number of writes attempted, successful or not.
    pub fn write_attempts(&self) -> usize {
        *self.write_attempts.borrow()
    }

    /// Wait until at least `n` writes have been attempted.
    pub async fn wait_for_write_attempts(&self, n: usize) {
        let mut rx = self.write_attempts.subscribe();
        let _ = rx.wait_for(|attempts| *attempts >= n).await;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Outbound = Bytes;

    async fn read(&self, cancel: &CancellationToken) -> Result<Bytes, TransportError> {
        let _ = self.reads_started.fetch_add(1, Ordering::SeqCst);
        let mut reads = self.reads.lock().await;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            next = reads.recv() => match next {
                Some(result) => result,
                None => {
                    // feed dropped: behave like a silent peer
                    cancel.cancelled().await;
                    Err(TransportError::Cancelled)
                }
            },
        }
    }

    async fn write(&self, _cancel: &CancellationToken, item: Bytes) -> Result<(), TransportError> {
        let outcome = self.write_script.lock().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.written.lock().push(item);
        }
        self.write_attempts.send_modify(|attempts| *attempts += 1);
        outcome
    }
}
