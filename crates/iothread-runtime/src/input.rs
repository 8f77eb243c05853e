//! The input pump: a subordinate task that reads the transport and hands
//! each result to the driver.

use std::sync::Arc;

use bytes::Bytes;
use iothread_core::{Transport, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Capacity of the pump→driver data conduit.
///
/// One slot keeps at most one payload in flight between the tasks, so the
/// pump never runs ahead of the driver by more than a single read.
pub(crate) const PUMP_DATA_CAPACITY: usize = 1;

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpExit {
    /// The governing token fired.
    Cancelled,
    /// A read failed and the error was handed off.
    Failed,
    /// The driver dropped its end of a conduit.
    DriverGone,
}

/// Driver-side ends of the pump's two private conduits.
pub(crate) struct PumpEvents {
    pub(crate) data: mpsc::Receiver<Bytes>,
    pub(crate) error: oneshot::Receiver<TransportError>,
}

pub(crate) struct InputPump<T> {
    transport: Arc<T>,
    cancel: CancellationToken,
    data: mpsc::Sender<Bytes>,
    error: oneshot::Sender<TransportError>,
}

impl<T: Transport> InputPump<T> {
    /// Build a pump governed by `cancel` and the conduits it reports into.
    pub(crate) fn new(transport: Arc<T>, cancel: CancellationToken) -> (Self, PumpEvents) {
        let (data_tx, data_rx) = mpsc::channel(PUMP_DATA_CAPACITY);
        let (error_tx, error_rx) = oneshot::channel();
        let pump = Self {
            transport,
            cancel,
            data: data_tx,
            error: error_tx,
        };
        let events = PumpEvents {
            data: data_rx,
            error: error_rx,
        };
        (pump, events)
    }

    /// Read until cancelled or the transport fails.
    ///
    /// Emits zero or one error. Both conduits are dropped on return, which
    /// closes them for the driver.
    pub(crate) async fn run(self) -> PumpExit {
        let Self {
            transport,
            cancel,
            data,
            error,
        } = self;

        let exit = loop {
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => break PumpExit::Cancelled,
                read = transport.read(&cancel) => read,
            };

            match read {
                Ok(payload) => {
                    trace!(len = payload.len(), "read inbound payload");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break PumpExit::Cancelled,
                        sent = data.send(payload) => {
                            if sent.is_err() {
                                break PumpExit::DriverGone;
                            }
                        }
                    }
                }
                Err(err) => {
                    // a read aborted by our own token is shutdown, not failure
                    if cancel.is_cancelled() {
                        break PumpExit::Cancelled;
                    }
                    debug!(error = %err, "read failed, input pump exiting");
                    break match error.send(err) {
                        Ok(()) => PumpExit::Failed,
                        Err(_) => PumpExit::DriverGone,
                    };
                }
            }
        };

        debug!(?exit, "input pump stopped");
        exit
    }
}
