//! The three conduits between a connection and its downstream processor.
//!
//! ```text
//!                 inbound (Bytes)           outbound (O)          errors
//! BaseIoThread ──────────────────▶ ◀──────────────────────  ──────────────▶ downstream
//! ```

use bytes::Bytes;
use iothread_core::TransportError;
use iothread_settings::ChannelSettings;
use tokio::sync::mpsc;

/// Connection-side ends of the conduits.
pub struct DriverChannels<O> {
    /// Where inbound payloads are delivered.
    pub inbound: mpsc::Sender<Bytes>,
    /// Where outbound values are taken from.
    pub outbound: mpsc::Receiver<O>,
    /// Where the terminal read error is delivered.
    pub errors: mpsc::Sender<TransportError>,
}

/// Processor-side ends of the conduits.
pub struct Downstream<O> {
    /// Inbound payloads in transport order.
    pub inbound: mpsc::Receiver<Bytes>,
    /// Outbound values to write. Clone it to have several producers.
    pub outbound: mpsc::Sender<O>,
    /// At most one terminal read error.
    pub errors: mpsc::Receiver<TransportError>,
}

/// Create a matched pair of conduit ends sized by `settings`.
///
/// Zero capacities are raised to one; `mpsc` channels cannot be unbuffered.
pub fn channels<O>(settings: &ChannelSettings) -> (DriverChannels<O>, Downstream<O>) {
    let (inbound_tx, inbound_rx) = mpsc::channel(settings.inbound_capacity.max(1));
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity.max(1));
    let (errors_tx, errors_rx) = mpsc::channel(settings.error_capacity.max(1));

    (
        DriverChannels {
            inbound: inbound_tx,
            outbound: outbound_rx,
            errors: errors_tx,
        },
        Downstream {
            inbound: inbound_rx,
            outbound: outbound_tx,
            errors: errors_rx,
        },
    )
}
