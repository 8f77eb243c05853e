//! # iothread-runtime
//!
//! Tokio implementation of the per-connection I/O driver:
//!
//! - **Driver**: [`BaseIoThread`] multiplexes cancellation, inbound reads,
//!   read errors and outbound writes for one transport
//! - **Channels**: the inbound/outbound/error conduits to a downstream processor
//! - **Stream transport**: [`StreamTransport`] frames any `AsyncRead`/`AsyncWrite` pair
//! - **Shutdown**: [`ShutdownCoordinator`] drains connection tasks on exit
//! - **Testing**: [`testing::ScriptedTransport`] for driving connections in tests

#![deny(unsafe_code)]

pub mod channels;
pub mod driver;
mod input;
pub mod metrics;
pub mod shutdown;
pub mod stream;
pub mod testing;

pub use channels::{Downstream, DriverChannels, channels};
pub use driver::BaseIoThread;
pub use shutdown::ShutdownCoordinator;
pub use stream::{StreamTransport, WireCodec};
