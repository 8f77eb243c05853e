//! # iothread-server
//!
//! Reference TCP echo server. Each accepted socket gets a
//! [`StreamTransport`](iothread_runtime::StreamTransport), a
//! [`BaseIoThread`](iothread_runtime::BaseIoThread), and an echo processor
//! on the downstream side of its channels.

#![deny(unsafe_code)]

pub mod errors;
pub mod server;

pub use errors::{Result, ServerError};
pub use server::EchoServer;
