//! # iothread-core
//!
//! Foundation types shared by every iothread crate:
//!
//! - **IDs**: [`ConnectionId`] and [`SessionId`] newtypes (UUID v7)
//! - **Session**: per-connection auth state with an expiry hook
//! - **Transport**: the [`Transport`] contract a connection is driven through
//! - **Errors**: [`TransportError`] and [`IoThreadError`] via `thiserror`
//! - **`IoThread`**: the `{ id, start, stop }` capability trait
//! - **Logging**: subscriber setup and test capture helpers

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod session;
pub mod thread;
pub mod transport;

pub use errors::{IoThreadError, Result, TransportError};
pub use ids::{ConnectionId, SessionId};
pub use session::{Session, SessionStatus};
pub use thread::IoThread;
pub use transport::Transport;
