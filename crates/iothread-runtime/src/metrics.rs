//! Metric names emitted through the `metrics` facade.
//!
//! Nothing here installs a recorder; without one every call is a no-op.

/// IO threads started (counter).
pub const IOTHREAD_STARTED_TOTAL: &str = "iothread_started_total";
/// IO threads currently running their loop (gauge).
pub const IOTHREAD_ACTIVE: &str = "iothread_active";
/// Inbound payloads delivered downstream (counter).
pub const IOTHREAD_INBOUND_FRAMES_TOTAL: &str = "iothread_inbound_frames_total";
/// Outbound values written to the transport (counter).
pub const IOTHREAD_OUTBOUND_FRAMES_TOTAL: &str = "iothread_outbound_frames_total";
/// Outbound writes that failed and were dropped (counter).
pub const IOTHREAD_WRITE_FAILURES_TOTAL: &str = "iothread_write_failures_total";
/// Loops ended by a transport read failure (counter).
pub const IOTHREAD_READ_ERRORS_TOTAL: &str = "iothread_read_errors_total";
