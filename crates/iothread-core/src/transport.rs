//! The transport contract a connection is driven through.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;

/// A duplex endpoint that yields raw inbound payloads and accepts outbound
/// values.
///
/// `read` and `write` take `&self` because they run concurrently from two
/// tasks: the input pump reads while the driver writes. Implementations must
/// therefore keep their read and write halves independently synchronized.
///
/// `read` should return promptly with [`TransportError::Cancelled`] once
/// `cancel` fires. A read that ignores the token delays pump shutdown until
/// it completes on its own.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Value type accepted by [`write`](Self::write). Encoding it onto the
    /// wire is the transport's concern.
    type Outbound: Send + 'static;

    /// Read the next inbound payload.
    ///
    /// A clean end of stream is reported as [`TransportError::Closed`].
    async fn read(&self, cancel: &CancellationToken) -> Result<Bytes, TransportError>;

    /// Write one outbound value.
    async fn write(
        &self,
        cancel: &CancellationToken,
        item: Self::Outbound,
    ) -> Result<(), TransportError>;
}
