//! The `IoThread` capability.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

/// One connection's I/O loop.
///
/// Specialized variants wrap an existing implementation and delegate to it
/// rather than re-implementing the loop.
#[async_trait]
pub trait IoThread: Send + Sync {
    /// Stable connection identity.
    fn id(&self) -> &str;

    /// Run the connection until `cancel` fires or the transport fails.
    ///
    /// Only returns `Err`: the loop itself never exits cleanly. A clean
    /// shutdown is signalled by a separate [`stop`](Self::stop) call.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Release connection-scoped state. Does not close the transport.
    fn stop(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::IoThreadError;
    use crate::session::Session;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Idle {
        session: Session,
    }

    #[async_trait]
    impl IoThread for Idle {
        fn id(&self) -> &str {
            "idle"
        }

        async fn start(&self, cancel: CancellationToken) -> Result<()> {
            cancel.cancelled().await;
            self.stop()?;
            Err(IoThreadError::Cancelled)
        }

        fn stop(&self) -> Result<()> {
            self.session.expire();
            Ok(())
        }
    }

    struct CountingStops<T> {
        inner: T,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl<T: IoThread> IoThread for CountingStops<T> {
        fn id(&self) -> &str {
            self.inner.id()
        }

        async fn start(&self, cancel: CancellationToken) -> Result<()> {
            self.inner.start(cancel).await
        }

        fn stop(&self) -> Result<()> {
            let _ = self.stops.fetch_add(1, Ordering::SeqCst);
            self.inner.stop()
        }
    }

    #[tokio::test]
    async fn wrapper_delegates_to_inner() {
        let stops = Arc::new(AtomicUsize::new(0));
        let thread = CountingStops {
            inner: Idle {
                session: Session::new(),
            },
            stops: stops.clone(),
        };
        assert_eq!(thread.id(), "idle");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = thread.start(cancel).await;
        assert_matches!(result, Err(IoThreadError::Cancelled));
        assert!(thread.inner.session.is_expired());

        thread.stop().unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn usable_as_trait_object() {
        let thread: Box<dyn IoThread> = Box::new(Idle {
            session: Session::new(),
        });
        assert_eq!(thread.id(), "idle");
        assert!(thread.stop().is_ok());
    }
}
