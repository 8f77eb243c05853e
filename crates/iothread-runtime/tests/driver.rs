//! End-to-end tests driving `BaseIoThread` through scripted and stream transports.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use iothread_core::{IoThread, IoThreadError, TransportError};
use iothread_runtime::testing::ScriptedTransport;
use iothread_runtime::{BaseIoThread, ShutdownCoordinator, StreamTransport};
use iothread_settings::{ChannelSettings, FrameCodec, TransportSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

fn small_channels() -> ChannelSettings {
    ChannelSettings {
        inbound_capacity: 1,
        outbound_capacity: 1,
        error_capacity: 1,
    }
}

#[tokio::test]
async fn inbound_order_survives_slow_consumer() {
    let (transport, feed) = ScriptedTransport::new();
    let (thread, mut downstream) =
        BaseIoThread::with_channels("conn_order", transport, &small_channels());
    for i in 0..20u8 {
        feed.data(vec![i]);
    }
    feed.fail(TransportError::Closed);

    let task = tokio::spawn(async move { thread.start(CancellationToken::new()).await });

    for i in 0..20u8 {
        let payload = timeout(TIMEOUT, downstream.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload.as_ref(), &[i]);
        tokio::task::yield_now().await;
    }

    let result = timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert_matches!(result, Err(IoThreadError::Read(TransportError::Closed)));
    assert!(downstream.inbound.recv().await.is_none());
    assert_matches!(downstream.errors.recv().await, Some(TransportError::Closed));
}

#[tokio::test]
async fn outbound_items_written_once_in_order() {
    let (transport, feed) = ScriptedTransport::new();
    let (thread, downstream) = BaseIoThread::with_channels(
        "conn_out",
        transport.clone(),
        &ChannelSettings::default(),
    );
    let task = tokio::spawn(async move { thread.start(CancellationToken::new()).await });

    for i in 0..10u8 {
        downstream.outbound.send(Bytes::from(vec![i])).await.unwrap();
    }
    timeout(TIMEOUT, transport.wait_for_write_attempts(10))
        .await
        .unwrap();

    let expected: Vec<Bytes> = (0..10u8).map(|i| Bytes::from(vec![i])).collect();
    assert_eq!(transport.written(), expected);

    feed.fail(TransportError::Closed);
    let _ = timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert_eq!(transport.write_attempts(), 10);
}

#[tokio::test]
async fn outbound_written_before_cancel_stay_written_once() {
    let (transport, _feed) = ScriptedTransport::new();
    let (thread, downstream) = BaseIoThread::with_channels(
        "conn_out_cancel",
        transport.clone(),
        &ChannelSettings::default(),
    );
    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { thread.start(cancel).await })
    };

    for i in 0..5u8 {
        downstream.outbound.send(Bytes::from(vec![i])).await.unwrap();
    }
    timeout(TIMEOUT, transport.wait_for_write_attempts(5))
        .await
        .unwrap();

    cancel.cancel();
    let result = timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert_matches!(result, Err(IoThreadError::Cancelled));

    let expected: Vec<Bytes> = (0..5u8).map(|i| Bytes::from(vec![i])).collect();
    assert_eq!(transport.write_attempts(), 5);
    assert_eq!(transport.written(), expected);

    // the loop owned the outbound receiver, so the queue is closed now
    assert!(downstream.outbound.send(Bytes::from_static(b"late")).await.is_err());
    tokio::task::yield_now().await;
    assert_eq!(transport.write_attempts(), 5);
}

#[tokio::test]
async fn cloned_producers_share_the_outbound_queue() {
    let (transport, feed) = ScriptedTransport::new();
    let (thread, downstream) = BaseIoThread::with_channels(
        "conn_multi",
        transport.clone(),
        &ChannelSettings::default(),
    );
    let task = tokio::spawn(async move { thread.start(CancellationToken::new()).await });

    let producers: Vec<_> = (0..4u8)
        .map(|p| {
            let outbound = downstream.outbound.clone();
            tokio::spawn(async move {
                for i in 0..5u8 {
                    outbound.send(Bytes::from(vec![p, i])).await.unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    timeout(TIMEOUT, transport.wait_for_write_attempts(20))
        .await
        .unwrap();

    let written = transport.written();
    assert_eq!(written.len(), 20);
    // per-producer order is preserved
    for p in 0..4u8 {
        let seq: Vec<u8> = written.iter().filter(|b| b[0] == p).map(|b| b[1]).collect();
        assert_eq!(seq, vec![0, 1, 2, 3, 4]);
    }

    feed.fail(TransportError::Closed);
    let _ = timeout(TIMEOUT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn cancellation_stops_reading_promptly() {
    let (transport, feed) = ScriptedTransport::new();
    let (thread, mut downstream) = BaseIoThread::with_channels(
        "conn_cancel",
        transport.clone(),
        &ChannelSettings::default(),
    );
    let thread = Arc::new(thread);
    let cancel = CancellationToken::new();
    let task = {
        let thread = thread.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { thread.start(cancel).await })
    };

    feed.data("before");
    assert_eq!(
        timeout(TIMEOUT, downstream.inbound.recv()).await.unwrap().unwrap(),
        "before"
    );

    cancel.cancel();
    let result = timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert_matches!(result, Err(IoThreadError::Cancelled));
    assert!(thread.session().is_expired());

    // the pump holds the last transport reference besides ours and the driver's
    timeout(TIMEOUT, async {
        while Arc::strong_count(&transport) > 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let reads = transport.reads_started();
    feed.data("after");
    tokio::task::yield_now().await;
    assert_eq!(transport.reads_started(), reads);
    assert!(downstream.inbound.try_recv().is_err());
    assert!(downstream.errors.try_recv().is_err());
}

#[tokio::test]
async fn cancellation_unblocks_full_inbound_queue() {
    let (transport, feed) = ScriptedTransport::new();
    let (thread, _downstream) =
        BaseIoThread::with_channels("conn_full", transport.clone(), &small_channels());
    for _ in 0..5 {
        feed.data("x");
    }
    let cancel = CancellationToken::new();
    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { thread.start(cancel).await })
    };

    // nobody drains inbound, so the driver blocks forwarding
    timeout(TIMEOUT, async {
        while transport.reads_started() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    let result = timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert_matches!(result, Err(IoThreadError::Cancelled));
}

#[tokio::test]
async fn write_failure_does_not_end_the_loop() {
    let (transport, feed) = ScriptedTransport::new();
    transport.script_write(Err(TransportError::Closed));
    let (thread, mut downstream) = BaseIoThread::with_channels(
        "conn_wfail",
        transport.clone(),
        &ChannelSettings::default(),
    );
    let task = tokio::spawn(async move { thread.start(CancellationToken::new()).await });

    downstream.outbound.send(Bytes::from_static(b"R1")).await.unwrap();
    downstream.outbound.send(Bytes::from_static(b"R2")).await.unwrap();
    timeout(TIMEOUT, transport.wait_for_write_attempts(2))
        .await
        .unwrap();
    assert_eq!(transport.written(), vec![Bytes::from_static(b"R2")]);

    // the loop still serves inbound after the failed write
    feed.data("later");
    assert_eq!(
        timeout(TIMEOUT, downstream.inbound.recv()).await.unwrap().unwrap(),
        "later"
    );
    assert!(downstream.errors.try_recv().is_err());

    feed.fail(TransportError::Closed);
    let result = timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert_matches!(result, Err(IoThreadError::Read(_)));
}

#[tokio::test]
async fn io_read_error_reaches_sink_and_caller() {
    let (transport, feed) = ScriptedTransport::new();
    let (thread, mut downstream) =
        BaseIoThread::with_channels("conn_io", transport, &ChannelSettings::default());
    let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
    feed.fail(reset.into());

    let result = timeout(TIMEOUT, thread.start(CancellationToken::new()))
        .await
        .unwrap();
    let err = result.unwrap_err();
    assert_eq!(
        err.read_error().and_then(TransportError::io_kind),
        Some(std::io::ErrorKind::ConnectionReset)
    );

    let sunk = downstream.errors.recv().await.unwrap();
    assert_eq!(sunk.io_kind(), Some(std::io::ErrorKind::ConnectionReset));
    drop(thread);
    assert!(downstream.errors.recv().await.is_none());
}

#[tokio::test]
async fn echo_over_length_delimited_stream() {
    let settings = TransportSettings {
        codec: FrameCodec::LengthDelimited,
        ..TransportSettings::default()
    };
    let (local, mut peer) = tokio::io::duplex(4096);
    let (reader, writer) = tokio::io::split(local);
    let transport = Arc::new(StreamTransport::new(reader, writer, &settings));
    let (thread, mut downstream) =
        BaseIoThread::with_channels("conn_echo", transport, &ChannelSettings::default());

    let shutdown = ShutdownCoordinator::new();
    let token = shutdown.token();
    let driver = shutdown.spawn(async move { thread.start(token).await });
    let _echo = shutdown.spawn(async move {
        while let Some(payload) = downstream.inbound.recv().await {
            if downstream.outbound.send(payload).await.is_err() {
                break;
            }
        }
    });

    peer.write_all(b"\x00\x00\x00\x04PING").await.unwrap();
    let mut reply = [0u8; 8];
    timeout(TIMEOUT, peer.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"\x00\x00\x00\x04PING");

    drop(peer);
    let result = timeout(TIMEOUT, driver).await.unwrap().unwrap();
    assert_matches!(result, Err(err) if err.is_peer_closed());
    assert!(shutdown.graceful_shutdown(TIMEOUT).await);
}
