//! A [`Transport`] over any split byte stream, framed by a configurable codec.

use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use iothread_core::{Transport, TransportError};
use iothread_settings::{FrameCodec, TransportSettings};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{
    BytesCodec, Decoder, Encoder, FramedRead, FramedWrite, LengthDelimitedCodec,
    LengthDelimitedCodecError,
};
use tokio_util::sync::CancellationToken;

/// Framing applied to a byte stream.
#[derive(Debug)]
pub enum WireCodec {
    /// Whatever bytes are available form one payload.
    Raw(BytesCodec),
    /// Each payload carries a 4-byte big-endian length prefix.
    LengthDelimited(LengthDelimitedCodec),
}

impl WireCodec {
    /// Build the codec described by `settings`.
    pub fn from_settings(settings: &TransportSettings) -> Self {
        match settings.codec {
            FrameCodec::Raw => Self::Raw(BytesCodec::new()),
            FrameCodec::LengthDelimited => Self::LengthDelimited(
                LengthDelimitedCodec::builder()
                    .max_frame_length(settings.max_frame_size)
                    .new_codec(),
            ),
        }
    }
}

impl Decoder for WireCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        match self {
            Self::Raw(codec) => codec.decode(src),
            Self::LengthDelimited(codec) => codec.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        match self {
            Self::Raw(codec) => codec.decode_eof(src),
            Self::LengthDelimited(codec) => codec.decode_eof(src),
        }
    }
}

impl Encoder<Bytes> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        match self {
            Self::Raw(codec) => codec.encode(item, dst),
            Self::LengthDelimited(codec) => codec.encode(item, dst),
        }
    }
}

/// Framed transport over a reader and writer pair.
///
/// The halves are locked independently, so a read in flight never blocks a
/// concurrent write.
pub struct StreamTransport<R, W> {
    reader: Mutex<FramedRead<R, WireCodec>>,
    writer: Mutex<FramedWrite<W, WireCodec>>,
    max_frame_size: usize,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap `reader` and `writer` with the framing from `settings`.
    pub fn new(reader: R, writer: W, settings: &TransportSettings) -> Self {
        Self {
            reader: Mutex::new(FramedRead::with_capacity(
                reader,
                WireCodec::from_settings(settings),
                settings.read_buffer_size,
            )),
            writer: Mutex::new(FramedWrite::new(writer, WireCodec::from_settings(settings))),
            max_frame_size: settings.max_frame_size,
        }
    }
}

impl StreamTransport<OwnedReadHalf, OwnedWriteHalf> {
    /// Split a TCP stream into a transport.
    pub fn tcp(stream: TcpStream, settings: &TransportSettings) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, settings)
    }
}

fn map_read_error(err: io::Error, max: usize) -> TransportError {
    let oversized = err
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if oversized {
        TransportError::FrameTooLarge { max }
    } else {
        TransportError::from(err)
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Outbound = Bytes;

    async fn read(&self, cancel: &CancellationToken) -> Result<Bytes, TransportError> {
        let mut reader = self.reader.lock().await;
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransportError::Cancelled),
            next = reader.next() => next,
        };
        match next {
            None => Err(TransportError::Closed),
            Some(Err(err)) => Err(map_read_error(err, self.max_frame_size)),
            Some(Ok(frame)) if frame.len() > self.max_frame_size => {
                Err(TransportError::FrameTooLarge {
                    max: self.max_frame_size,
                })
            }
            Some(Ok(frame)) => Ok(frame.freeze()),
        }
    }

    async fn write(&self, cancel: &CancellationToken, item: Bytes) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            sent = writer.send(item) => sent.map_err(TransportError::from),
        }
    }
}
