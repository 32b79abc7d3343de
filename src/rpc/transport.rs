//! Channel transports.
//!
//! # Responsibilities
//! - Move [`Message`]s between two peers, in order
//! - In-process loopback over `tokio::sync::mpsc`
//! - Byte streams framed with a length prefix (pipes, sockets, child stdio)
//!
//! # Design Decisions
//! - Transports only move frames; correlation lives in [`RpcPeer`](super::RpcPeer)
//! - `receive` returning `Ok(None)` means the other side closed cleanly

use async_trait::async_trait;
use axum::body::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use super::message::Message;
use super::RpcError;

/// Sending half of a channel.
#[async_trait]
pub trait MessageSink: Send + 'static {
    async fn send(&mut self, message: Message) -> Result<(), RpcError>;

    /// Flush and close; the remote source then observes end of stream.
    async fn close(&mut self) -> Result<(), RpcError>;
}

/// Receiving half of a channel.
#[async_trait]
pub trait MessageSource: Send + 'static {
    async fn receive(&mut self) -> Result<Option<Message>, RpcError>;
}

/// One endpoint of a bidirectional channel.
pub struct Channel {
    pub sink: Box<dyn MessageSink>,
    pub source: Box<dyn MessageSource>,
}

impl Channel {
    pub fn new(sink: impl MessageSink, source: impl MessageSource) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }

    /// Two connected in-process endpoints.
    pub fn loopback() -> (Channel, Channel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Channel::new(LoopbackSink(Some(a_tx)), LoopbackSource(b_rx)),
            Channel::new(LoopbackSink(Some(b_tx)), LoopbackSource(a_rx)),
        )
    }

    /// Endpoint over a duplex byte stream.
    pub fn framed<T>(io: T) -> Channel
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::from_halves(reader, writer)
    }

    /// Endpoint over separate read and write streams, e.g. a child's stdout and stdin.
    pub fn from_halves<R, W>(reader: R, writer: W) -> Channel
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Channel::new(
            FramedSink(FramedWrite::new(writer, LengthDelimitedCodec::new())),
            FramedSource(FramedRead::new(reader, LengthDelimitedCodec::new())),
        )
    }
}

struct LoopbackSink(Option<mpsc::UnboundedSender<Message>>);

#[async_trait]
impl MessageSink for LoopbackSink {
    async fn send(&mut self, message: Message) -> Result<(), RpcError> {
        let tx = self.0.as_ref().ok_or(RpcError::Closed)?;
        tx.send(message).map_err(|_| RpcError::Closed)
    }

    async fn close(&mut self) -> Result<(), RpcError> {
        self.0.take();
        Ok(())
    }
}

struct LoopbackSource(mpsc::UnboundedReceiver<Message>);

#[async_trait]
impl MessageSource for LoopbackSource {
    async fn receive(&mut self) -> Result<Option<Message>, RpcError> {
        Ok(self.0.recv().await)
    }
}

struct FramedSink<W>(FramedWrite<W, LengthDelimitedCodec>);

#[async_trait]
impl<W> MessageSink for FramedSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: Message) -> Result<(), RpcError> {
        let frame = Bytes::from(serde_json::to_vec(&message)?);
        SinkExt::<Bytes>::send(&mut self.0, frame).await.map_err(RpcError::Io)
    }

    async fn close(&mut self) -> Result<(), RpcError> {
        SinkExt::<Bytes>::close(&mut self.0).await.map_err(RpcError::Io)
    }
}

struct FramedSource<R>(FramedRead<R, LengthDelimitedCodec>);

#[async_trait]
impl<R> MessageSource for FramedSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<Option<Message>, RpcError> {
        match self.0.next().await {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame?)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn note(method: &str) -> Message {
        Message::Notification {
            method: method.into(),
            params: Value::Null,
        }
    }

    #[tokio::test]
    async fn test_loopback_preserves_order() {
        let (mut a, mut b) = Channel::loopback();
        a.sink.send(note("one")).await.unwrap();
        a.sink.send(note("two")).await.unwrap();

        assert_eq!(b.source.receive().await.unwrap(), Some(note("one")));
        assert_eq!(b.source.receive().await.unwrap(), Some(note("two")));

        a.sink.close().await.unwrap();
        assert_eq!(b.source.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_framed_over_duplex() {
        let (left, right) = tokio::io::duplex(1024);
        let mut a = Channel::framed(left);
        let mut b = Channel::framed(right);

        a.sink.send(note("hello")).await.unwrap();
        assert_eq!(b.source.receive().await.unwrap(), Some(note("hello")));

        a.sink.close().await.unwrap();
        drop(a);
        assert_eq!(b.source.receive().await.unwrap(), None);
    }
}
