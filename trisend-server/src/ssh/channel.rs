//! Byte plumbing between an SSH channel and an upload session

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::transfers::SessionOutput;

/// SSH extended data type code for stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Session output written to an SSH channel
pub struct ChannelOutput {
    handle: Handle,
    channel: ChannelId,
}

impl ChannelOutput {
    pub fn new(handle: Handle, channel: ChannelId) -> Self {
        Self { handle, channel }
    }

    /// Send the exit status and close the channel
    pub async fn finish(&self, status: u32) {
        let _ = self.handle.exit_status_request(self.channel, status).await;
        let _ = self.handle.eof(self.channel).await;
        let _ = self.handle.close(self.channel).await;
    }
}

#[async_trait]
impl SessionOutput for ChannelOutput {
    async fn stdout(&self, text: &str) {
        let _ = self
            .handle
            .data(self.channel, CryptoVec::from_slice(text.as_bytes()))
            .await;
    }

    async fn stderr(&self, text: &str) {
        let _ = self
            .handle
            .extended_data(
                self.channel,
                SSH_EXTENDED_DATA_STDERR,
                CryptoVec::from_slice(text.as_bytes()),
            )
            .await;
    }
}

/// What the session handler sends to an upload's stdin
enum StdinEvent {
    Data(Bytes),
    /// The client sent EOF; everything before it is the complete input
    Eof,
}

/// Forwards stdin bytes from the session handler to an upload
///
/// Stops forwarding once `ceiling` bytes went through. The upload then sees
/// exactly the ceiling and reports overflow, while anything the client sends
/// after that is discarded instead of piling up in memory.
///
/// Only [`StdinForward::close`] ends the input cleanly. Dropping the
/// forwarder without it (channel closed, connection lost) makes the reader
/// fail with `UnexpectedEof`.
pub struct StdinForward {
    tx: Option<mpsc::UnboundedSender<StdinEvent>>,
    forwarded: u64,
    ceiling: u64,
}

impl StdinForward {
    /// Create a forwarder and the reader the upload consumes
    pub fn new(ceiling: u64) -> (Self, ChannelReader) {
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = Self {
            tx: Some(tx),
            forwarded: 0,
            ceiling,
        };
        (forward, ChannelReader::new(rx))
    }

    /// Forward one chunk of channel data
    pub fn push(&mut self, data: &[u8]) {
        let room = self.ceiling.saturating_sub(self.forwarded);
        let take = data.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        if take == 0 {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };
        let chunk = Bytes::copy_from_slice(&data[..take]);
        if tx.send(StdinEvent::Data(chunk)).is_err() {
            // Upload no longer reading
            self.tx = None;
            return;
        }
        self.forwarded += take as u64;
    }

    /// Signal end of input
    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(StdinEvent::Eof);
        }
    }
}

/// `AsyncRead` over the chunks a [`StdinForward`] sends
pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<StdinEvent>,
    pending: Bytes,
    eof: bool,
}

impl ChannelReader {
    fn new(rx: mpsc::UnboundedReceiver<StdinEvent>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
            eof: false,
        }
    }
}

impl AsyncRead for ChannelReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(StdinEvent::Data(chunk))) => this.pending = chunk,
                Poll::Ready(Some(StdinEvent::Eof)) => this.eof = true,
                // Forwarder dropped without EOF: the input is truncated
                Poll::Ready(None) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "ssh channel closed before end of input",
                    )));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_forwarded_bytes_read_in_order() {
        let (mut forward, mut reader) = StdinForward::new(100);
        forward.push(b"hello ");
        forward.push(b"world");
        forward.close();

        let mut contents = String::new();
        reader.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "hello world");
    }

    #[tokio::test]
    async fn test_forwarding_stops_at_ceiling() {
        let (mut forward, mut reader) = StdinForward::new(8);
        forward.push(b"12345");
        forward.push(b"67890");
        forward.push(b"more");
        forward.close();

        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"12345678");
    }

    #[tokio::test]
    async fn test_small_reads_drain_pending() {
        let (mut forward, mut reader) = StdinForward::new(100);
        forward.push(b"abcdef");
        forward.close();

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_forwarder_is_truncated_input() {
        let (mut forward, mut reader) = StdinForward::new(100);
        forward.push(b"partial");
        drop(forward);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 7);
        assert_eq!(&buf[..7], b"partial");
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_reads_after_eof_stay_at_eof() {
        let (mut forward, mut reader) = StdinForward::new(100);
        forward.push(b"x");
        forward.close();
        drop(forward);

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 1);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_push_after_reader_dropped() {
        let (mut forward, reader) = StdinForward::new(100);
        drop(reader);
        forward.push(b"ignored");
        forward.push(b"still ignored");
    }
}
