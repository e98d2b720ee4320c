//! Producer/consumer handoff
//!
//! A download request (consumer) pairs with a waiting upload (producer) by
//! sending exactly one [`Handoff`] through the single-use channel stored in
//! the registry. The handoff carries the two things the producer needs: a
//! [`ResponseSink`] to write the HTTP response into and an [`OutcomeSignal`]
//! to report how the transfer ended.
//!
//! The consumer keeps the matching [`ConsumerSide`] and waits for whichever
//! comes first: the response head (the producer staged successfully and is
//! about to stream) or a failed outcome.

use std::io;

use axum::http::HeaderMap;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::error::{TransferError, TransferFailure};

/// Number of body chunks buffered between producer and HTTP response
pub const BODY_CHANNEL_CAPACITY: usize = 8;

/// Size of each body chunk read from the archive
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Sending half of the single-use handoff channel, held by the registry
pub type HandoffSender = oneshot::Sender<Handoff>;

/// Receiving half of the single-use handoff channel, held by the producer
pub type HandoffReceiver = oneshot::Receiver<Handoff>;

/// Create a fresh single-use handoff channel
pub fn handoff_channel() -> (HandoffSender, HandoffReceiver) {
    oneshot::channel()
}

/// How a paired transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Failed(TransferFailure),
}

/// The value a consumer sends to a waiting producer
pub struct Handoff {
    pub sink: ResponseSink,
    pub signal: OutcomeSignal,
}

impl Handoff {
    /// Build a handoff and the consumer's half of it
    pub fn pair() -> (Self, ConsumerSide) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let handoff = Self {
            sink: ResponseSink {
                head_tx: Some(head_tx),
                body_tx,
            },
            signal: OutcomeSignal {
                tx: Some(outcome_tx),
            },
        };
        let consumer = ConsumerSide {
            head_rx,
            body_rx,
            outcome_rx,
        };
        (handoff, consumer)
    }
}

/// What the consumer keeps after sending its handoff
pub struct ConsumerSide {
    pub head_rx: oneshot::Receiver<HeaderMap>,
    pub body_rx: mpsc::Receiver<io::Result<Bytes>>,
    pub outcome_rx: oneshot::Receiver<TransferOutcome>,
}

/// Producer's view of the attached HTTP response
///
/// The head can be written once. Body chunks apply backpressure: a slow
/// downloader slows the producer rather than growing a buffer.
pub struct ResponseSink {
    head_tx: Option<oneshot::Sender<HeaderMap>>,
    body_tx: mpsc::Sender<io::Result<Bytes>>,
}

impl ResponseSink {
    /// Write the response head
    ///
    /// Fails with `ConsumerGone` if the downloader went away, or if the head
    /// was already written.
    pub fn send_head(&mut self, headers: HeaderMap) -> Result<(), TransferError> {
        let tx = self.head_tx.take().ok_or(TransferError::ConsumerGone)?;
        tx.send(headers).map_err(|_| TransferError::ConsumerGone)
    }

    /// Write one body chunk, waiting for room in the channel
    pub async fn send_chunk(&self, chunk: Bytes) -> Result<(), TransferError> {
        self.body_tx
            .send(Ok(chunk))
            .await
            .map_err(|_| TransferError::ConsumerGone)
    }

    /// Abort the response body with an error so the client sees a broken
    /// transfer rather than a short but well-formed one
    pub async fn abort(&self, reason: &str) {
        let _ = self.body_tx.send(Err(io::Error::other(reason.to_string()))).await;
    }

    /// Resolves once the downloader has gone away
    pub async fn closed(&self) {
        self.body_tx.closed().await;
    }

    /// Whether the downloader has gone away
    pub fn is_closed(&self) -> bool {
        self.body_tx.is_closed()
    }
}

/// Single-use completion/failure signal
///
/// Exactly one outcome is ever sent: `complete` and `fail` consume the signal,
/// and dropping an unfired signal reports an aborted transfer.
pub struct OutcomeSignal {
    tx: Option<oneshot::Sender<TransferOutcome>>,
}

impl OutcomeSignal {
    /// Report success
    pub fn complete(mut self) {
        self.fire(TransferOutcome::Completed);
    }

    /// Report failure
    pub fn fail(mut self, failure: TransferFailure) {
        self.fire(TransferOutcome::Failed(failure));
    }

    fn fire(&mut self, outcome: TransferOutcome) {
        if let Some(tx) = self.tx.take() {
            // Consumer may already be gone; nothing to report to then
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for OutcomeSignal {
    fn drop(&mut self) {
        self.fire(TransferOutcome::Failed(TransferFailure::aborted()));
    }
}
