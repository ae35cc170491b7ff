//! Cancellable generation stream.
//!
//! A worker task pulls the adapter's [`TextStream`] and forwards deltas
//! through a bounded channel. The [`GenerationStream`] is the receiving end;
//! dropping or cancelling it aborts the worker, which drops the HTTP
//! response and closes the connection.

use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use inkgate_core::{CallErrorKind, GenerationMode, ProviderCallError, TextChunk};
use inkgate_providers::TextStream;

use crate::error::GatewayError;

/// What the worker sends to the receiving end.
#[derive(Debug)]
enum StreamMessage {
    Chunk(String),
    Failed(GatewayError),
    Finished,
}

/// Lazy, forward-only stream of text deltas from one provider.
///
/// Yields `Ok(TextChunk)` per delta, at most one `Err`, and then ends. If the
/// worker disappears without reporting completion the stream yields
/// [`GatewayError::Cancelled`].
pub struct GenerationStream {
    provider: &'static str,
    model: String,
    rx: mpsc::Receiver<StreamMessage>,
    worker: JoinHandle<()>,
    chunks: usize,
    done: bool,
}

impl GenerationStream {
    /// Start a worker that drains `upstream` into a channel of `buffer` slots.
    pub(crate) fn spawn(
        provider: &'static str,
        model: String,
        upstream: TextStream,
        buffer: usize,
        idle_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let worker = tokio::spawn(pump(provider, upstream, tx, idle_timeout));
        Self::from_parts(provider, model, rx, worker)
    }

    fn from_parts(
        provider: &'static str,
        model: String,
        rx: mpsc::Receiver<StreamMessage>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            provider,
            model,
            rx,
            worker,
            chunks: 0,
            done: false,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of chunks delivered so far. Non-zero after a failure means the
    /// caller already showed partial output.
    pub fn chunks_received(&self) -> usize {
        self.chunks
    }

    /// Stop the upstream call. The stream ends; buffered chunks are discarded.
    pub fn cancel(&mut self) {
        if !self.done {
            debug!(provider = self.provider, chunks = self.chunks, "Stream cancelled by caller");
        }
        self.worker.abort();
        self.rx.close();
        self.done = true;
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, GatewayError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?.content);
        }
        Ok(text)
    }
}

impl Stream for GenerationStream {
    type Item = Result<TextChunk, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match ready!(self.rx.poll_recv(cx)) {
            Some(StreamMessage::Chunk(text)) => {
                self.chunks += 1;
                Poll::Ready(Some(Ok(TextChunk::new(text))))
            }
            Some(StreamMessage::Failed(err)) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Some(StreamMessage::Finished) => {
                self.done = true;
                Poll::Ready(None)
            }
            None => {
                self.done = true;
                Poll::Ready(Some(Err(GatewayError::Cancelled)))
            }
        }
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("chunks", &self.chunks)
            .field("done", &self.done)
            .finish()
    }
}

// ─────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────

async fn pump(
    provider: &'static str,
    mut upstream: TextStream,
    tx: mpsc::Sender<StreamMessage>,
    idle_timeout: Duration,
) {
    let mut forwarded = 0usize;
    loop {
        let next = match tokio::time::timeout(idle_timeout, upstream.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!(provider, idle_secs = idle_timeout.as_secs_f64(), "Stream idle timeout");
                let err = ProviderCallError::new(
                    provider,
                    CallErrorKind::Timeout,
                    format!("no data received for {:.1}s", idle_timeout.as_secs_f64()),
                );
                let _ = tx
                    .send(StreamMessage::Failed(GatewayError::provider(GenerationMode::Stream, err)))
                    .await;
                return;
            }
        };

        let message = match next {
            Some(Ok(text)) => StreamMessage::Chunk(text),
            Some(Err(err)) => {
                warn!(provider, kind = %err.kind, chunks = forwarded, "Stream failed");
                StreamMessage::Failed(GatewayError::provider(GenerationMode::Stream, err))
            }
            None => {
                debug!(provider, chunks = forwarded, "Stream completed");
                StreamMessage::Finished
            }
        };
        let terminal = !matches!(message, StreamMessage::Chunk(_));

        if tx.send(message).await.is_err() {
            debug!(provider, "Receiver dropped, stopping stream worker");
            return;
        }
        if terminal {
            return;
        }
        forwarded += 1;
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
